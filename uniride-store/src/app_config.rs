use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rules: Rules,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

/// Tunables of the trip, chat and code stores.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Rules {
    pub stats_refresh_seconds: u64,
    pub typing_ttl_seconds: u64,
    pub code_ttl_minutes: i64,
    pub chat_max_messages: usize,
    pub chat_keep_messages: usize,
    pub chat_max_body_chars: usize,
    /// Offset from UTC of the chat `displayTime`, in minutes.
    pub chat_utc_offset_minutes: i32,
    pub fare_min: f64,
    pub fare_max: f64,
    pub active_user_window_minutes: i64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            stats_refresh_seconds: 30,
            typing_ttl_seconds: 3,
            code_ttl_minutes: 10,
            chat_max_messages: 100,
            chat_keep_messages: 80,
            chat_max_body_chars: 500,
            chat_utc_offset_minutes: -300,
            fare_min: 2.0,
            fare_max: 7.0,
            active_user_window_minutes: 5,
        }
    }
}

/// Outbound mail. Without `smtp_host` codes are only written to the log.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MailConfig {
    pub from: Option<String>,
    pub allowed_domain: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_timeout_seconds: u64,
    pub rate_limit_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: None,
            allowed_domain: None,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_timeout_seconds: 10,
            rate_limit_seconds: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `UNIRIDE_DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("UNIRIDE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
