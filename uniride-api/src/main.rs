use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uniride_api::{app, worker, AppState, Gateways};
use uniride_core::mail::{LogMailer, MailSender, SmtpMailer, SmtpSettings};
use uniride_store::app_config::{Config, DatabaseConfig, MailConfig};
use uniride_store::{
    DbClient, OfflineGateway, StoreChatRepository, StoreStatsRepository, StoreTripRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uniride_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting UniRide API on port {}", config.server.port);

    let gateways = connect(&config.database).await;

    let mailer = mailer(&config.mail)?;

    let state = AppState::build(
        gateways,
        mailer,
        config.rules.clone(),
        config.mail.allowed_domain.clone(),
    )?;

    tokio::spawn(worker::start_stats_worker(
        state.trips.clone(),
        state.stats.clone(),
        Duration::from_secs(config.rules.stats_refresh_seconds.max(1)),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// SMTP delivery when a host is configured, the log mailer otherwise.
fn mailer(mail: &MailConfig) -> anyhow::Result<Arc<dyn MailSender>> {
    let from = mail
        .from
        .clone()
        .unwrap_or_else(|| "no-reply@uniride.local".to_string());

    let Some(host) = &mail.smtp_host else {
        tracing::warn!("No SMTP host configured, verification codes are only logged");
        return Ok(Arc::new(
            LogMailer::new(mail.allowed_domain.clone()).with_from(from),
        ));
    };

    let smtp = SmtpMailer::new(SmtpSettings {
        host: host.clone(),
        port: mail.smtp_port,
        username: mail.smtp_username.clone(),
        password: mail.smtp_password.clone(),
        from,
        allowed_domain: mail.allowed_domain.clone(),
        timeout: Duration::from_secs(mail.smtp_timeout_seconds),
        rate_limit: Duration::from_secs(mail.rate_limit_seconds),
    })
    .map_err(|e| anyhow::anyhow!("invalid SMTP settings: {}", e))?;
    tracing::info!("Mailing verification codes through {}:{}", host, mail.smtp_port);
    Ok(Arc::new(smtp))
}

/// Postgres-backed gateways, or the offline gateway when the database is
/// unreachable. The service keeps running on in-memory state either way.
async fn connect(database: &DatabaseConfig) -> Gateways {
    let db = match DbClient::new(&database.url, database.max_connections).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Database unavailable, running without persistence: {}", e);
            return Gateways::uniform(Arc::new(OfflineGateway));
        }
    };

    if let Err(e) = db.migrate().await {
        tracing::error!("Migrations failed: {}", e);
    }

    Gateways {
        trips: Arc::new(StoreTripRepository::new(db.pool.clone())),
        chat: Arc::new(StoreChatRepository::new(db.pool.clone())),
        stats: Arc::new(StoreStatsRepository::new(db.pool)),
    }
}
