use std::sync::Arc;
use uniride_chat::{ChatChannel, ChatPolicy};
use uniride_core::mail::MailSender;
use uniride_core::repository::{ChatRepository, StatsRepository, TripRepository};
use uniride_core::stats::StatsAggregator;
use uniride_core::verification::CodeStore;
use uniride_store::app_config::Rules;
use uniride_trip::{RandomFare, TripRegistry};

use crate::metrics::Metrics;

/// The three storage seams the core talks to.
#[derive(Clone)]
pub struct Gateways {
    pub trips: Arc<dyn TripRepository>,
    pub chat: Arc<dyn ChatRepository>,
    pub stats: Arc<dyn StatsRepository>,
}

impl Gateways {
    /// One backend serving every seam.
    pub fn uniform<G>(gateway: Arc<G>) -> Self
    where
        G: TripRepository + ChatRepository + StatsRepository + 'static,
    {
        Self {
            trips: gateway.clone(),
            chat: gateway.clone(),
            stats: gateway,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub trips: Arc<TripRegistry>,
    pub chat: Arc<ChatChannel>,
    pub codes: Arc<CodeStore>,
    pub stats: Arc<StatsAggregator>,
    pub metrics: Arc<Metrics>,
    pub rules: Rules,
    pub allowed_domain: Option<String>,
}

impl AppState {
    pub fn build(
        gateways: Gateways,
        mailer: Arc<dyn MailSender>,
        rules: Rules,
        allowed_domain: Option<String>,
    ) -> anyhow::Result<Self> {
        let policy = ChatPolicy {
            max_messages: rules.chat_max_messages,
            keep_messages: rules.chat_keep_messages.min(rules.chat_max_messages),
            max_body_chars: rules.chat_max_body_chars,
            typing_ttl: chrono::Duration::seconds(rules.typing_ttl_seconds as i64),
            display_offset: chrono::FixedOffset::east_opt(rules.chat_utc_offset_minutes * 60)
                .ok_or_else(|| {
                    anyhow::anyhow!("chat_utc_offset_minutes out of range: {}", rules.chat_utc_offset_minutes)
                })?,
        };
        let chat = Arc::new(ChatChannel::new(gateways.chat, policy));
        let trips = Arc::new(TripRegistry::new(
            gateways.trips.clone(),
            chat.clone(),
            Box::new(RandomFare::new(rules.fare_min, rules.fare_max)),
        ));
        let codes = Arc::new(CodeStore::new(
            mailer,
            chrono::Duration::minutes(rules.code_ttl_minutes),
        ));
        let stats = Arc::new(StatsAggregator::new(
            gateways.stats,
            gateways.trips,
            rules.active_user_window_minutes,
        ));

        Ok(Self {
            trips,
            chat,
            codes,
            stats,
            metrics: Arc::new(Metrics::new()?),
            rules,
            allowed_domain: allowed_domain
                .map(|d| d.trim().trim_start_matches('@').to_lowercase())
                .filter(|d| !d.is_empty()),
        })
    }
}
