pub mod app_config;
pub mod chat_repo;
pub mod database;
pub mod memory_repo;
pub mod offline;
pub mod stats_repo;
pub mod trip_repo;

pub use chat_repo::StoreChatRepository;
pub use database::DbClient;
pub use memory_repo::MemoryStore;
pub use offline::OfflineGateway;
pub use stats_repo::StoreStatsRepository;
pub use trip_repo::StoreTripRepository;
