pub mod channel;
pub mod models;
pub mod presence;

pub use channel::{ChatChannel, ChatError, ChatPolicy};
pub use models::{ChatMessage, ChatStats, MessageKind};
pub use presence::TypingTracker;
