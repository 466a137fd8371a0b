pub mod auth;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod identity;
pub mod store;
pub mod types;
pub mod useragent;
pub mod window;

pub use auth::{AccessToken, TokenResolver};
pub use config::AppConfig;
pub use error::{KrakensError, KrakensResult};
pub use event_bus::{EventQueue, MemoryQueue, MessageStream};
pub use store::EventStore;
pub use types::{Event, OverviewStats, RealtimeStats, TrackRequest};
pub use window::ActiveWindow;
