#![warn(clippy::unwrap_used)]

pub mod clickhouse_store;
pub mod memory;
pub mod overview;
pub mod realtime;

pub use clickhouse_store::ClickHouseEventStore;
pub use memory::MemoryEventStore;
pub use overview::OverviewAggregator;
pub use realtime::RealtimeAggregator;

use krakens_core::KrakensError;

/// Aggregator reads surface every store failure as a single `Unavailable`.
pub(crate) fn store_unavailable(err: KrakensError) -> KrakensError {
    match err {
        KrakensError::Unavailable(_) => err,
        other => KrakensError::Unavailable(other.to_string()),
    }
}
