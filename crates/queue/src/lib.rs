#![warn(clippy::unwrap_used)]

pub mod consumer;
pub mod nats;

pub use consumer::{ConsumerHandle, EventConsumer};
pub use nats::NatsQueue;
