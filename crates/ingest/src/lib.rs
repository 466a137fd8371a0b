#![warn(clippy::unwrap_used)]

pub mod gateway;
pub mod tokens;

pub use gateway::{Caller, TrackingGateway};
pub use tokens::StaticTokenResolver;
