#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;

pub use client::RedisWindow;
pub use local::LocalWindow;
