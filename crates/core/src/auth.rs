//! Access-token resolution. Token issuance and revocation are owned by an
//! external service; ingestion only needs to resolve a token to its domains.

use crate::error::KrakensResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    #[serde(default)]
    pub domain_ids: Vec<String>,
    #[serde(default)]
    pub revoked: bool,
}

#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// `Ok(None)` when the token is unknown.
    async fn validate(&self, token: &str) -> KrakensResult<Option<AccessToken>>;
}
