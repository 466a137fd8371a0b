//! Static access-token resolver backed by the `[[tokens]]` config section.
//! Production deployments resolve tokens through the key-management service.

use async_trait::async_trait;
use krakens_core::{AccessToken, KrakensResult, TokenResolver};
use std::collections::HashMap;
use tracing::info;

pub struct StaticTokenResolver {
    tokens: HashMap<String, AccessToken>,
}

impl StaticTokenResolver {
    pub fn new(tokens: Vec<AccessToken>) -> Self {
        let tokens: HashMap<_, _> = tokens
            .into_iter()
            .map(|t| (t.token.clone(), t))
            .collect();
        info!(count = tokens.len(), "Static token resolver loaded");
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenResolver for StaticTokenResolver {
    async fn validate(&self, token: &str) -> KrakensResult<Option<AccessToken>> {
        Ok(self.tokens.get(token).cloned())
    }
}
