//! Per-account secret lookup, resolved once per request.
//!
//! The engine never persists tokens or keys itself; deployments plug in
//! whatever backs their account registry. Lookups run concurrently from many
//! requests, so implementations must be `Send + Sync`. The trait is async so
//! a caller can wrap remote lookups in its own deadline.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Error;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Signature token for an account, or `TokenNotFound`.
    async fn token(&self, app_id: &str) -> Result<String, Error>;

    /// Stored EncodingAESKey for an account (still base64, one `=` short),
    /// or `AesKeyNotFound`.
    async fn encoding_aes_key(&self, app_id: &str) -> Result<String, Error>;
}

/// Map-backed store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    tokens: Mutex<HashMap<String, String>>,
    keys: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, app_id: impl Into<String>, token: impl Into<String>) {
        self.tokens.lock().insert(app_id.into(), token.into());
    }

    pub fn set_encoding_aes_key(&self, app_id: impl Into<String>, key: impl Into<String>) {
        self.keys.lock().insert(app_id.into(), key.into());
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn token(&self, app_id: &str) -> Result<String, Error> {
        self.tokens
            .lock()
            .get(app_id)
            .cloned()
            .ok_or(Error::TokenNotFound)
    }

    async fn encoding_aes_key(&self, app_id: &str) -> Result<String, Error> {
        self.keys
            .lock()
            .get(app_id)
            .cloned()
            .ok_or(Error::AesKeyNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_misses_are_typed() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.token("wx_missing").await,
            Err(Error::TokenNotFound)
        ));
        assert!(matches!(
            store.encoding_aes_key("wx_missing").await,
            Err(Error::AesKeyNotFound)
        ));
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        store.set_token("wx_app_1", "token123");
        store.set_encoding_aes_key("wx_app_1", "key43chars");

        assert_eq!(store.token("wx_app_1").await.unwrap(), "token123");
        assert_eq!(
            store.encoding_aes_key("wx_app_1").await.unwrap(),
            "key43chars"
        );
    }
}
