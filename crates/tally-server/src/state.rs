use crate::config::ServerConfig;
use std::sync::Arc;
use tally_common::crypto::RsaPrivateKey;
use tally_storage::MetricsStorage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn MetricsStorage>,
    pub config: Arc<ServerConfig>,
    /// HMAC key; request hashes are checked and responses signed only when set.
    pub key: Option<Arc<[u8]>>,
    /// Request bodies are decrypted only when set.
    pub private_key: Option<Arc<RsaPrivateKey>>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn MetricsStorage>,
        config: ServerConfig,
        private_key: Option<RsaPrivateKey>,
    ) -> Self {
        let key = config.key.as_deref().map(|k| Arc::from(k.as_bytes()));
        Self {
            storage,
            config: Arc::new(config),
            key,
            private_key: private_key.map(Arc::new),
        }
    }
}
