//! Encrypted local storage for trained model snapshots.

mod encrypted;

pub use encrypted::SecureStore;

use crate::config::StoreConfig;
use tracing::warn;

const PLACEHOLDER_SECRET: &[u8] = b"insider-threat-local-secret";

/// Store secret from the configured env var, or a fixed local placeholder.
pub fn store_secret(config: &StoreConfig) -> Vec<u8> {
    match std::env::var(&config.secret_env) {
        Ok(v) if !v.is_empty() => v.into_bytes(),
        _ => {
            warn!(env = %config.secret_env, "store secret not set; using local placeholder");
            PLACEHOLDER_SECRET.to_vec()
        }
    }
}
