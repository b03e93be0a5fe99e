// =============================================================================
// AuthProvider — credential readiness for the exchange client
// =============================================================================
//
// Credential storage itself is a host concern (per SPEC_FULL.md §6); this is
// a minimal implementation reading API key/secret from the environment, in
// the same `std::env::var` idiom the teacher uses for runtime tunables.
// =============================================================================

use async_trait::async_trait;
use tracing::{info, warn};

use super::AuthProvider;

pub struct EnvAuthProvider {
    api_key: String,
    secret: String,
    address: String,
}

impl EnvAuthProvider {
    /// Build from `BINANCE_API_KEY` / `BINANCE_API_SECRET` / `BINANCE_ADDRESS`.
    /// Returns a provider that reports `is_ready() == false` if credentials
    /// are missing, rather than failing construction — readiness is checked
    /// explicitly by the scheduler's `start()` per spec §4.1.
    pub fn from_env() -> Self {
        let api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
        let secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();
        let address = std::env::var("BINANCE_ADDRESS").unwrap_or_default();

        if api_key.is_empty() || secret.is_empty() {
            warn!("BINANCE_API_KEY / BINANCE_API_SECRET not set — auth not ready");
        } else {
            info!("exchange credentials loaded from environment");
        }

        Self {
            api_key,
            secret,
            address,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

#[async_trait]
impl AuthProvider for EnvAuthProvider {
    fn is_ready(&self) -> bool {
        !self.api_key.is_empty() && !self.secret.is_empty()
    }

    async fn test_connection(&self) -> anyhow::Result<()> {
        if !self.is_ready() {
            anyhow::bail!("auth not ready: missing API key or secret");
        }
        Ok(())
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_without_credentials() {
        std::env::remove_var("BINANCE_API_KEY");
        std::env::remove_var("BINANCE_API_SECRET");
        let provider = EnvAuthProvider::from_env();
        assert!(!provider.is_ready());
    }
}
