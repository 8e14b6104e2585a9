//! Origin connector settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connector::tls::{is_allowed_cipher, DEFAULT_CIPHER};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectorConfig {
    /// Budget for the first connection attempt
    #[serde(default = "default_first_attempt_timeout")]
    pub first_attempt_timeout_ms: u64,

    /// Budget for the single retry
    #[serde(default = "default_retry_timeout")]
    pub retry_timeout_ms: u64,

    /// Cipher used on the retry after a handshake failure, unless a `cipher`
    /// rule names a valid one
    #[serde(default = "default_fallback_cipher")]
    pub fallback_cipher: String,

    /// Accept any origin certificate
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl ConnectorConfig {
    /// Timeout of the given 1-based attempt.
    pub fn timeout_for(&self, attempt: u8) -> Duration {
        if attempt <= 1 {
            Duration::from_millis(self.first_attempt_timeout_ms)
        } else {
            Duration::from_millis(self.retry_timeout_ms)
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.first_attempt_timeout_ms == 0 || self.retry_timeout_ms == 0 {
            anyhow::bail!("connector timeouts must be greater than zero");
        }
        if self.retry_timeout_ms < self.first_attempt_timeout_ms {
            anyhow::bail!(
                "connector.retry_timeout_ms ({}) must not be shorter than connector.first_attempt_timeout_ms ({})",
                self.retry_timeout_ms,
                self.first_attempt_timeout_ms
            );
        }
        if !is_allowed_cipher(&self.fallback_cipher) {
            anyhow::bail!(
                "Unsupported fallback cipher: '{}'. Use an OpenSSL cipher name such as {DEFAULT_CIPHER}",
                self.fallback_cipher
            );
        }
        Ok(())
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            first_attempt_timeout_ms: default_first_attempt_timeout(),
            retry_timeout_ms: default_retry_timeout(),
            fallback_cipher: default_fallback_cipher(),
            skip_tls_verify: false,
        }
    }
}

fn default_first_attempt_timeout() -> u64 {
    6000
}

fn default_retry_timeout() -> u64 {
    12000
}

fn default_fallback_cipher() -> String {
    DEFAULT_CIPHER.to_string()
}
