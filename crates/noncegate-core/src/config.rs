//! Service configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::encrypted::EncryptedNonceService;
use crate::entropy::{EntropySource, OsEntropy};
use crate::error::{NonceError, NonceResult};
use crate::map::MapNonceService;
use crate::service::{validity_delta, NonceService};

/// Default validity period (90 seconds).
pub const DEFAULT_VALIDITY_SECS: u64 = 90;

/// Nonce service backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// AEAD-sealed counters with a redemption ledger.
    #[default]
    Encrypted,
    /// In-memory token map.
    Map,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypted => "encrypted",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = NonceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encrypted" => Ok(Self::Encrypted),
            "map" => Ok(Self::Map),
            other => Err(NonceError::Config {
                message: format!("unknown backend '{other}' (expected 'encrypted' or 'map')"),
            }),
        }
    }
}

/// Nonce service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Validity period in seconds.
    #[serde(default = "default_validity_secs")]
    pub validity_secs: u64,
}

fn default_validity_secs() -> u64 {
    DEFAULT_VALIDITY_SECS
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            validity_secs: default_validity_secs(),
        }
    }
}

impl NonceConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `NONCEGATE_BACKEND` | `encrypted` (default) or `map` |
    /// | `NONCEGATE_VALIDITY_SECS` | Validity period in seconds (default: 90) |
    pub fn from_env() -> Self {
        let backend = match std::env::var("NONCEGATE_BACKEND") {
            Ok(v) => v.parse().unwrap_or_else(|e: NonceError| {
                warn!(error = %e, "ignoring NONCEGATE_BACKEND");
                Backend::default()
            }),
            Err(_) => Backend::default(),
        };

        let validity_secs = match std::env::var("NONCEGATE_VALIDITY_SECS") {
            Ok(v) => v.trim().parse().unwrap_or_else(|_| {
                warn!(value = %v, "ignoring unparsable NONCEGATE_VALIDITY_SECS");
                default_validity_secs()
            }),
            Err(_) => default_validity_secs(),
        };

        Self {
            backend,
            validity_secs,
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_validity_secs(mut self, secs: u64) -> Self {
        self.validity_secs = secs;
        self
    }

    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }

    pub fn validate(&self) -> NonceResult<()> {
        validity_delta(self.validity()).map(|_| ())
    }

    /// Build the configured backend on the system clock and OS entropy.
    pub fn build(&self) -> NonceResult<Arc<dyn NonceService>> {
        self.build_with(Arc::new(SystemClock), Arc::new(OsEntropy))
    }

    /// Build the configured backend on explicit capabilities.
    pub fn build_with(
        &self,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
    ) -> NonceResult<Arc<dyn NonceService>> {
        self.validate()?;
        let service: Arc<dyn NonceService> = match self.backend {
            Backend::Encrypted => Arc::new(EncryptedNonceService::with_capabilities(
                self.validity(),
                clock,
                entropy,
            )?),
            Backend::Map => Arc::new(MapNonceService::with_capabilities(
                self.validity(),
                clock,
                entropy,
            )?),
        };
        Ok(service)
    }
}
