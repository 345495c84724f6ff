//! Strict, exactly-once nonce service.
//!
//! Issues short-lived opaque tokens and accepts each one for redemption at
//! most once within a validity window. State lives only for the process
//! lifetime: tokens do not survive a restart and are not shared across
//! nodes.
//!
//! Two backends implement [`NonceService`]:
//!
//! - [`EncryptedNonceService`] seals `(counter, expiry)` with a per-instance
//!   AES-256-GCM key and enforces single use with a counter watermark and a
//!   per-second redemption ledger.
//! - [`MapNonceService`] stores outstanding tokens directly; used as a
//!   baseline and test oracle.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), noncegate_core::NonceError> {
//! let service = noncegate_core::new_encrypted_nonce_service(Duration::from_secs(90))?;
//!
//! let issued = service.get()?;
//! assert!(service.redeem(&issued.token));
//! assert!(!service.redeem(&issued.token));
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `NONCEGATE_BACKEND` | `encrypted` (default) or `map` |
//! | `NONCEGATE_VALIDITY_SECS` | Validity period in seconds (default: 90) |

use std::sync::Arc;
use std::time::Duration;

pub mod clock;
pub mod codec;
pub mod config;
pub mod encrypted;
pub mod entropy;
pub mod error;
pub mod ledger;
pub mod map;
pub mod service;

pub use clock::{Clock, StepClock, SystemClock};
pub use codec::{NonceClaims, TokenCodec, TOKEN_LEN, TOKEN_SENTINEL};
pub use config::{Backend, NonceConfig, DEFAULT_VALIDITY_SECS};
pub use encrypted::EncryptedNonceService;
pub use entropy::{EntropySource, FailingEntropy, OsEntropy, SeededEntropy};
pub use error::{NonceError, NonceResult};
pub use ledger::LedgerStats;
pub use map::MapNonceService;
pub use service::{IssuedNonce, NonceService, NonceStatus};

/// Construct the encrypted backend on the system clock and OS entropy.
pub fn new_encrypted_nonce_service(validity: Duration) -> NonceResult<Arc<dyn NonceService>> {
    Ok(Arc::new(EncryptedNonceService::new(validity)?))
}

/// Construct the map backend on the system clock and OS entropy.
pub fn new_map_nonce_service(validity: Duration) -> NonceResult<Arc<dyn NonceService>> {
    Ok(Arc::new(MapNonceService::new(validity)?))
}
