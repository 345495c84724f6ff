//! Token envelope.
//!
//! # Wire layout
//!
//! ```text
//! +-----------+----------------+----------------------------------+
//! | "vault0"  | nonce suffix   | AES-256-GCM(counter || expiry)   |
//! | 6 bytes   | 8 bytes        | 16 bytes ciphertext + 16 tag     |
//! +-----------+----------------+----------------------------------+
//! ```
//!
//! The 12-byte AEAD nonce is four zero bytes followed by the suffix. Counter
//! and expiry (Unix seconds) are big-endian `u64`s. The 46 raw bytes travel
//! as unpadded base64url.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::entropy::EntropySource;
use crate::error::{NonceError, NonceResult};

/// Format sentinel at the start of every token.
pub const TOKEN_SENTINEL: &[u8; 6] = b"vault0";

/// Random bytes carried on the wire; the low 8 bytes of the AEAD nonce.
pub const NONCE_SUFFIX_LEN: usize = 8;

/// Zero prefix completing the 12-byte AEAD nonce.
const NONCE_PREFIX_LEN: usize = 4;

/// `counter || expiry`.
pub const PLAINTEXT_LEN: usize = 16;

/// GCM authenticator length.
pub const TAG_LEN: usize = 16;

/// Decoded token length.
pub const TOKEN_LEN: usize = TOKEN_SENTINEL.len() + NONCE_SUFFIX_LEN + PLAINTEXT_LEN + TAG_LEN;

/// Symmetric key length (AES-256).
pub const KEY_LEN: usize = 32;

/// Decoded token plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceClaims {
    pub counter: u64,
    /// Expiry as whole Unix seconds.
    pub expiry_unix: i64,
}

/// AEAD codec keyed once per service instance.
///
/// The cipher holds no mutable state, so one codec is shared by every
/// thread issuing or redeeming.
pub struct TokenCodec {
    cipher: Aes256Gcm,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Sample a fresh key from `entropy` and build the cipher.
    pub fn generate(entropy: &dyn EntropySource) -> NonceResult<Self> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        entropy.fill_random(key.as_mut_slice())?;
        Self::from_key(&key)
    }

    /// Build a codec from explicit key material.
    pub fn from_key(key: &[u8; KEY_LEN]) -> NonceResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| NonceError::CipherInit {
            message: e.to_string(),
        })?;
        Ok(Self { cipher })
    }

    /// Draw a nonce suffix.
    pub fn fresh_suffix(entropy: &dyn EntropySource) -> NonceResult<[u8; NONCE_SUFFIX_LEN]> {
        let mut suffix = [0u8; NONCE_SUFFIX_LEN];
        entropy.fill_random(&mut suffix)?;
        Ok(suffix)
    }

    /// Seal `claims` with a freshly drawn suffix.
    pub fn encrypt(&self, claims: NonceClaims, entropy: &dyn EntropySource) -> NonceResult<String> {
        let suffix = Self::fresh_suffix(entropy)?;
        self.seal(claims, &suffix)
    }

    /// Seal `claims` under the nonce `0000 || suffix`.
    ///
    /// Callers must never reuse a suffix they chose themselves; the service
    /// always draws one from its entropy source.
    pub fn seal(&self, claims: NonceClaims, suffix: &[u8; NONCE_SUFFIX_LEN]) -> NonceResult<String> {
        let expiry = u64::try_from(claims.expiry_unix).map_err(|_| NonceError::ClockOutOfRange {
            timestamp: claims.expiry_unix,
        })?;

        let mut plaintext = [0u8; PLAINTEXT_LEN];
        plaintext[..8].copy_from_slice(&claims.counter.to_be_bytes());
        plaintext[8..].copy_from_slice(&expiry.to_be_bytes());

        let nonce = full_nonce(suffix);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| NonceError::Seal {
                message: e.to_string(),
            })?;

        let mut raw = Vec::with_capacity(TOKEN_LEN);
        raw.extend_from_slice(TOKEN_SENTINEL);
        raw.extend_from_slice(suffix);
        raw.extend_from_slice(&ciphertext);
        debug_assert_eq!(raw.len(), TOKEN_LEN);

        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Open a token. Every failure (encoding, length, sentinel, tag, range)
    /// yields `None`.
    pub fn open(&self, token: &str) -> Option<NonceClaims> {
        let raw = URL_SAFE_NO_PAD.decode(token.as_bytes()).ok()?;
        if raw.len() != TOKEN_LEN {
            return None;
        }

        let (sentinel, rest) = raw.split_at(TOKEN_SENTINEL.len());
        if !bool::from(sentinel.ct_eq(TOKEN_SENTINEL.as_slice())) {
            return None;
        }

        let (suffix, ciphertext) = rest.split_at(NONCE_SUFFIX_LEN);
        let nonce = full_nonce(suffix.try_into().ok()?);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .ok()?;
        if plaintext.len() != PLAINTEXT_LEN {
            return None;
        }

        let counter = u64::from_be_bytes(plaintext[..8].try_into().ok()?);
        let expiry = u64::from_be_bytes(plaintext[8..].try_into().ok()?);
        let expiry_unix = i64::try_from(expiry).ok()?;

        Some(NonceClaims {
            counter,
            expiry_unix,
        })
    }
}

fn full_nonce(suffix: &[u8; NONCE_SUFFIX_LEN]) -> [u8; NONCE_PREFIX_LEN + NONCE_SUFFIX_LEN] {
    let mut nonce = [0u8; NONCE_PREFIX_LEN + NONCE_SUFFIX_LEN];
    nonce[NONCE_PREFIX_LEN..].copy_from_slice(suffix);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::SeededEntropy;

    const CLAIMS: NonceClaims = NonceClaims {
        counter: 42,
        expiry_unix: 1_700_000_090,
    };

    fn codec() -> TokenCodec {
        TokenCodec::generate(&SeededEntropy::new(11)).unwrap()
    }

    #[test]
    fn test_token_has_fixed_length_and_sentinel() {
        let token = codec().encrypt(CLAIMS, &SeededEntropy::new(3)).unwrap();

        // 46 bytes -> 62 unpadded base64 characters
        assert_eq!(token.len(), 62);
        assert!(!token.contains('='));

        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(raw.len(), TOKEN_LEN);
        assert_eq!(&raw[..6], b"vault0");
    }

    #[test]
    fn test_open_recovers_claims() {
        let codec = codec();
        let token = codec.encrypt(CLAIMS, &SeededEntropy::new(3)).unwrap();
        assert_eq!(codec.open(&token), Some(CLAIMS));
    }

    #[test]
    fn test_suffix_is_carried_verbatim() {
        let codec = codec();
        let suffix = [1, 2, 3, 4, 5, 6, 7, 8];
        let token = codec.seal(CLAIMS, &suffix).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(&raw[6..14], &suffix);

        // Same key, claims and suffix seal to the same bytes.
        assert_eq!(codec.seal(CLAIMS, &suffix).unwrap(), token);
        assert_ne!(codec.seal(CLAIMS, &[9; 8]).unwrap(), token);
    }

    #[test]
    fn test_every_byte_is_authenticated() {
        let codec = codec();
        let token = codec.encrypt(CLAIMS, &SeededEntropy::new(3)).unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let forged = URL_SAFE_NO_PAD.encode(&tampered);
            assert_eq!(codec.open(&forged), None, "flip at byte {i} accepted");
        }
    }

    #[test]
    fn test_other_key_rejects() {
        let token = codec().encrypt(CLAIMS, &SeededEntropy::new(3)).unwrap();
        let other = TokenCodec::generate(&SeededEntropy::new(12)).unwrap();
        assert_eq!(other.open(&token), None);
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        let codec = codec();
        let token = codec.encrypt(CLAIMS, &SeededEntropy::new(3)).unwrap();

        assert_eq!(codec.open(""), None);
        assert_eq!(codec.open("not-base64url!!"), None);
        assert_eq!(codec.open(&URL_SAFE_NO_PAD.encode([0u8; 45])), None);
        assert_eq!(codec.open(&URL_SAFE_NO_PAD.encode([0u8; 47])), None);
        assert_eq!(codec.open(&format!("{token}==")), None);
        assert_eq!(codec.open(&token[..61]), None);
    }

    #[test]
    fn test_negative_expiry_cannot_be_sealed() {
        let claims = NonceClaims {
            counter: 1,
            expiry_unix: -5,
        };
        assert_eq!(
            codec().seal(claims, &[0; 8]),
            Err(NonceError::ClockOutOfRange { timestamp: -5 })
        );
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let rendered = format!("{:?}", codec());
        assert_eq!(rendered, "TokenCodec { .. }");
    }
}
