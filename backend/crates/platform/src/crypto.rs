//! Cryptographic Utilities
//!
//! - Random bytes and alphanumeric tokens
//! - HMAC-SHA256 signing and constant-time verification (url-safe base64 tags)
//! - Authenticated symmetric encryption (AES-256-CTR, encrypt-then-MAC)
//!
//! ## Ciphertext layout
//! `base64url( IV[16] || AES-256-CTR(base64url(plain)) || HMAC-SHA256(IV || ct)[32] )`
//!
//! Encryption and authentication keys are derived from the caller's 32-byte
//! key with HMAC-SHA256 over fixed labels.

use aes::Aes256;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore, distr::Alphanumeric};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Required length of encryption keys
pub const KEY_LEN: usize = 32;
/// Length of the per-message initialization vector
pub const IV_LEN: usize = 16;
/// Length of the HMAC-SHA256 authenticator
pub const TAG_LEN: usize = 32;

const ENCRYPTION_LABEL: &[u8] = b"eveauth/encryption";
const AUTHENTICATION_LABEL: &[u8] = b"eveauth/authentication";

/// Cryptographic failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Key must be {expected} bytes (got {actual})")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Malformed base64 input")]
    InvalidBase64,

    #[error("Ciphertext is shorter than IV and authenticator")]
    TooShort,

    #[error("Authenticator mismatch")]
    TagMismatch,
}

// ============================================================================
// Randomness
// ============================================================================

/// Generate cryptographically secure random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random token over `[A-Za-z0-9]`
pub fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode bytes as url-safe base64 without padding
pub fn to_base64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode url-safe base64 without padding
pub fn from_base64(s: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| CryptoError::InvalidBase64)
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// HMAC-SHA256
// ============================================================================

fn hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Compute an HMAC-SHA256 tag as url-safe base64
pub fn compute_hmac(message: &[u8], secret: &[u8]) -> String {
    to_base64(&hmac_sha256(secret, &[message]))
}

/// Verify an HMAC-SHA256 tag in constant time
///
/// A tag that is not valid base64 yields `false`; the tag content is never logged.
pub fn verify_hmac(message: &[u8], tag: &str, secret: &[u8]) -> bool {
    let Ok(tag) = from_base64(tag) else {
        tracing::debug!("HMAC tag is not valid base64");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&tag).is_ok()
}

// ============================================================================
// Authenticated encryption
// ============================================================================

struct DerivedKeys {
    encryption: Zeroizing<[u8; KEY_LEN]>,
    authentication: Zeroizing<[u8; KEY_LEN]>,
}

impl DerivedKeys {
    fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        Ok(Self {
            encryption: Zeroizing::new(hmac_sha256(key, &[ENCRYPTION_LABEL])),
            authentication: Zeroizing::new(hmac_sha256(key, &[AUTHENTICATION_LABEL])),
        })
    }

    fn apply_keystream(&self, iv: &[u8], buf: &mut [u8]) -> Result<(), CryptoError> {
        let mut cipher = Aes256Ctr::new_from_slices(self.encryption.as_slice(), iv).map_err(
            |_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: self.encryption.len(),
            },
        )?;
        cipher.apply_keystream(buf);
        Ok(())
    }
}

/// Encrypt arbitrary bytes under a 32-byte key
///
/// Every call draws a fresh random IV, so encrypting the same plaintext twice
/// yields different ciphertexts.
pub fn encrypt(plain: &[u8], key: &[u8]) -> Result<String, CryptoError> {
    let keys = DerivedKeys::new(key)?;
    let iv = random_bytes(IV_LEN);

    let mut body = to_base64(plain).into_bytes();
    keys.apply_keystream(&iv, &mut body)?;

    let tag = hmac_sha256(keys.authentication.as_slice(), &[&iv, &body]);

    let mut out = Vec::with_capacity(IV_LEN + body.len() + TAG_LEN);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&body);
    out.extend_from_slice(&tag);
    Ok(to_base64(&out))
}

/// Decrypt a value produced by [`encrypt`]
///
/// The authenticator is checked before any decryption takes place.
pub fn decrypt(ciphertext: &str, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let keys = DerivedKeys::new(key)?;
    let raw = from_base64(ciphertext)?;
    if raw.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::TooShort);
    }

    let (signed, tag) = raw.split_at(raw.len() - TAG_LEN);
    let mut mac = HmacSha256::new_from_slice(keys.authentication.as_slice())
        .map_err(|_| CryptoError::TagMismatch)?;
    mac.update(signed);
    mac.verify_slice(tag).map_err(|_| CryptoError::TagMismatch)?;

    let (iv, body) = signed.split_at(IV_LEN);
    let mut body = body.to_vec();
    keys.apply_keystream(iv, &mut body)?;

    let inner = String::from_utf8(body).map_err(|_| CryptoError::InvalidBase64)?;
    from_base64(&inner)
}
