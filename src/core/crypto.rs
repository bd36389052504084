//! Crypto Capabilities
//!
//! Password digests and the per-match symmetric cipher used for map
//! broadcasts. Both are SHA-256 based.
//!
//! The cipher is a counter-mode keystream derived from the match secret,
//! with a random nonce prefix and a trailing integrity tag:
//!
//! ```text
//! nonce (16) | ciphertext (n) | tag (32)
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// Integrity tag length in bytes.
pub const TAG_LEN: usize = 32;

/// Length of generated match secrets.
pub const SECRET_LEN: usize = 16;

const PASSWORD_DOMAIN: &[u8] = b"GRIDMATCH_PASSWORD_V1";
const CIPHER_DOMAIN: &[u8] = b"GRIDMATCH_CIPHER_V1";

/// Cipher errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The secret was empty.
    #[error("cipher secret is empty")]
    EmptySecret,

    /// Ciphertext shorter than nonce plus tag.
    #[error("ciphertext truncated ({0} bytes)")]
    Truncated(usize),

    /// Tag mismatch: wrong secret or corrupted payload.
    #[error("ciphertext failed integrity check")]
    BadTag,
}

/// Hash a plain password the way clients do before sending it.
pub fn hash_password(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(PASSWORD_DOMAIN);
    hasher.update(plain.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Generate a random alphanumeric match secret.
pub fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Symmetric cipher keyed by the match secret.
///
/// Two instances built from the same secret decrypt each other's output.
#[derive(Clone)]
pub struct MatchCipher {
    secret: String,
    key: [u8; 32],
}

impl MatchCipher {
    /// Build a cipher from the shared match secret.
    pub fn from_secret(secret: impl Into<String>) -> Result<Self, CipherError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(CipherError::EmptySecret);
        }
        let mut hasher = Sha256::new();
        hasher.update(CIPHER_DOMAIN);
        hasher.update(secret.as_bytes());
        Ok(Self { secret, key: hasher.finalize().into() })
    }

    /// The secret this cipher was built from.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Short hex fingerprint of the derived key, safe to log.
    pub fn fingerprint(&self) -> String {
        hex::encode(&Sha256::digest(self.key)[..4])
    }

    /// Encrypt `plain` under a fresh random nonce.
    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut out = Vec::with_capacity(NONCE_LEN + plain.len() + TAG_LEN);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(plain);
        self.apply_keystream(&nonce, &mut out[NONCE_LEN..]);
        let tag = self.tag(&nonce, &out[NONCE_LEN..]);
        out.extend_from_slice(&tag);
        out
    }

    /// Decrypt a payload produced by [`MatchCipher::encrypt`].
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated(data.len()));
        }
        let (nonce, rest) = data.split_at(NONCE_LEN);
        let (body, tag) = rest.split_at(rest.len() - TAG_LEN);
        if self.tag(nonce, body)[..] != tag[..] {
            return Err(CipherError::BadTag);
        }
        let mut plain = body.to_vec();
        self.apply_keystream(nonce, &mut plain);
        Ok(plain)
    }

    fn apply_keystream(&self, nonce: &[u8], buf: &mut [u8]) {
        for (counter, chunk) in buf.chunks_mut(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.key);
            hasher.update(nonce);
            hasher.update((counter as u64).to_be_bytes());
            let block = hasher.finalize();
            for (b, k) in chunk.iter_mut().zip(block.iter()) {
                *b ^= k;
            }
        }
    }

    fn tag(&self, nonce: &[u8], body: &[u8]) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(b"tag");
        hasher.update(nonce);
        hasher.update(body);
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for MatchCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchCipher").field("fingerprint", &self.fingerprint()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_stable() {
        assert_eq!(hash_password("hunter2"), hash_password("hunter2"));
        assert_ne!(hash_password("hunter2"), hash_password("hunter3"));
        assert!(!hash_password("x").contains(':'));
    }

    #[test]
    fn test_cipher_round_trip_across_instances() {
        let a = MatchCipher::from_secret("s3cret").unwrap();
        let b = MatchCipher::from_secret("s3cret").unwrap();
        let text = b"    1  2  3\n 1  F  M    \n".repeat(20);
        let sealed = a.encrypt(&text);
        assert_ne!(&sealed[NONCE_LEN..NONCE_LEN + text.len()], &text[..]);
        assert_eq!(b.decrypt(&sealed).unwrap(), text);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let a = MatchCipher::from_secret("one").unwrap();
        let b = MatchCipher::from_secret("two").unwrap();
        assert_eq!(b.decrypt(&a.encrypt(b"hello")), Err(CipherError::BadTag));
        assert_eq!(b.decrypt(&[0u8; 10]), Err(CipherError::Truncated(10)));
    }

    #[test]
    fn test_empty_secret() {
        assert!(matches!(MatchCipher::from_secret(""), Err(CipherError::EmptySecret)));
    }

    #[test]
    fn test_random_secret() {
        let s = random_secret();
        assert_eq!(s.len(), SECRET_LEN);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
