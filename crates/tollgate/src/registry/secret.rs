//! Client secret hashing.
//!
//! Secrets are stored as `sha256$<salt>$<digest>` where the digest is
//! `SHA256(salt || secret)` and both parts are base64url without padding.
//! Verification recomputes the digest and compares in constant time.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::RegistryError;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// One-way salted hash of a client secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretHash {
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
}

impl SecretHash {
    /// Hash a secret with a fresh random salt.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::with_salt(secret, salt)
    }

    /// Hash a secret with a caller-chosen salt.
    #[must_use]
    pub fn with_salt(secret: &str, salt: [u8; SALT_LEN]) -> Self {
        Self {
            salt,
            digest: compute(&salt, secret),
        }
    }

    /// Hash of a random secret nobody knows.
    ///
    /// Verified against when a client id is unknown so that path costs the
    /// same as a wrong secret.
    #[must_use]
    pub fn unguessable() -> Self {
        let mut secret = [0u8; DIGEST_LEN];
        OsRng.fill_bytes(&mut secret);
        Self::new(&URL_SAFE_NO_PAD.encode(secret))
    }

    /// Check a presented secret. Constant time in the digest comparison.
    #[must_use]
    pub fn verify(&self, secret: &str) -> bool {
        let candidate = compute(&self.salt, secret);
        candidate[..].ct_eq(&self.digest[..]).into()
    }

    /// Encoded storage form.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{SCHEME}${}${}",
            URL_SAFE_NO_PAD.encode(self.salt),
            URL_SAFE_NO_PAD.encode(self.digest)
        )
    }
}

fn compute(salt: &[u8; SALT_LEN], secret: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

fn decode_fixed<const N: usize>(part: &str, what: &str) -> Result<[u8; N], RegistryError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| RegistryError::invalid_record(format!("secret hash {what}: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        RegistryError::invalid_record(format!(
            "secret hash {what}: expected {N} bytes, got {}",
            b.len()
        ))
    })
}

impl FromStr for SecretHash {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('$');
        let (Some(scheme), Some(salt), Some(digest), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(RegistryError::invalid_record(
                "secret hash must have three '$'-separated parts",
            ));
        };
        if scheme != SCHEME {
            return Err(RegistryError::invalid_record(format!(
                "unsupported hash scheme '{scheme}'"
            )));
        }
        Ok(Self {
            salt: decode_fixed(salt, "salt")?,
            digest: decode_fixed(digest, "digest")?,
        })
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(<redacted>)")
    }
}

impl Serialize for SecretHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for SecretHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_original_secret() {
        let hash = SecretHash::new("s3cr3t");
        assert!(hash.verify("s3cr3t"));
        assert!(!hash.verify("s3cr3t "));
        assert!(!hash.verify(""));
    }

    #[test]
    fn test_same_secret_different_salts() {
        let a = SecretHash::new("postman-secret");
        let b = SecretHash::new("postman-secret");
        assert_ne!(a.encode(), b.encode());
        assert!(a.verify("postman-secret") && b.verify("postman-secret"));
    }

    #[test]
    fn test_salt_uses_every_bit() {
        // A UUID-shaped salt pins the version nibble to 4 and the variant bits to 0b10.
        let salts: Vec<_> = (0..64).map(|_| SecretHash::new("s").salt).collect();
        assert!(salts.iter().any(|salt| salt[6] >> 4 != 4));
        assert!(salts.iter().any(|salt| salt[8] >> 6 != 0b10));
    }

    #[test]
    fn test_encoding_parses_back() {
        let hash = SecretHash::with_salt("abc", [7; SALT_LEN]);
        let encoded = hash.encode();
        assert!(encoded.starts_with("sha256$"));

        let parsed: SecretHash = encoded.parse().unwrap();
        assert_eq!(parsed, hash);
        assert!(parsed.verify("abc"));
    }

    #[test]
    fn test_rejects_malformed_encodings() {
        assert!("plaintext".parse::<SecretHash>().is_err());
        assert!("md5$aaaa$bbbb".parse::<SecretHash>().is_err());
        assert!("sha256$AAAA$AAAA".parse::<SecretHash>().is_err());
        assert!("sha256$a$b$c".parse::<SecretHash>().is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let hash = SecretHash::new("hunter2");
        assert_eq!(format!("{hash:?}"), "SecretHash(<redacted>)");
    }

    #[test]
    fn test_unguessable_rejects_common_secrets() {
        let hash = SecretHash::unguessable();
        assert!(!hash.verify(""));
        assert!(!hash.verify("postman-secret"));
    }
}
