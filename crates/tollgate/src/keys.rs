//! Access token signing key.
//!
//! One Ed25519 keypair per process, generated at startup (or loaded from a
//! seed file when configured) and shared read-only behind an `Arc`. Tokens are
//! compact JWS with `alg = EdDSA` and a `kid` derived from the public key.
//!
//! With the default ephemeral key, tokens issued before a restart no longer
//! verify afterwards.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{KeyError, KeyResult, VerifyError};

/// Signature algorithm for every token this server issues.
pub const ALGORITHM: Algorithm = Algorithm::EdDSA;

const SEED_LEN: usize = 32;

/// PKCS#8 v1 prefix for a bare Ed25519 private key (RFC 8410).
const PKCS8_ED25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, // SEQUENCE, 46 bytes
    0x02, 0x01, 0x00, // INTEGER version 0
    0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
    0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
    0x04, 0x22, // OCTET STRING, 34 bytes
    0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
];

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer URL.
    pub iss: String,
    /// Subject: the client id.
    pub sub: String,
    /// Client the token was issued to (same as `sub` for this grant).
    pub client_id: String,
    /// Space-separated granted scopes.
    pub scope: String,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Unique token id.
    pub jti: String,
}

impl AccessTokenClaims {
    /// Granted scopes as a set.
    #[must_use]
    pub fn scopes(&self) -> BTreeSet<String> {
        self.scope.split_whitespace().map(str::to_owned).collect()
    }
}

/// Public half of the signing key as a JSON Web Key (RFC 8037).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
}

/// Owns the signing keypair.
#[derive(Clone)]
pub struct KeyManager {
    issuer: String,
    kid: String,
    public_key: [u8; 32],
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyManager {
    /// Generate a fresh ephemeral keypair.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Randomness` if the OS randomness source fails. The
    /// server cannot start without a key.
    pub fn generate(issuer: impl Into<String>) -> KeyResult<Self> {
        let seed = random_seed()?;
        Self::from_seed(&seed, issuer)
    }

    /// Load the seed from `path`, or generate one and write it there.
    ///
    /// The file holds the 32-byte seed as base64url. On unix it is created
    /// with mode 0600.
    pub fn load_or_generate(path: &Path, issuer: impl Into<String>) -> KeyResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let seed = decode_seed(path, contents.trim())?;
                tracing::info!(path = %path.display(), "Loaded signing key");
                Self::from_seed(&seed, issuer)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let seed = random_seed()?;
                write_seed(path, &seed)?;
                tracing::info!(path = %path.display(), "Generated and stored new signing key");
                Self::from_seed(&seed, issuer)
            }
            Err(source) => Err(KeyError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn from_seed(seed: &[u8; SEED_LEN], issuer: impl Into<String>) -> KeyResult<Self> {
        let signing_key = SigningKey::from_bytes(seed);
        let public_key = signing_key.verifying_key().to_bytes();

        let mut pkcs8_der =
            Zeroizing::new(Vec::with_capacity(PKCS8_ED25519_PREFIX.len() + SEED_LEN));
        pkcs8_der.extend_from_slice(&PKCS8_ED25519_PREFIX);
        pkcs8_der.extend_from_slice(seed);

        let encoding = EncodingKey::from_ed_der(&pkcs8_der);
        let decoding = DecodingKey::from_ed_components(&URL_SAFE_NO_PAD.encode(public_key))?;

        let fingerprint = Sha256::digest(public_key);
        let kid = URL_SAFE_NO_PAD.encode(&fingerprint[..16]);

        Ok(Self {
            issuer: issuer.into(),
            kid,
            public_key,
            encoding,
            decoding,
        })
    }

    /// Issuer URL stamped into and required on every token.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Key id placed in the JWS header.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Sign a claim set into a compact JWS.
    pub fn sign(&self, claims: &AccessTokenClaims) -> KeyResult<String> {
        let mut header = Header::new(ALGORITHM);
        header.kid = Some(self.kid.clone());
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding)?)
    }

    /// Verify signature, issuer and expiry against the current time.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, VerifyError> {
        self.verify_at(token, unix_now())
    }

    /// Verify against an explicit clock reading (seconds since epoch).
    ///
    /// A token is expired once `now >= exp`; there is no leeway.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<AccessTokenClaims, VerifyError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims =
            ["exp", "iss", "sub"].into_iter().map(str::to_owned).collect::<HashSet<_>>();
        validation.set_issuer(&[&self.issuer]);

        let claims =
            jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding, &validation)?.claims;

        if claims.exp <= now {
            return Err(VerifyError::Expired);
        }
        Ok(claims)
    }

    /// Public key for the key-set endpoint.
    #[must_use]
    pub fn jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP".to_owned(),
            crv: "Ed25519".to_owned(),
            x: URL_SAFE_NO_PAD.encode(self.public_key),
            kid: self.kid.clone(),
            alg: "EdDSA".to_owned(),
            key_use: "sig".to_owned(),
        }
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("issuer", &self.issuer)
            .field("kid", &self.kid)
            .finish()
    }
}

/// Current time in seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

fn random_seed() -> KeyResult<Zeroizing<[u8; SEED_LEN]>> {
    let mut seed = Zeroizing::new([0u8; SEED_LEN]);
    OsRng.try_fill_bytes(&mut seed[..]).map_err(|e| {
        tracing::error!(error = %e, "OS randomness unavailable, cannot generate signing key");
        KeyError::Randomness(e.to_string())
    })?;
    Ok(seed)
}

fn decode_seed(path: &Path, encoded: &str) -> KeyResult<Zeroizing<[u8; SEED_LEN]>> {
    let invalid = |reason: String| KeyError::InvalidKeyFile {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| invalid(e.to_string()))?;
    let bytes = Zeroizing::new(bytes);
    if bytes.len() != SEED_LEN {
        return Err(invalid(format!("expected {SEED_LEN} bytes, got {}", bytes.len())));
    }
    let mut seed = Zeroizing::new([0u8; SEED_LEN]);
    seed.copy_from_slice(&bytes);
    Ok(seed)
}

fn write_seed(path: &Path, seed: &[u8; SEED_LEN]) -> KeyResult<()> {
    use std::io::Write;

    let io_err = |source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let encoded = Zeroizing::new(URL_SAFE_NO_PAD.encode(seed));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(io_err)?;
    file.write_all(encoded.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}
