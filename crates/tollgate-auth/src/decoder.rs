//! Signature verification and claim-set decoding.

use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde_json::Value;

use crate::claims::ClaimSet;
use crate::config::KeySource;
use crate::error::AuthError;
use crate::jwks::{Jwk, JwksCache, JwksSet};
use crate::{Error, Result};

enum Keys {
    Static {
        algorithm: Algorithm,
        key: DecodingKey,
    },
    Jwks {
        url: String,
        cache: Arc<JwksCache>,
    },
}

/// Verifies tokens and decodes their claim sets.
pub struct TokenDecoder {
    keys: Keys,
    leeway_seconds: u64,
}

impl std::fmt::Debug for TokenDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        let source = match &self.keys {
            Keys::Static { algorithm, .. } => format!("static {algorithm:?}"),
            Keys::Jwks { url, .. } => format!("jwks {url}"),
        };
        f.debug_struct("TokenDecoder")
            .field("keys", &source)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl TokenDecoder {
    /// Build a decoder. `cache` is required for [`KeySource::Jwks`].
    pub fn new(
        source: &KeySource,
        leeway_seconds: u64,
        cache: Option<Arc<JwksCache>>,
    ) -> Result<Self> {
        let keys = match source {
            KeySource::Secret { algorithm, secret } => {
                if !is_hmac(*algorithm) {
                    return Err(Error::Config(format!(
                        "{algorithm:?} cannot be used with a shared secret"
                    )));
                }
                Keys::Static {
                    algorithm: *algorithm,
                    key: DecodingKey::from_secret(secret),
                }
            }
            KeySource::Pem { algorithm, pem } => Keys::Static {
                algorithm: *algorithm,
                key: pem_key(*algorithm, pem)?,
            },
            KeySource::Jwks { url } => Keys::Jwks {
                url: url.clone(),
                cache: cache.ok_or_else(|| {
                    Error::Config("a JWKS key source needs a key-set cache".to_string())
                })?,
            },
        };

        Ok(Self {
            keys,
            leeway_seconds,
        })
    }

    /// Verify `token` and return its claims.
    ///
    /// `exp` and `nbf` are checked only when present.
    pub async fn decode(&self, token: &str) -> std::result::Result<ClaimSet, AuthError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::MalformedToken(format!("failed to decode header: {e}")))?;

        match &self.keys {
            Keys::Static { algorithm, key } => self.verify(token, key, *algorithm),
            Keys::Jwks { url, cache } => {
                let jwks = cache.load(url, false).await;
                match self.verify_against_jwks(token, &header, jwks.as_deref()) {
                    Err(AuthError::SignatureInvalid)
                        if jwks.as_deref().is_some_and(|set| needs_reload(&header, set)) =>
                    {
                        tracing::debug!(url, kid = ?header.kid, "no matching key, reloading JWKS");
                        let jwks = cache.load(url, true).await;
                        self.verify_against_jwks(token, &header, jwks.as_deref())
                    }
                    other => other,
                }
            }
        }
    }

    fn verify_against_jwks(
        &self,
        token: &str,
        header: &Header,
        jwks: Option<&JwksSet>,
    ) -> std::result::Result<ClaimSet, AuthError> {
        let Some(jwks) = jwks else {
            return Err(AuthError::SignatureInvalid);
        };

        // Prefer kid match when present.
        let mut candidates: Vec<&Jwk> = match header.kid.as_deref() {
            Some(kid) => jwks
                .keys
                .iter()
                .filter(|k| k.kid.as_deref() == Some(kid))
                .collect(),
            None => Vec::new(),
        };
        if candidates.is_empty() {
            candidates = jwks.keys.iter().collect();
        }

        for jwk in candidates {
            let key = match jwk.decoding_key() {
                Ok(key) => key,
                Err(err) => {
                    tracing::debug!(kid = ?jwk.kid, error = %err, "skipping unusable JWK");
                    continue;
                }
            };
            let algorithm = jwk.algorithm().unwrap_or(header.alg);
            match self.verify(token, &key, algorithm) {
                Err(AuthError::SignatureInvalid) => {}
                done => return done,
            }
        }

        Err(AuthError::SignatureInvalid)
    }

    fn verify(
        &self,
        token: &str,
        key: &DecodingKey,
        algorithm: Algorithm,
    ) -> std::result::Result<ClaimSet, AuthError> {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // `aud` and `iss` are policy checks, done by the claim validator.
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let data = jsonwebtoken::decode::<Value>(token, key, &validation).map_err(rejection)?;
        ClaimSet::from_value(data.claims)
            .ok_or_else(|| AuthError::MalformedToken("payload is not a JSON object".to_string()))
    }
}

/// Decode header and payload without verifying anything.
///
/// For diagnostics only; never use the result to make an access decision.
pub fn insecure_peek(token: &str) -> Result<(Value, Value)> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::Token("token must have three segments".to_string()));
    };

    let decode = |segment: &str| -> Result<Value> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(segment.trim_end_matches('='))
            .map_err(|e| Error::Token(format!("invalid base64url segment: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Token(format!("segment is not JSON: {e}")))
    };

    Ok((decode(header)?, decode(payload)?))
}

/// A set that was fetched but cannot know the token's key.
fn needs_reload(header: &Header, jwks: &JwksSet) -> bool {
    if jwks.keys.is_empty() {
        return true;
    }
    header.kid.as_deref().is_some_and(|kid| !jwks.contains_kid(kid))
}

fn rejection(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidKeyFormat => {
            AuthError::SignatureInvalid
        }
        _ => AuthError::MalformedToken(err.to_string()),
    }
}

fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

fn pem_key(algorithm: Algorithm, pem: &str) -> Result<DecodingKey> {
    let pem = pem.as_bytes();
    let key = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem)?,
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem)?,
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem)?,
        other => {
            return Err(Error::Config(format!(
                "{other:?} cannot be used with a PEM key"
            )));
        }
    };
    Ok(key)
}
