//! Authentication configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::claims::Scope;
use crate::{Error, Result};

/// Default name of the header carrying the expected audience.
pub const DEFAULT_AUD_HEADER: &str = "JWT_AUD";

/// Where verification keys come from.
#[derive(Clone)]
pub enum KeySource {
    /// HMAC secret.
    Secret { algorithm: Algorithm, secret: Vec<u8> },
    /// PEM-encoded public key (RSA, EC or Ed25519).
    Pem { algorithm: Algorithm, pem: String },
    /// Remote key set, fetched through a [`JwksCache`](crate::JwksCache).
    Jwks { url: String },
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        match self {
            Self::Secret { algorithm, .. } => f
                .debug_struct("Secret")
                .field("algorithm", algorithm)
                .finish_non_exhaustive(),
            Self::Pem { algorithm, .. } => f
                .debug_struct("Pem")
                .field("algorithm", algorithm)
                .finish_non_exhaustive(),
            Self::Jwks { url } => f.debug_struct("Jwks").field("url", url).finish(),
        }
    }
}

/// Process-wide settings, fixed once the pipeline is built.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Verification keys.
    pub keys: KeySource,

    /// Clock skew tolerated on `exp`/`nbf`, in seconds.
    pub leeway_seconds: u64,

    /// Scope injected into tokens that carry no `scp` claim.
    pub default_scope: Option<Scope>,

    /// Expected `iss`. Unset means any issuer is accepted.
    pub issuer: Option<String>,

    /// Audiences accepted when the request names none.
    pub valid_auds: Option<Vec<String>>,

    /// Request header carrying the expected audience.
    pub aud_header: Option<String>,
}

impl AuthConfig {
    pub fn new(keys: KeySource) -> Self {
        Self {
            keys,
            leeway_seconds: 0,
            default_scope: None,
            issuer: None,
            valid_auds: None,
            aud_header: Some(DEFAULT_AUD_HEADER.to_string()),
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse a TOML document.
    ///
    /// An empty `aud_header` disables reading the expected audience from
    /// requests; leaving it out keeps [`DEFAULT_AUD_HEADER`].
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)?;

        let keys = match raw.keys {
            RawKeys::Secret {
                algorithm,
                secret,
                secret_env,
            } => {
                let secret = match (secret, secret_env) {
                    (Some(secret), _) => secret,
                    (None, Some(var)) => std::env::var(&var).map_err(|_| {
                        Error::Config(format!("environment variable {var} is not set"))
                    })?,
                    (None, None) => {
                        return Err(Error::Config(
                            "keys.secret or keys.secret_env is required".to_string(),
                        ));
                    }
                };
                KeySource::Secret {
                    algorithm: parse_algorithm(&algorithm)?,
                    secret: secret.into_bytes(),
                }
            }
            RawKeys::Pem {
                algorithm,
                pem,
                pem_file,
            } => {
                let pem = match (pem, pem_file) {
                    (Some(pem), _) => pem,
                    (None, Some(path)) => fs::read_to_string(&path).map_err(|e| {
                        Error::Config(format!("failed to read {}: {e}", path.display()))
                    })?,
                    (None, None) => {
                        return Err(Error::Config(
                            "keys.pem or keys.pem_file is required".to_string(),
                        ));
                    }
                };
                KeySource::Pem {
                    algorithm: parse_algorithm(&algorithm)?,
                    pem,
                }
            }
            RawKeys::Jwks { url } => KeySource::Jwks { url },
        };

        let aud_header = match raw.aud_header {
            Some(name) if name.trim().is_empty() => None,
            Some(name) => Some(name),
            None => Some(DEFAULT_AUD_HEADER.to_string()),
        };

        Ok(Self {
            keys,
            leeway_seconds: raw.leeway_seconds,
            default_scope: raw.default_scope,
            issuer: raw.issuer,
            valid_auds: raw.valid_auds,
            aud_header,
        })
    }
}

pub(crate) fn parse_algorithm(name: &str) -> Result<Algorithm> {
    Algorithm::from_str(name).map_err(|_| Error::Config(format!("unsupported algorithm {name}")))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    keys: RawKeys,
    #[serde(default)]
    leeway_seconds: u64,
    default_scope: Option<String>,
    issuer: Option<String>,
    valid_auds: Option<Vec<String>>,
    aud_header: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawKeys {
    Secret {
        algorithm: String,
        secret: Option<String>,
        secret_env: Option<String>,
    },
    Pem {
        algorithm: String,
        pem: Option<String>,
        pem_file: Option<PathBuf>,
    },
    Jwks {
        url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_full_document() {
        let cfg = AuthConfig::from_toml_str(
            r#"
            default_scope = "user"
            issuer = "https://issuer.example"
            valid_auds = ["svc-a", "svc-b"]
            leeway_seconds = 30

            [keys]
            kind = "secret"
            algorithm = "HS256"
            secret = "s3cr3t"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.default_scope.as_deref(), Some("user"));
        assert_eq!(cfg.issuer.as_deref(), Some("https://issuer.example"));
        assert_eq!(cfg.valid_auds, Some(vec!["svc-a".into(), "svc-b".into()]));
        assert_eq!(cfg.leeway_seconds, 30);
        assert_eq!(cfg.aud_header.as_deref(), Some(DEFAULT_AUD_HEADER));
        match cfg.keys {
            KeySource::Secret { algorithm, secret } => {
                assert_eq!(algorithm, Algorithm::HS256);
                assert_eq!(secret, b"s3cr3t");
            }
            other => panic!("unexpected keys {other:?}"),
        }
    }

    #[test]
    fn jwks_source_and_disabled_aud_header() {
        let cfg = AuthConfig::from_toml_str(
            r#"
            aud_header = ""
            [keys]
            kind = "jwks"
            url = "https://issuer.example/jwks.json"
            "#,
        )
        .unwrap();

        assert!(cfg.aud_header.is_none());
        assert!(matches!(cfg.keys, KeySource::Jwks { ref url } if url.ends_with("jwks.json")));
    }

    #[test]
    fn secret_is_required() {
        let err = AuthConfig::from_toml_str(
            r#"
            [keys]
            kind = "secret"
            algorithm = "HS256"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let err = AuthConfig::from_toml_str(
            r#"
            [keys]
            kind = "secret"
            algorithm = "HS999"
            secret = "x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_hides_key_material() {
        let keys = KeySource::Secret {
            algorithm: Algorithm::HS256,
            secret: b"hunter2".to_vec(),
        };
        assert!(!format!("{keys:?}").contains("hunter2"));
    }
}
