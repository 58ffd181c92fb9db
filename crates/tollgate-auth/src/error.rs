//! Error types.

use thiserror::Error;

use crate::claims::Scope;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Setup and collaborator errors.
///
/// These come out of configuration loading, pipeline construction, key-set
/// fetching and token inspection. A request is never rejected with one of
/// these; see [`AuthError`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is incomplete or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A strategy was requested for a scope with no registered backends.
    #[error("no backends registered for scope `{0}`")]
    UnknownScope(Scope),

    /// Unable to fetch, parse, or use a JWKS.
    #[error("JWKS error: {0}")]
    Jwks(String),

    /// A token could not be taken apart for inspection.
    #[error("unreadable token: {0}")]
    Token(String),

    /// An error occurred while performing HTTP requests.
    #[cfg(feature = "fetch-reqwest")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// I/O error while reading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// jsonwebtoken error.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Reasons a request fails authentication.
///
/// `Display` is the human-readable message handed to the host framework.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer <token>` header. Not an authentication
    /// failure as such: another mechanism may still handle the request.
    #[error("no bearer token present")]
    NoCredentials,

    /// Wrong segment count, bad encoding, or a payload that is not a JSON object.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// No available key verifies the signature.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// `exp` is in the past.
    #[error("signature has expired")]
    Expired,

    /// `nbf` is in the future.
    #[error("token is not valid yet")]
    NotYetValid,

    #[error("payload has no scp claim and no default_scope is set")]
    MissingScopeWithNoDefaultFallback,

    #[error("wrong scope")]
    WrongScope,

    #[error("aud_header is missing and valid_auds setting is unset")]
    MissingAudHeaderWithNoFallback,

    #[error("wrong aud")]
    WrongAud,

    #[error("wrong issuer")]
    WrongIssuer,

    #[error("nil user")]
    NilUser,

    #[error("revoked token")]
    RevokedToken,

    /// A user or revocation backend failed. Treated as a rejection.
    #[error("backend failure: {0}")]
    Backend(String),

    /// The effective scope has no registered backend.
    #[error("no backend registered for scope `{0}`")]
    UnregisteredScope(Scope),
}

impl AuthError {
    /// True when the request simply carried no token.
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Self::NoCredentials)
    }

    /// Stable snake_case identifier of the rejection kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCredentials => "no_credentials",
            Self::MalformedToken(_) => "malformed_token",
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::MissingScopeWithNoDefaultFallback => "missing_scope_with_no_default_fallback",
            Self::WrongScope => "wrong_scope",
            Self::MissingAudHeaderWithNoFallback => "missing_aud_header_with_no_fallback",
            Self::WrongAud => "wrong_aud",
            Self::WrongIssuer => "wrong_issuer",
            Self::NilUser => "nil_user",
            Self::RevokedToken => "revoked_token",
            Self::Backend(_) => "backend_failure",
            Self::UnregisteredScope(_) => "unregistered_scope",
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Error returned by user repositories and revocation strategies.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_credentials_is_not_applicable() {
        assert!(AuthError::NoCredentials.is_not_applicable());
        assert!(!AuthError::WrongAud.is_not_applicable());
        assert!(!AuthError::SignatureInvalid.is_not_applicable());
    }

    #[test]
    fn backend_error_keeps_message() {
        let io = std::io::Error::other("connection reset");
        let err: AuthError = BackendError::with_source("user lookup failed", io).into();
        assert_eq!(err, AuthError::Backend("user lookup failed".to_string()));
        assert_eq!(err.code(), "backend_failure");
    }
}
