//! End-to-end request authentication.

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderMap;
use http::header::HeaderName;

use crate::claims::{ClaimSet, Scope};
use crate::config::{AuthConfig, KeySource};
use crate::decoder::TokenDecoder;
use crate::error::AuthError;
use crate::header::{bearer_token, header_value};
use crate::jwks::JwksCache;
use crate::resolver::{UserRepository, UserResolver};
use crate::revocation::{RevocationChecker, RevocationStrategy};
use crate::validator::ClaimValidator;
use crate::{Error, Result};

struct ScopeBackends<P> {
    users: Arc<dyn UserRepository<P>>,
    revocation: Arc<dyn RevocationStrategy<P>>,
}

/// Assembles an [`AuthPipeline`] and checks its configuration.
pub struct PipelineBuilder<P> {
    config: AuthConfig,
    scopes: HashMap<Scope, ScopeBackends<P>>,
    jwks_cache: Option<Arc<JwksCache>>,
}

impl<P: Send + Sync + 'static> PipelineBuilder<P> {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            scopes: HashMap::new(),
            jwks_cache: None,
        }
    }

    /// Register the user repository and revocation strategy for `scope`.
    #[must_use]
    pub fn scope(
        mut self,
        scope: impl Into<Scope>,
        users: Arc<dyn UserRepository<P>>,
        revocation: Arc<dyn RevocationStrategy<P>>,
    ) -> Self {
        self.scopes
            .insert(scope.into(), ScopeBackends { users, revocation });
        self
    }

    /// Use this key-set cache instead of the shared one.
    #[must_use]
    pub fn jwks_cache(mut self, cache: Arc<JwksCache>) -> Self {
        self.jwks_cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<AuthPipeline<P>> {
        if self.scopes.is_empty() {
            return Err(Error::Config("at least one scope must be registered".to_string()));
        }
        if let Some(default) = &self.config.default_scope {
            if !self.scopes.contains_key(default) {
                return Err(Error::Config(format!(
                    "default scope `{default}` has no registered backends"
                )));
            }
        }

        let aud_header = self
            .config
            .aud_header
            .as_deref()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| Error::Config(format!("invalid aud_header name `{name}`")))
            })
            .transpose()?;

        let cache = match (&self.config.keys, self.jwks_cache) {
            (KeySource::Jwks { .. }, Some(cache)) => Some(cache),
            #[cfg(feature = "fetch-reqwest")]
            (KeySource::Jwks { .. }, None) => Some(JwksCache::shared()?),
            (_, cache) => cache,
        };
        let decoder = TokenDecoder::new(&self.config.keys, self.config.leeway_seconds, cache)?;

        let mut users = HashMap::new();
        let mut revocations = HashMap::new();
        for (scope, backends) in self.scopes {
            users.insert(scope.clone(), backends.users);
            revocations.insert(scope, backends.revocation);
        }

        Ok(AuthPipeline {
            inner: Arc::new(Inner {
                config: self.config,
                aud_header,
                decoder,
                users: UserResolver::new(users),
                revocation: RevocationChecker::new(revocations),
            }),
        })
    }
}

struct Inner<P> {
    config: AuthConfig,
    aud_header: Option<HeaderName>,
    decoder: TokenDecoder,
    users: UserResolver<P>,
    revocation: RevocationChecker<P>,
}

/// Header → token → claims → principal → decision.
///
/// Cheap to clone; all state is shared and read-only.
pub struct AuthPipeline<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for AuthPipeline<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> std::fmt::Debug for AuthPipeline<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPipeline")
            .field("config", &self.inner.config)
            .field("decoder", &self.inner.decoder)
            .finish_non_exhaustive()
    }
}

/// Outcome of the issuer pre-check before it is collapsed to a boolean.
enum IssuerCheck {
    Unconfigured,
    Undecodable,
    Matches,
    Mismatch,
}

impl<P: Send + Sync + 'static> AuthPipeline<P> {
    pub fn builder(config: AuthConfig) -> PipelineBuilder<P> {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn decoder(&self) -> &TokenDecoder {
        &self.inner.decoder
    }

    /// A strategy bound to `scope`. Fails if the scope has no backends.
    pub fn strategy(&self, scope: impl Into<Scope>) -> Result<Strategy<P>> {
        let scope = scope.into();
        if !self.inner.users.has_scope(&scope) {
            return Err(Error::UnknownScope(scope));
        }
        Ok(Strategy {
            pipeline: self.clone(),
            scope,
        })
    }

    /// Cheap check of whether full authentication is worth attempting.
    ///
    /// True when a bearer token is present and, if an issuer is configured,
    /// the token's `iss` matches it. A token that fails to decode still
    /// counts as worth attempting; the full pipeline rejects it.
    pub async fn is_valid(&self, headers: &HeaderMap) -> bool {
        let Some(token) = bearer_token(headers) else {
            return false;
        };
        match self.issuer_check(token).await {
            IssuerCheck::Unconfigured | IssuerCheck::Undecodable | IssuerCheck::Matches => true,
            IssuerCheck::Mismatch => false,
        }
    }

    async fn issuer_check(&self, token: &str) -> IssuerCheck {
        if self.inner.config.issuer.is_none() {
            return IssuerCheck::Unconfigured;
        }
        match self.inner.decoder.decode(token).await {
            Ok(claims) if ClaimValidator::new(&self.inner.config).issuer_matches(&claims) => {
                IssuerCheck::Matches
            }
            Ok(_) => IssuerCheck::Mismatch,
            Err(err) => {
                tracing::debug!(error = %err, "issuer pre-check could not decode token");
                IssuerCheck::Undecodable
            }
        }
    }

    /// Authenticate a request for `scope`.
    ///
    /// Every failure is returned as an [`AuthError`]; nothing escapes as a panic.
    pub async fn authenticate(&self, headers: &HeaderMap, scope: &str) -> std::result::Result<P, AuthError> {
        let Some(token) = bearer_token(headers) else {
            tracing::debug!(scope, "no bearer token");
            return Err(AuthError::NoCredentials);
        };
        let expected_aud = self
            .inner
            .aud_header
            .as_ref()
            .and_then(|name| header_value(headers, name));

        self.authenticate_token(token, scope, expected_aud).await
    }

    /// Run the pipeline on a raw token.
    pub async fn authenticate_token(
        &self,
        token: &str,
        scope: &str,
        expected_aud: Option<&str>,
    ) -> std::result::Result<P, AuthError> {
        match self.run(token, scope, expected_aud).await {
            Ok((principal, claims)) => {
                tracing::debug!(scope = claims.scope(), sub = ?claims.sub(), "jwt accepted");
                Ok(principal)
            }
            Err(err) => {
                if let AuthError::UnregisteredScope(_) = err {
                    tracing::error!(scope, error = %err, "jwt authentication misconfigured");
                } else {
                    tracing::warn!(scope, error = %err, "jwt authentication failed");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        token: &str,
        scope: &str,
        expected_aud: Option<&str>,
    ) -> std::result::Result<(P, ClaimSet), AuthError> {
        let inner = &*self.inner;

        let mut claims = inner.decoder.decode(token).await?;

        let validator = ClaimValidator::new(&inner.config);
        let scope = validator.validate(&mut claims, scope, expected_aud)?;
        validator.check_issuer(&claims)?;

        let principal = inner
            .users
            .resolve(&claims)
            .await?
            .ok_or(AuthError::NilUser)?;

        if inner.revocation.is_revoked(&claims, &principal, &scope).await? {
            return Err(AuthError::RevokedToken);
        }

        Ok((principal, claims))
    }
}

/// An [`AuthPipeline`] bound to one scope, the unit a host framework calls.
pub struct Strategy<P> {
    pipeline: AuthPipeline<P>,
    scope: Scope,
}

impl<P> Clone for Strategy<P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<P> std::fmt::Debug for Strategy<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<P: Send + Sync + 'static> Strategy<P> {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn pipeline(&self) -> &AuthPipeline<P> {
        &self.pipeline
    }

    /// See [`AuthPipeline::is_valid`].
    pub async fn is_valid(&self, headers: &HeaderMap) -> bool {
        self.pipeline.is_valid(headers).await
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> std::result::Result<P, AuthError> {
        self.pipeline.authenticate(headers, &self.scope).await
    }
}
