//! Token revocation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;

use crate::claims::{ClaimSet, Scope};
use crate::error::{AuthError, BackendError};

/// Decides whether an otherwise valid token has been revoked.
///
/// Both the claims and the resolved principal are available, so policies
/// like "issued before the last password change" can be expressed.
#[async_trait]
pub trait RevocationStrategy<P>: Send + Sync {
    async fn jwt_revoked(&self, claims: &ClaimSet, principal: &P) -> Result<bool, BackendError>;
}

/// Never revokes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRevocation;

#[async_trait]
impl<P: Sync> RevocationStrategy<P> for NullRevocation {
    async fn jwt_revoked(&self, _claims: &ClaimSet, _principal: &P) -> Result<bool, BackendError> {
        Ok(false)
    }
}

/// In-memory denylist of `jti` values.
///
/// Tokens without a `jti` claim are never revoked by it.
#[derive(Debug, Default)]
pub struct JtiDenylist {
    revoked: DashSet<String>,
}

impl JtiDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, jti: impl Into<String>) {
        self.revoked.insert(jti.into());
    }

    pub fn contains(&self, jti: &str) -> bool {
        self.revoked.contains(jti)
    }
}

impl<S: Into<String>> FromIterator<S> for JtiDenylist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            revoked: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl<P: Sync> RevocationStrategy<P> for JtiDenylist {
    async fn jwt_revoked(&self, claims: &ClaimSet, _principal: &P) -> Result<bool, BackendError> {
        Ok(claims.jti().is_some_and(|jti| self.contains(jti)))
    }
}

/// Dispatches to the strategy registered for a scope.
pub struct RevocationChecker<P> {
    strategies: HashMap<Scope, Arc<dyn RevocationStrategy<P>>>,
}

impl<P: Sync> RevocationChecker<P> {
    pub fn new(strategies: HashMap<Scope, Arc<dyn RevocationStrategy<P>>>) -> Self {
        Self { strategies }
    }

    pub async fn is_revoked(
        &self,
        claims: &ClaimSet,
        principal: &P,
        scope: &str,
    ) -> Result<bool, AuthError> {
        let Some(strategy) = self.strategies.get(scope) else {
            tracing::error!(scope, "no revocation strategy registered");
            return Err(AuthError::UnregisteredScope(scope.to_string()));
        };
        Ok(strategy.jwt_revoked(claims, principal).await?)
    }
}
