//! Claim-set to principal resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::claims::{ClaimSet, Scope};
use crate::error::{AuthError, BackendError};

/// Looks up the principal a token was issued for.
#[async_trait]
pub trait UserRepository<P>: Send + Sync {
    /// `Ok(None)` when no such user exists.
    async fn find_for_jwt_authentication(
        &self,
        sub: &str,
        claims: &ClaimSet,
    ) -> Result<Option<P>, BackendError>;
}

/// Dispatches to the repository registered for the claim set's scope.
pub struct UserResolver<P> {
    repositories: HashMap<Scope, Arc<dyn UserRepository<P>>>,
}

impl<P> UserResolver<P> {
    pub fn new(repositories: HashMap<Scope, Arc<dyn UserRepository<P>>>) -> Self {
        Self { repositories }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.repositories.contains_key(scope)
    }

    /// Resolve the principal for an already validated claim set.
    ///
    /// A claim set without a usable `sub` resolves to no user.
    pub async fn resolve(&self, claims: &ClaimSet) -> Result<Option<P>, AuthError> {
        let scope = claims.scope().unwrap_or_default();
        let repository = self
            .repositories
            .get(scope)
            .ok_or_else(|| AuthError::UnregisteredScope(scope.to_string()))?;

        let Some(sub) = claims.sub() else {
            return Ok(None);
        };

        Ok(repository.find_for_jwt_authentication(&sub, claims).await?)
    }
}
