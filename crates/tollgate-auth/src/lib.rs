//! tollgate-auth
//!
//! Bearer-token authentication for HTTP services. A request either yields an
//! authenticated principal or a typed rejection:
//!
//! - **Decode and verify** the token with a shared secret, a PEM key, or a
//!   cached JWKS (kid selection, forced reload on unknown kid)
//! - **Validate claims**: scope (with an optional default), audience against a
//!   request header or an allow-list, issuer
//! - **Resolve the principal** through a per-scope [`UserRepository`] and ask a
//!   per-scope [`RevocationStrategy`] whether the token is still good
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tollgate_auth::{AuthConfig, AuthPipeline, BackendError, ClaimSet, KeySource, NullRevocation, UserRepository};
//!
//! #[derive(Clone)]
//! struct User { id: String }
//!
//! struct Users;
//!
//! #[async_trait]
//! impl UserRepository<User> for Users {
//!     async fn find_for_jwt_authentication(&self, sub: &str, _: &ClaimSet) -> Result<Option<User>, BackendError> {
//!         Ok(Some(User { id: sub.to_string() }))
//!     }
//! }
//!
//! # async fn demo(headers: http::HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new(KeySource::Jwks {
//!     url: "https://issuer.example/.well-known/jwks.json".to_string(),
//! });
//! let pipeline = AuthPipeline::builder(config)
//!     .scope("user", Arc::new(Users), Arc::new(NullRevocation))
//!     .build()?;
//!
//! let strategy = pipeline.strategy("user")?;
//! if strategy.is_valid(&headers).await {
//!     let user = strategy.authenticate(&headers).await?;
//!     println!("id={}", user.id);
//! }
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod claims;
mod config;
mod decoder;
mod error;
mod header;
mod jwks;
#[cfg(feature = "axum")]
pub mod middleware;
mod pipeline;
mod resolver;
mod revocation;
mod validator;

pub use claims::{ClaimSet, Scope};
pub use config::{AuthConfig, DEFAULT_AUD_HEADER, KeySource};
pub use decoder::{TokenDecoder, insecure_peek};
pub use error::{AuthError, BackendError, Error, Result};
pub use header::bearer_token;
#[cfg(feature = "fetch-reqwest")]
pub use jwks::ReqwestFetcher;
pub use jwks::{FetchedJwks, Jwk, JwksCache, JwksFetcher, JwksSet};
pub use pipeline::{AuthPipeline, PipelineBuilder, Strategy};
pub use resolver::{UserRepository, UserResolver};
pub use revocation::{JtiDenylist, NullRevocation, RevocationChecker, RevocationStrategy};
pub use validator::ClaimValidator;
