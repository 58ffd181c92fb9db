//! axum adapter: a layer that runs a [`Strategy`] on every request.
//!
//! ```ignore
//! let strategy = pipeline.strategy("user")?;
//! let app = tollgate_auth::middleware::protect(Router::new().route("/me", get(me)), strategy);
//!
//! async fn me(Authenticated(user): Authenticated<User>) -> String {
//!     user.name
//! }
//! ```

use axum::Json;
use axum::Router;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::AuthError;
use crate::pipeline::Strategy;

/// The principal accepted for the current request.
#[derive(Debug, Clone)]
pub struct Authenticated<P>(pub P);

/// Require a valid token on every route of `router`.
pub fn protect<S, P>(router: Router<S>, strategy: Strategy<P>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(strategy, authenticate::<P>))
}

async fn authenticate<P>(State(strategy): State<Strategy<P>>, req: Request, next: Next) -> Response
where
    P: Clone + Send + Sync + 'static,
{
    let (mut parts, body) = req.into_parts();
    match strategy.authenticate(&parts.headers).await {
        Ok(principal) => {
            parts.extensions.insert(Authenticated(principal));
            next.run(Request::from_parts(parts, body)).await
        }
        Err(err) => err.into_response(),
    }
}

impl<P, S> FromRequestParts<S> for Authenticated<P>
where
    P: Clone + Send + Sync + 'static,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authenticated<P>>()
            .cloned()
            .ok_or(AuthError::NoCredentials)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: "authentication failed",
            },
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, KeySource};
    use crate::decoder::tests::{SECRET, sign};
    use crate::pipeline::AuthPipeline;
    use crate::resolver::tests::{User, Users};
    use crate::revocation::NullRevocation;
    use axum::body::{Body, to_bytes};
    use axum::routing::get;
    use jsonwebtoken::Algorithm;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn whoami(Authenticated(user): Authenticated<User>) -> String {
        user.id.to_string()
    }

    fn app() -> Router {
        let config = AuthConfig::new(KeySource::Secret {
            algorithm: Algorithm::HS256,
            secret: SECRET.to_vec(),
        });
        let strategy = AuthPipeline::builder(config)
            .scope("user", Arc::new(Users(vec![42])), Arc::new(NullRevocation))
            .build()
            .unwrap()
            .strategy("user")
            .unwrap();
        protect(Router::new().route("/whoami", get(whoami)), strategy)
    }

    fn request(token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn accepted_principal_reaches_handler() {
        let token = sign(&json!({"sub": "42", "scp": "user"}));
        let response = app().oneshot(request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"42");
    }

    #[tokio::test]
    async fn rejection_is_401_with_code_only() {
        let token = sign(&json!({"sub": "42", "scp": "admin"}));
        let response = app().oneshot(request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await,
            json!({"error": {"code": "wrong_scope", "message": "authentication failed"}})
        );
    }

    #[tokio::test]
    async fn missing_token_is_401() {
        let response = app().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "no_credentials");
    }
}
