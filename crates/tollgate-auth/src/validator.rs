//! Scope, audience and issuer policy.

use crate::claims::{ClaimSet, SCOPE_CLAIM, Scope};
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Checks a decoded claim set against the configured policy.
#[derive(Debug, Clone, Copy)]
pub struct ClaimValidator<'a> {
    config: &'a AuthConfig,
}

impl<'a> ClaimValidator<'a> {
    pub fn new(config: &'a AuthConfig) -> Self {
        Self { config }
    }

    /// Validate scope and audience, returning the effective scope.
    ///
    /// A token without `scp` gets the default scope written into `claims`,
    /// and that scope replaces `scope` for the rest of the checks.
    pub fn validate(
        &self,
        claims: &mut ClaimSet,
        scope: &str,
        expected_aud: Option<&str>,
    ) -> Result<Scope, AuthError> {
        let scope = if claims.has_scope() {
            scope.to_string()
        } else {
            let default = self
                .config
                .default_scope
                .clone()
                .ok_or(AuthError::MissingScopeWithNoDefaultFallback)?;
            claims.insert(SCOPE_CLAIM, default.clone());
            default
        };

        if claims.scope() != Some(scope.as_str()) {
            return Err(AuthError::WrongScope);
        }

        self.check_audience(claims, expected_aud)?;
        Ok(scope)
    }

    fn check_audience(&self, claims: &ClaimSet, expected_aud: Option<&str>) -> Result<(), AuthError> {
        match (expected_aud, claims.audiences()) {
            (None, None) => Ok(()),
            (None, Some(auds)) => {
                let valid = self
                    .config
                    .valid_auds
                    .as_ref()
                    .ok_or(AuthError::MissingAudHeaderWithNoFallback)?;
                if auds.iter().any(|aud| valid.iter().any(|v| v == aud)) {
                    Ok(())
                } else {
                    Err(AuthError::WrongAud)
                }
            }
            (Some(expected), auds) => {
                if auds.is_some_and(|auds| auds.contains(&expected)) {
                    Ok(())
                } else {
                    Err(AuthError::WrongAud)
                }
            }
        }
    }

    /// True when no issuer is configured or `iss` equals it.
    pub fn issuer_matches(&self, claims: &ClaimSet) -> bool {
        match &self.config.issuer {
            None => true,
            Some(issuer) => claims.iss() == Some(issuer.as_str()),
        }
    }

    pub fn check_issuer(&self, claims: &ClaimSet) -> Result<(), AuthError> {
        if self.issuer_matches(claims) {
            Ok(())
        } else {
            Err(AuthError::WrongIssuer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeySource;
    use jsonwebtoken::Algorithm;
    use serde_json::{Value, json};

    fn config() -> AuthConfig {
        AuthConfig::new(KeySource::Secret {
            algorithm: Algorithm::HS256,
            secret: b"secret".to_vec(),
        })
    }

    fn claims(value: Value) -> ClaimSet {
        ClaimSet::from_value(value).unwrap()
    }

    #[test]
    fn accepts_matching_scope_and_audience() {
        let cfg = config();
        let mut c = claims(json!({"sub": "42", "scp": "user", "aud": "svc-a"}));
        let scope = ClaimValidator::new(&cfg)
            .validate(&mut c, "user", Some("svc-a"))
            .unwrap();
        assert_eq!(scope, "user");
    }

    #[test]
    fn missing_scope_without_default_fails() {
        let cfg = config();
        let mut c = claims(json!({"sub": "42", "aud": "svc-a"}));
        assert_eq!(
            ClaimValidator::new(&cfg).validate(&mut c, "user", Some("svc-a")),
            Err(AuthError::MissingScopeWithNoDefaultFallback)
        );
    }

    #[test]
    fn default_scope_is_injected_and_overrides_requested_scope() {
        let mut cfg = config();
        cfg.default_scope = Some("user".to_string());
        let mut c = claims(json!({"sub": "42"}));

        let scope = ClaimValidator::new(&cfg)
            .validate(&mut c, "admin", None)
            .unwrap();

        assert_eq!(scope, "user");
        assert_eq!(c.scope(), Some("user"));
    }

    #[test]
    fn scope_mismatch_fails() {
        let cfg = config();
        let mut c = claims(json!({"sub": "42", "scp": "admin"}));
        assert_eq!(
            ClaimValidator::new(&cfg).validate(&mut c, "user", None),
            Err(AuthError::WrongScope)
        );

        let mut c = claims(json!({"sub": "42", "scp": "User"}));
        assert_eq!(
            ClaimValidator::new(&cfg).validate(&mut c, "user", None),
            Err(AuthError::WrongScope)
        );
    }

    #[test]
    fn non_string_scope_counts_as_present_and_mismatches() {
        let mut cfg = config();
        cfg.default_scope = Some("user".to_string());
        let mut c = claims(json!({"sub": "42", "scp": null}));
        assert_eq!(
            ClaimValidator::new(&cfg).validate(&mut c, "user", None),
            Err(AuthError::WrongScope)
        );
    }

    #[test]
    fn no_audience_anywhere_passes() {
        let cfg = config();
        let mut c = claims(json!({"sub": "42", "scp": "user"}));
        assert!(ClaimValidator::new(&cfg).validate(&mut c, "user", None).is_ok());
    }

    #[test]
    fn audience_claim_without_header_needs_valid_auds() {
        let mut cfg = config();
        let mut c = claims(json!({"sub": "42", "scp": "user", "aud": "svc-a"}));
        assert_eq!(
            ClaimValidator::new(&cfg).validate(&mut c, "user", None),
            Err(AuthError::MissingAudHeaderWithNoFallback)
        );

        cfg.valid_auds = Some(vec!["svc-b".to_string()]);
        assert_eq!(
            ClaimValidator::new(&cfg).validate(&mut c, "user", None),
            Err(AuthError::WrongAud)
        );

        cfg.valid_auds = Some(vec!["svc-b".to_string(), "svc-a".to_string()]);
        assert!(ClaimValidator::new(&cfg).validate(&mut c, "user", None).is_ok());
    }

    #[test]
    fn valid_auds_intersect_audience_list() {
        let mut cfg = config();
        cfg.valid_auds = Some(vec!["svc-c".to_string()]);
        let mut c = claims(json!({"sub": "42", "scp": "user", "aud": ["svc-a", "svc-c"]}));
        assert!(ClaimValidator::new(&cfg).validate(&mut c, "user", None).is_ok());
    }

    #[test]
    fn expected_audience_must_match() {
        let mut cfg = config();
        // valid_auds is not consulted when the request names an audience
        cfg.valid_auds = Some(vec!["svc-b".to_string()]);
        let validator = ClaimValidator::new(&cfg);

        let mut c = claims(json!({"sub": "42", "scp": "user", "aud": "svc-a"}));
        assert_eq!(
            validator.validate(&mut c, "user", Some("svc-b")),
            Err(AuthError::WrongAud)
        );

        let mut c = claims(json!({"sub": "42", "scp": "user", "aud": ["svc-a", "svc-b"]}));
        assert!(validator.validate(&mut c, "user", Some("svc-b")).is_ok());

        let mut c = claims(json!({"sub": "42", "scp": "user"}));
        assert_eq!(
            validator.validate(&mut c, "user", Some("svc-a")),
            Err(AuthError::WrongAud)
        );
    }

    #[test]
    fn issuer_is_checked_only_when_configured() {
        let mut cfg = config();
        let c = claims(json!({"sub": "42", "iss": "http://example.org"}));
        assert!(ClaimValidator::new(&cfg).issuer_matches(&c));

        cfg.issuer = Some("http://example.com".to_string());
        let validator = ClaimValidator::new(&cfg);
        assert!(!validator.issuer_matches(&c));
        assert_eq!(validator.check_issuer(&c), Err(AuthError::WrongIssuer));

        let c = claims(json!({"sub": "42", "iss": "http://example.com"}));
        assert!(validator.check_issuer(&c).is_ok());
    }
}
