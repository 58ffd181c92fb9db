//! Bearer token extraction.

use http::header::{AUTHORIZATION, HeaderMap, HeaderName};

const BEARER_PREFIX: &str = "Bearer ";

/// The token from `Authorization: Bearer <token>`.
///
/// The prefix is matched case-sensitively and must be followed by a
/// non-empty token. Non-UTF-8 values count as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_value(headers, &AUTHORIZATION)?
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
}

/// A header's value as UTF-8, if present.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_token_after_prefix() {
        assert_eq!(bearer_token(&with_auth("Bearer abc.def.ghi")), Some("abc.def.ghi"));
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer 123"),
        );
        assert_eq!(bearer_token(&headers), Some("123"));
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&with_auth("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&with_auth("bearer 123")), None);
        assert_eq!(bearer_token(&with_auth("Bearer ")), None);
        assert_eq!(bearer_token(&with_auth("Bearer")), None);
    }

    #[test]
    fn reads_arbitrary_header() {
        let mut headers = HeaderMap::new();
        headers.insert("jwt_aud", HeaderValue::from_static("svc-a"));
        let name = HeaderName::from_bytes(b"JWT_AUD").unwrap();
        assert_eq!(header_value(&headers, &name), Some("svc-a"));
    }
}
