//! Key-set retrieval and caching.

use crate::{Error, Result};

use async_trait::async_trait;
use base64::Engine;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A JWKS (JSON Web Key Set).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JwksSet {
    /// Keys.
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwksSet {
    /// True if some key carries this `kid`.
    pub fn contains_kid(&self, kid: &str) -> bool {
        self.keys.iter().any(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Minimal JWK structure for RSA/EC/OKP/oct.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", "OKP", "oct").
    pub kty: String,

    /// Key id.
    pub kid: Option<String>,

    /// Public key use.
    #[serde(rename = "use")]
    pub use_: Option<String>,

    /// Algorithm advertised for this key.
    pub alg: Option<String>,

    // RSA
    /// RSA modulus.
    pub n: Option<String>,
    /// RSA exponent.
    pub e: Option<String>,

    // EC / OKP
    /// Curve name.
    pub crv: Option<String>,
    /// EC x coordinate, or OKP public key.
    pub x: Option<String>,
    /// EC y coordinate.
    pub y: Option<String>,

    // oct
    /// Symmetric key, base64url.
    pub k: Option<String>,
}

impl Jwk {
    /// The advertised algorithm, if present and known.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.alg.as_deref().and_then(|a| Algorithm::from_str(a).ok())
    }

    pub(crate) fn decoding_key(&self) -> Result<DecodingKey> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self
                    .n
                    .as_deref()
                    .ok_or_else(|| Error::Jwks("RSA JWK missing n".to_string()))?;
                let e = self
                    .e
                    .as_deref()
                    .ok_or_else(|| Error::Jwks("RSA JWK missing e".to_string()))?;
                Ok(DecodingKey::from_rsa_components(n, e)?)
            }
            "EC" => {
                let x = self
                    .x
                    .as_deref()
                    .ok_or_else(|| Error::Jwks("EC JWK missing x".to_string()))?;
                let y = self
                    .y
                    .as_deref()
                    .ok_or_else(|| Error::Jwks("EC JWK missing y".to_string()))?;
                Ok(DecodingKey::from_ec_components(x, y)?)
            }
            "OKP" => {
                let crv = self.crv.as_deref().unwrap_or("");
                if crv != "Ed25519" {
                    return Err(Error::Jwks(format!("unsupported OKP curve: {crv}")));
                }
                let x = self
                    .x
                    .as_deref()
                    .ok_or_else(|| Error::Jwks("OKP JWK missing x".to_string()))?;
                Ok(DecodingKey::from_ed_components(x)?)
            }
            "oct" => {
                let k = self
                    .k
                    .as_deref()
                    .ok_or_else(|| Error::Jwks("oct JWK missing k".to_string()))?;
                let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .decode(k)
                    .map_err(|e| Error::Jwks(format!("invalid oct k: {e}")))?;
                Ok(DecodingKey::from_secret(&secret))
            }
            other => Err(Error::Jwks(format!("unsupported kty: {other}"))),
        }
    }
}

/// A key set as returned by a fetch.
#[derive(Debug, Clone)]
pub struct FetchedJwks {
    pub set: JwksSet,
    /// `Cache-Control: max-age` of the response, if any.
    pub max_age_seconds: Option<u64>,
}

/// Retrieves a key set from its endpoint.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// `Ok(None)` when the endpoint answered with anything but 200.
    async fn fetch(&self, url: &str) -> Result<Option<FetchedJwks>>;
}

/// HTTP fetcher backed by reqwest.
#[cfg(feature = "fetch-reqwest")]
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "fetch-reqwest")]
impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "fetch-reqwest")]
#[async_trait]
impl JwksFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedJwks>> {
        use reqwest::{StatusCode, header};

        let resp = self.client.get(url).send().await?;
        if resp.status() != StatusCode::OK {
            tracing::warn!(url, status = %resp.status(), "JWKS endpoint did not return 200");
            return Ok(None);
        }

        let max_age_seconds = resp
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_cache_control_max_age);

        let text = resp.text().await?;
        let set: JwksSet = serde_json::from_str(&text)?;
        Ok(Some(FetchedJwks {
            set,
            max_age_seconds,
        }))
    }
}

#[derive(Debug, Clone)]
struct CachedJwks {
    expires_at: Instant,
    jwks: Arc<JwksSet>,
}

impl CachedJwks {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

/// Refresh coordination for one URL.
#[derive(Debug, Default)]
struct Gate {
    /// Bumped after every fetch, successful or not.
    attempts: AtomicU64,
    /// Held while fetching. Records when the last forced fetch started.
    last_forced: Mutex<Option<Instant>>,
}

/// Process-wide key-set cache keyed by URL.
///
/// Reads are lock-free. Refreshes of one URL are single-flight: callers that
/// queue behind an in-flight fetch take its outcome, failed or not, rather
/// than fetching again. Forced reloads of one URL are spaced at least
/// [`JwksCache::DEFAULT_MIN_FORCED_INTERVAL`] apart.
pub struct JwksCache {
    fetcher: Arc<dyn JwksFetcher>,
    max_age: Duration,
    min_forced_interval: Duration,
    entries: DashMap<String, CachedJwks>,
    gates: DashMap<String, Arc<Gate>>,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("max_age", &self.max_age)
            .field("min_forced_interval", &self.min_forced_interval)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    /// Upper bound on how long a fetched key set is served.
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

    /// Minimum spacing between two forced reloads of the same URL.
    pub const DEFAULT_MIN_FORCED_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            fetcher,
            max_age: Self::DEFAULT_MAX_AGE,
            min_forced_interval: Self::DEFAULT_MIN_FORCED_INTERVAL,
            entries: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub fn with_min_forced_interval(mut self, interval: Duration) -> Self {
        self.min_forced_interval = interval;
        self
    }

    /// The shared cache used when a pipeline is not given its own.
    #[cfg(feature = "fetch-reqwest")]
    pub fn shared() -> Result<Arc<JwksCache>> {
        static SHARED: once_cell::sync::OnceCell<Arc<JwksCache>> =
            once_cell::sync::OnceCell::new();

        SHARED
            .get_or_try_init(|| {
                let fetcher = ReqwestFetcher::new()?;
                Ok::<_, Error>(Arc::new(JwksCache::new(Arc::new(fetcher))))
            })
            .cloned()
    }

    /// The current key set for `url`, fetching it if stale, missing, or `force`d.
    ///
    /// `None` means no keys are available: the fetch failed or the endpoint
    /// did not answer 200. Such results are never cached. A forced reload
    /// inside the minimum interval serves the cached set without fetching.
    pub async fn load(&self, url: &str, force: bool) -> Option<Arc<JwksSet>> {
        if !force {
            if let Some(jwks) = self.fresh(url) {
                return Some(jwks);
            }
        }

        let gate = self.gates.entry(url.to_string()).or_default().clone();
        let seen = gate.attempts.load(Ordering::Acquire);
        let mut last_forced = gate.last_forced.lock().await;

        if gate.attempts.load(Ordering::Acquire) != seen {
            return self.fresh(url);
        }

        if force {
            if last_forced.is_some_and(|at| at.elapsed() < self.min_forced_interval) {
                tracing::debug!(url, "forced JWKS reload skipped, too soon after the last one");
                return self.cached(url);
            }
            *last_forced = Some(Instant::now());
        } else if let Some(jwks) = self.fresh(url) {
            return Some(jwks);
        }

        let fetched = self.fetcher.fetch(url).await;
        gate.attempts.fetch_add(1, Ordering::Release);

        match fetched {
            Ok(Some(fetched)) => {
                let ttl = fetched
                    .max_age_seconds
                    .map_or(self.max_age, |s| Duration::from_secs(s).min(self.max_age));
                let now = Instant::now();
                let expires_at = now
                    .checked_add(ttl)
                    .unwrap_or_else(|| now + Self::DEFAULT_MAX_AGE);
                let jwks = Arc::new(fetched.set);
                self.entries.insert(
                    url.to_string(),
                    CachedJwks {
                        expires_at,
                        jwks: jwks.clone(),
                    },
                );
                tracing::debug!(url, keys = jwks.keys.len(), force, "JWKS refreshed");
                Some(jwks)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(url, error = %err, "JWKS fetch failed");
                None
            }
        }
    }

    fn fresh(&self, url: &str) -> Option<Arc<JwksSet>> {
        self.entries
            .get(url)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.jwks.clone())
    }

    fn cached(&self, url: &str) -> Option<Arc<JwksSet>> {
        self.entries.get(url).map(|entry| entry.jwks.clone())
    }

    /// Drop the cached set for `url`.
    pub fn invalidate(&self, url: &str) {
        self.entries.remove(url);
    }
}

fn parse_cache_control_max_age(cc: &str) -> Option<u64> {
    // Very small parser: look for max-age=NNN
    for part in cc.split(',') {
        let p = part.trim();
        if let Some(rest) = p.strip_prefix("max-age=") {
            if let Ok(n) = rest.trim().parse::<u64>() {
                return Some(n);
            }
        }
    }
    None
}
