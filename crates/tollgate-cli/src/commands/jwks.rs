use anyhow::anyhow;
use tollgate_auth::{JwksFetcher, ReqwestFetcher};

use crate::pout;

pub async fn cmd_jwks(url: &str, json: bool) -> anyhow::Result<()> {
    let fetched = ReqwestFetcher::new()?
        .fetch(url)
        .await?
        .ok_or_else(|| anyhow!("{url} did not return a key set"))?;

    let mut lines = Vec::with_capacity(fetched.set.keys.len() + 1);
    for key in &fetched.set.keys {
        lines.push(format!(
            "{}\t{}\t{}",
            key.kid.as_deref().unwrap_or("-"),
            key.kty,
            key.alg.as_deref().unwrap_or("-"),
        ));
    }
    if let Some(max_age) = fetched.max_age_seconds {
        lines.push(format!("cache max-age: {max_age}s"));
    }

    pout(
        json,
        serde_json::json!({"keys": fetched.set.keys, "max_age_seconds": fetched.max_age_seconds}),
        &lines.join("\n"),
    )
}
