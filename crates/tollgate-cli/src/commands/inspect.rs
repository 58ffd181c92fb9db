use tollgate_auth::insecure_peek;

use crate::pout;

pub fn cmd_inspect(token: &str, json: bool) -> anyhow::Result<()> {
    let (header, claims) = insecure_peek(token)?;
    let text = format!(
        "header: {}\nclaims: {}\n(signature NOT verified)",
        serde_json::to_string_pretty(&header)?,
        serde_json::to_string_pretty(&claims)?,
    );
    pout(
        json,
        serde_json::json!({"header": header, "claims": claims, "verified": false}),
        &text,
    )
}
