//! The GitHub push webhook handler (spec §4.8, §6): optionally verifies
//! `X-Hub-Signature`, extracts the pushed branch, and enqueues a
//! re-index on the dedicated worker's coalescing queue.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::AppState;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_HEADER: &str = "x-hub-signature";
const BRANCH_REF_PREFIX: &str = "refs/heads/";

#[derive(serde::Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
}

pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    if !state.webhook_secret.is_empty() {
        if let Err(reason) = verify_signature(&state.webhook_secret, &headers, &body) {
            return (StatusCode::BAD_REQUEST, reason);
        }
    }

    let event: PushEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("malformed push event payload: {}", err),
            )
        }
    };

    let branch = match event.git_ref.strip_prefix(BRANCH_REF_PREFIX) {
        Some(branch) => branch.to_owned(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                format!("ref '{}' is not a branch push", event.git_ref),
            )
        }
    };

    if state.reindex.request(branch) {
        (StatusCode::OK, String::new())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "indexing worker is not accepting requests".to_owned(),
        )
    }
}

/// Verifies `X-Hub-Signature: sha1=<hex>` over the raw body, constant-time.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), String> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature header".to_owned())?;

    let hex_digest = header
        .strip_prefix("sha1=")
        .ok_or_else(|| "X-Hub-Signature must use the sha1= scheme".to_owned())?;

    let expected = hex::decode(hex_digest).map_err(|_| "X-Hub-Signature is not valid hex".to_owned())?;

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid webhook secret".to_owned())?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "X-Hub-Signature does not match the payload".to_owned())
}
