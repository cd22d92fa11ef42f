use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send `body` as JSON and decode the JSON reply. Every failure is logged
/// with its detail and returned as a short provider error.
pub(crate) async fn post_json<B, R>(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &B,
    timeout_secs: u64,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = match request.json(body).send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            warn!(provider, timeout_secs, "{provider} request timed out");
            return Err(anyhow!("{provider} request timed out after {timeout_secs}s"));
        },
        Err(e) => {
            warn!(provider, "{provider} request failed: {e}");
            return Err(anyhow!("{provider} request failed"));
        },
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(provider, status = %status, "{provider} returned non-200: {body}");
        return Err(anyhow!("{provider} error {status}"));
    }

    match response.json::<R>().await {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!(provider, "failed to parse {provider} response: {e}");
            Err(anyhow!("failed to parse {provider} response"))
        },
    }
}
