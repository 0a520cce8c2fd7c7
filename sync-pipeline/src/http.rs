use std::time::Duration;

use common::error::AppError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_retry::Retry;
use tracing::warn;

pub const USER_AGENT: &str = "OSGeoWikiBot/1.0 (https://wiki.osgeo.org)";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u64 = 3;
const RETRY_DELAY_SECS: u64 = 5;

pub fn build_client() -> Result<Client, AppError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()?)
}

/// Delays between attempts: 5s, 10s. With the initial attempt that makes
/// MAX_RETRIES tries in total.
fn linear_backoff() -> impl Iterator<Item = Duration> {
    (1..MAX_RETRIES).map(|attempt| Duration::from_secs(RETRY_DELAY_SECS * attempt))
}

pub async fn get_json<T, Q>(client: &Client, url: &str, query: &Q) -> Result<T, AppError>
where
    T: DeserializeOwned,
    Q: serde::Serialize + Sync,
{
    Retry::spawn(linear_backoff(), || async {
        let response = client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()
            .inspect_err(|err| warn!(%url, error = %err, "request failed"))?;

        Ok::<T, AppError>(response.json::<T>().await?)
    })
    .await
}

pub async fn get_text(client: &Client, url: &str) -> Result<String, AppError> {
    Retry::spawn(linear_backoff(), || async {
        let response = client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .inspect_err(|err| warn!(%url, error = %err, "request failed"))?;

        Ok::<String, AppError>(response.text().await?)
    })
    .await
}

/// HEAD request returning one response header, for endpoints that expose
/// totals that way (`X-WP-Total`).
pub async fn head_header<Q>(
    client: &Client,
    url: &str,
    query: &Q,
    header: &str,
) -> Result<Option<String>, AppError>
where
    Q: serde::Serialize + Sync,
{
    let response = client
        .head(url)
        .query(query)
        .send()
        .await?
        .error_for_status()?;

    Ok(response
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string))
}
