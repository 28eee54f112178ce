//! Shared HTTP request helpers for CLI commands.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub fn base_url(addr: &str) -> String {
    format!("http://{}", addr)
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a non-2xx answer into an error carrying the API's error code.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match resp.json::<ErrorBody>().await {
        Ok(body) => bail!("{} ({})", body.message, status),
        Err(_) => bail!("request failed ({})", status),
    }
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str, query: &[(&str, &str)]) -> Result<T> {
    let resp = reqwest::Client::new()
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("failed to connect to waypostd at {}, is it running?", url))?;
    check(resp)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn get_text(url: &str) -> Result<String> {
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to waypostd at {}, is it running?", url))?;
    check(resp).await?.text().await.context("failed to read response")
}

pub async fn post(url: &str, query: &[(&str, &str)]) -> Result<()> {
    let resp = reqwest::Client::new()
        .post(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("failed to connect to waypostd at {}, is it running?", url))?;
    check(resp).await?;
    Ok(())
}
