//! The metrics sink boundary: a trait for the per-tick batch write plus the
//! InfluxDB v1 HTTP implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::point::Batch;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("write rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Accepts one batch per non-empty tick. The write is a single call; the
/// caller owns the failure policy.
#[async_trait]
pub trait MetricsSink {
    async fn write(&self, batch: &Batch) -> Result<(), SinkError>;
}

/// InfluxDB v1 over HTTP: line protocol POSTed to `/write` with
/// second-precision timestamps, optional basic auth.
pub struct InfluxSink {
    client: Client,
    write_url: Url,
    ping_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxSink {
    pub fn new(
        base: &Url,
        database: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let mut write_url = endpoint_url(base, "write").context("building write URL")?;
        write_url
            .query_pairs_mut()
            .append_pair("db", database)
            .append_pair("precision", "s");
        let ping_url = endpoint_url(base, "ping").context("building ping URL")?;

        Ok(Self {
            client: Client::new(),
            write_url,
            ping_url,
            username,
            password,
        })
    }

    /// Startup reachability check; InfluxDB answers `/ping` with 204.
    pub async fn ping(&self) -> Result<(), SinkError> {
        let response = self.client.get(self.ping_url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status,
                message: "ping failed".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    async fn write(&self, batch: &Batch) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(self.write_url.clone())
            .body(batch.to_line_protocol());
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status,
                message: rejection_message(&body),
            });
        }
        Ok(())
    }
}

fn endpoint_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}/{path}", base.as_str().trim_end_matches('/')))
}

#[derive(Debug, Deserialize)]
struct InfluxErrorBody {
    error: String,
}

/// InfluxDB v1 reports write errors as `{"error": "..."}`; fall back to the
/// raw body for anything else.
fn rejection_message(body: &str) -> String {
    match serde_json::from_str::<InfluxErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    }
}
