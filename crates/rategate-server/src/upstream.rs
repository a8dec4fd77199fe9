//! Upstream pricing oracle client

use std::time::Duration;

use serde_json::{Value, json};

use rategate::{RateError, RateQuery, Result, TimeoutKind};

/// Hard bound on establishing the upstream connection
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard bound on reading the upstream response
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-over-HTTP client for the pricing oracle
#[derive(Clone)]
pub struct OracleClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl OracleClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(OPEN_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| RateError::Internal(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            token: token.into(),
        })
    }

    /// POST one request tuple and return the parsed response body
    pub async fn fetch_rates(&self, query: &RateQuery) -> Result<Value> {
        let response = self
            .http
            .post(&self.url)
            .header("token", &self.token)
            .json(&request_body(query))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RateError::Timeout(TimeoutKind::Upstream)
                } else {
                    RateError::Internal(format!("upstream request failed: {err}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RateError::Internal(format!("upstream body read failed: {err}")))?;

        if !status.is_success() {
            return Err(RateError::Api {
                code: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| RateError::Serialization(e.to_string()))
    }
}

fn request_body(query: &RateQuery) -> Value {
    json!({ "attributes": [query] })
}
