use std::future::Future;
use std::pin::Pin;

use clap::ValueEnum;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::common::format_http_error;
use crate::error::{BackendError, Result};
use crate::server::{PROXY_PATH, QUOTA_PATH};

use super::one_api::{self, Route};
use super::{compute_unit, QuotaResult};

pub type QuotaFuture<'a> = Pin<Box<dyn Future<Output = Result<QuotaResult>> + Send + 'a>>;

/// Anything that can produce a provider's quota. The dashboard only sees this seam.
pub trait QuotaSource: Sync {
    fn fetch_quota<'a>(
        &'a self,
        base_url: &'a str,
        token: &'a str,
        user_id: &'a str,
    ) -> QuotaFuture<'a>;
}

/// Where the quota numbers are computed. One strategy is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QuotaStrategy {
    /// Ask the dashboard server's aggregation endpoint.
    Aggregator,
    /// Call the provider endpoints through the dashboard server's forwarding proxy.
    CorsProxy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaPayload {
    quota_per_unit: f64,
    quota: f64,
    #[serde(default)]
    unit: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct QuotaClient {
    http: Client,
    server_url: Url,
    strategy: QuotaStrategy,
}

impl QuotaClient {
    pub fn new(server_url: Url, strategy: QuotaStrategy) -> Self {
        Self {
            http: Client::new(),
            server_url,
            strategy,
        }
    }

    pub fn strategy(&self) -> QuotaStrategy {
        self.strategy
    }

    pub async fn fetch(&self, base_url: &str, token: &str, user_id: &str) -> Result<QuotaResult> {
        match self.strategy {
            QuotaStrategy::Aggregator => self.fetch_aggregated(base_url, token, user_id).await,
            QuotaStrategy::CorsProxy => {
                let proxy_url = self.server_endpoint(PROXY_PATH)?;
                let aggregated = one_api::fetch_quota(
                    &self.http,
                    Route::ViaProxy(&proxy_url),
                    base_url,
                    token,
                    user_id,
                )
                .await?;
                Ok(aggregated.result())
            }
        }
    }

    async fn fetch_aggregated(
        &self,
        base_url: &str,
        token: &str,
        user_id: &str,
    ) -> Result<QuotaResult> {
        let mut url = self.server_endpoint(QUOTA_PATH)?;
        url.query_pairs_mut()
            .append_pair("baseURL", base_url)
            .append_pair("token", token)
            .append_pair("userId", user_id);

        let response = self
            .http
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|err| BackendError::Upstream(format!("quota request failed: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| BackendError::Upstream(format!("quota body read failed: {err}")))?;

        if !status.is_success() {
            let message = format_http_error("quota request failed", status, &body);
            return Err(BackendError::Upstream(message));
        }

        let payload = serde_json::from_str::<QuotaPayload>(&body)
            .map_err(|err| BackendError::Upstream(format!("quota decode failed: {err}")))?;
        // A non-finite unit travels as JSON null; recompute it from the two numbers.
        let unit = payload
            .unit
            .unwrap_or_else(|| compute_unit(payload.quota, payload.quota_per_unit));
        Ok(QuotaResult {
            quota_per_unit: payload.quota_per_unit,
            quota: payload.quota,
            unit,
        })
    }

    fn server_endpoint(&self, path: &str) -> Result<Url> {
        self.server_url
            .join(path)
            .map_err(|err| BackendError::Config(format!("invalid server URL: {err}")))
    }
}

impl QuotaSource for QuotaClient {
    fn fetch_quota<'a>(
        &'a self,
        base_url: &'a str,
        token: &'a str,
        user_id: &'a str,
    ) -> QuotaFuture<'a> {
        Box::pin(self.fetch(base_url, token, user_id))
    }
}
