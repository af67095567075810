mod cache;
mod client;
pub mod one_api;

use serde::{Deserialize, Serialize};

pub use cache::{is_stale, QuotaCache};
pub use client::{QuotaClient, QuotaFuture, QuotaSource, QuotaStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResult {
    pub quota_per_unit: f64,
    pub quota: f64,
    pub unit: f64,
}

impl QuotaResult {
    pub fn new(quota_per_unit: f64, quota: f64) -> Self {
        Self {
            quota_per_unit,
            quota,
            unit: compute_unit(quota, quota_per_unit),
        }
    }

    /// Placeholder shown when a provider's quota could not be fetched.
    pub fn fallback() -> Self {
        Self {
            quota_per_unit: 1.0,
            quota: 0.0,
            unit: 0.0,
        }
    }
}

/// `quota / quota_per_unit`. A zero divisor is passed through as an infinite or NaN
/// ratio; callers decide how to show it.
pub fn compute_unit(quota: f64, quota_per_unit: f64) -> f64 {
    quota / quota_per_unit
}
