use std::collections::HashMap;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use futures::future::join_all;

use crate::models::{currency_symbol, ProviderRecord};
use crate::quota::{QuotaCache, QuotaResult, QuotaSource};
use crate::utils::now_unix_ms;

pub const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;

const MISSING_CREDENTIALS_MESSAGE: &str = "missing URL, API key or user id";

#[derive(Debug, Clone, PartialEq)]
pub enum BalanceState {
    Ready(QuotaResult),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRow {
    pub provider_id: String,
    pub name: String,
    pub url: String,
    pub currency: String,
    pub balance: BalanceState,
}

impl DashboardRow {
    pub fn balance_text(&self) -> String {
        match &self.balance {
            BalanceState::Ready(result) => format_balance(&self.currency, result.unit),
            BalanceState::Failed(_) => "failed to fetch".to_string(),
        }
    }
}

/// Per-provider quota view. Each stale provider gets its own fetch; they run together
/// and a failure in one never affects the others.
pub struct Dashboard<S: QuotaSource> {
    source: S,
    cache: QuotaCache,
}

impl<S: QuotaSource> Dashboard<S> {
    pub fn new(source: S, stale_time_ms: u64) -> Self {
        Self {
            source,
            cache: QuotaCache::new(stale_time_ms),
        }
    }

    pub async fn refresh(&mut self, providers: &[ProviderRecord]) -> Vec<DashboardRow> {
        self.refresh_at(providers, now_unix_ms()).await
    }

    pub async fn refresh_at(
        &mut self,
        providers: &[ProviderRecord],
        now_ms: i64,
    ) -> Vec<DashboardRow> {
        let ids = providers
            .iter()
            .map(|provider| provider.id.as_str())
            .collect::<Vec<_>>();
        self.cache.retain_ids(&ids);

        let pending = providers
            .iter()
            .filter(|provider| provider.has_quota_credentials())
            .filter(|provider| self.cache.get_fresh(&provider.id, now_ms).is_none())
            .collect::<Vec<_>>();

        let source = &self.source;
        let fetched = join_all(pending.into_iter().map(|provider| async move {
            let result = match source
                .fetch_quota(&provider.url, &provider.api_key, &provider.user_id)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    log::error!("failed to fetch quota for {}: {err}", provider.name);
                    QuotaResult::fallback()
                }
            };
            (provider.id.as_str(), result)
        }))
        .await;

        let fetched = fetched.into_iter().collect::<HashMap<_, _>>();
        for (provider_id, result) in &fetched {
            self.cache.insert(provider_id, *result, now_ms);
        }

        providers
            .iter()
            .map(|provider| {
                let balance = if provider.has_quota_credentials() {
                    let result = fetched
                        .get(provider.id.as_str())
                        .copied()
                        .or_else(|| self.cache.get_fresh(&provider.id, now_ms))
                        .unwrap_or_else(QuotaResult::fallback);
                    BalanceState::Ready(result)
                } else {
                    BalanceState::Failed(MISSING_CREDENTIALS_MESSAGE.to_string())
                };
                DashboardRow {
                    provider_id: provider.id.clone(),
                    name: provider.name.clone(),
                    url: provider.url.clone(),
                    currency: provider.unit.clone(),
                    balance,
                }
            })
            .collect()
    }
}

/// Two decimals behind the currency symbol. A non-finite ratio, which a zero
/// `quota_per_unit` produces, is shown as unavailable rather than as a number.
pub fn format_balance(currency: &str, unit: f64) -> String {
    if !unit.is_finite() {
        return "unavailable".to_string();
    }
    format!("{}{:.2}", currency_symbol(currency), unit)
}

pub fn render_table(rows: &[DashboardRow]) -> String {
    if rows.is_empty() {
        return "No API providers configured. Add one with `quotaboard providers add`.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Provider", "URL", "Balance"]);
    for row in rows {
        let url = if row.url.trim().is_empty() {
            "-".to_string()
        } else {
            row.url.clone()
        };
        table.add_row(vec![row.name.clone(), url, row.balance_text()]);
    }
    table.to_string()
}
