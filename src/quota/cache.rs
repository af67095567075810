use std::collections::HashMap;

use super::QuotaResult;

#[derive(Debug, Clone, Copy)]
struct CachedQuota {
    value: QuotaResult,
    fetched_at_ms: i64,
}

/// Last known quota per provider id.
#[derive(Debug)]
pub struct QuotaCache {
    entries: HashMap<String, CachedQuota>,
    stale_time_ms: u64,
}

impl QuotaCache {
    pub fn new(stale_time_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            stale_time_ms,
        }
    }

    pub fn get_fresh(&self, provider_id: &str, now_ms: i64) -> Option<QuotaResult> {
        self.entries
            .get(provider_id)
            .filter(|entry| !is_stale(entry.fetched_at_ms, now_ms, self.stale_time_ms))
            .map(|entry| entry.value)
    }

    pub fn insert(&mut self, provider_id: &str, value: QuotaResult, now_ms: i64) {
        self.entries.insert(
            provider_id.to_string(),
            CachedQuota {
                value,
                fetched_at_ms: now_ms,
            },
        );
    }

    /// Drops entries for providers that no longer exist.
    pub fn retain_ids(&mut self, provider_ids: &[&str]) {
        self.entries
            .retain(|provider_id, _| provider_ids.contains(&provider_id.as_str()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn is_stale(fetched_at_ms: i64, now_ms: i64, stale_time_ms: u64) -> bool {
    let age = now_ms.saturating_sub(fetched_at_ms);
    age < 0 || age as u64 >= stale_time_ms
}
