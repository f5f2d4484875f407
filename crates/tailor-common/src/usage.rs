use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::openai::ChatCompletionUsage;

#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub models: Vec<ModelUsageStats>,
}

impl UsageStats {
    pub fn total_requests(&self) -> u64 {
        self.models.iter().map(|m| m.requests).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelUsageStats {
    pub model: String,
    pub requests: u64,
    pub total_tokens: Option<u64>,
    pub token_counted_requests: u64,
    pub token_unknown_requests: u64,
}

/// Per-process tally of model requests and reported token usage.
#[derive(Clone, Default)]
pub struct UsageTracker {
    inner: Arc<Mutex<BTreeMap<String, ModelUsageStats>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, model: &str, usage: Option<&ChatCompletionUsage>) {
        let Ok(mut by_model) = self.inner.lock() else {
            return;
        };
        let stat = by_model
            .entry(model.to_string())
            .or_insert_with(|| ModelUsageStats {
                model: model.to_string(),
                ..Default::default()
            });

        stat.requests += 1;
        match usage.and_then(|u| u.total_tokens) {
            Some(total) => {
                stat.total_tokens = Some(stat.total_tokens.unwrap_or(0) + total);
                stat.token_counted_requests += 1;
            }
            None => stat.token_unknown_requests += 1,
        }
    }

    /// Snapshot sorted by model id.
    pub fn get_usage_stats(&self) -> UsageStats {
        let models = self
            .inner
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        UsageStats { models }
    }
}
