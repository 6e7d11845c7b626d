//! Cache pre-population.

use futures::stream::{self, StreamExt};
use router_core::{CachePolicy, CacheRequest, OrgId, RouterResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::manager::{generate_hash, CacheManager};

/// One entry to pre-populate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupPrompt {
    /// Fingerprint of the prompt
    pub prompt_hash: String,
    /// Fingerprint of the input
    pub input_hash: String,
    /// Response to store
    pub response: serde_json::Value,
    /// Entry lifetime; the policy TTL when absent
    #[serde(default, with = "humantime_serde::option")]
    pub ttl: Option<Duration>,
    /// Policy override
    #[serde(default)]
    pub policy: Option<CachePolicy>,
}

impl WarmupPrompt {
    /// Build an entry by fingerprinting the prompt and input
    pub fn from_content<P, I>(prompt: &P, input: &I, response: serde_json::Value) -> RouterResult<Self>
    where
        P: Serialize + ?Sized,
        I: Serialize + ?Sized,
    {
        Ok(Self {
            prompt_hash: generate_hash(prompt)?,
            input_hash: generate_hash(input)?,
            response,
            ttl: None,
            policy: None,
        })
    }

    fn to_request(&self, default_policy: &CachePolicy) -> CacheRequest {
        let request = CacheRequest::new(
            self.prompt_hash.clone(),
            self.input_hash.clone(),
            self.response.clone(),
        )
        .with_policy(self.policy.clone().unwrap_or_else(|| default_policy.clone()));
        match self.ttl {
            Some(ttl) => request.with_ttl(ttl),
            None => request,
        }
    }
}

/// Outcome of a warmup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupReport {
    /// Entries written
    pub stored: usize,
    /// Entries the policy refused
    pub skipped: usize,
    /// Entries that failed to write
    pub failed: usize,
}

impl WarmupReport {
    /// Entries attempted
    #[must_use]
    pub fn total(&self) -> usize {
        self.stored + self.skipped + self.failed
    }
}

/// Writes batches of known responses into the cache
#[derive(Debug, Clone)]
pub struct CacheWarmer {
    cache: Arc<CacheManager>,
    concurrency: usize,
}

impl CacheWarmer {
    /// Create a warmer
    #[must_use]
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            concurrency: 8,
        }
    }

    /// Set how many writes run at once
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Store every prompt, continuing past individual failures
    pub async fn warm(&self, org_id: OrgId, prompts: Vec<WarmupPrompt>) -> WarmupReport {
        let default_policy = self.cache.policy_for(None, None);
        let cache = &self.cache;

        let outcomes: Vec<RouterResult<bool>> = stream::iter(prompts)
            .map(|prompt| {
                let request = prompt.to_request(&default_policy);
                async move { cache.put(org_id, &request).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = WarmupReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(true) => report.stored += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(org_id = %org_id, error = %e, "Cache warmup entry failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            org_id = %org_id,
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            "Cache warmup complete"
        );
        report
    }
}
