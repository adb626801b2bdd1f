//! Token usage ledger
//!
//! Every recorded usage is kept as its own entry under [`TOKEN_STATS_KEY`];
//! reads aggregate the entries into one [`TokenStat`] per date, in ascending
//! date order. Dates are opaque strings compared lexicographically, so
//! callers should use `YYYY-MM-DD`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StorageResult;
use crate::kv::{KeyValueStore, KeyValueStoreExt};

/// Durable key holding the recorded usage entries
pub const TOKEN_STATS_KEY: &str = "tokenStats";

/// One recorded usage of a model on a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub date: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub model_name: String,
}

impl TokenUsage {
    pub fn new(
        date: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            prompt_tokens,
            completion_tokens,
            model_name: model_name.into(),
        }
    }
}

/// Token totals for one date, across all models
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStat {
    pub date: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenStat {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Append-only record of token usage on top of a [`KeyValueStore`]
pub struct TokenLedger {
    storage: Arc<dyn KeyValueStore>,
    // serializes read-modify-write cycles on the entry list
    write_lock: Mutex<()>,
}

impl TokenLedger {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Append one usage entry
    pub fn record(&self, usage: TokenUsage) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.entries()?;
        debug!(
            "Recording {} prompt and {} completion tokens for {} on {}",
            usage.prompt_tokens, usage.completion_tokens, usage.model_name, usage.date
        );
        entries.push(usage);
        self.storage.set_json(TOKEN_STATS_KEY, &entries)
    }

    /// Totals per date, oldest first
    pub fn aggregated(&self) -> StorageResult<Vec<TokenStat>> {
        let mut by_date: BTreeMap<String, TokenStat> = BTreeMap::new();
        for usage in self.entries()? {
            let stat = by_date.entry(usage.date.clone()).or_insert_with(|| TokenStat {
                date: usage.date,
                ..TokenStat::default()
            });
            stat.prompt_tokens = stat.prompt_tokens.saturating_add(usage.prompt_tokens);
            stat.completion_tokens = stat.completion_tokens.saturating_add(usage.completion_tokens);
        }
        Ok(by_date.into_values().collect())
    }

    /// Drop every recorded entry
    pub fn clear(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        self.storage.remove(TOKEN_STATS_KEY)?;
        info!("Cleared token usage statistics");
        Ok(())
    }

    /// Raw entries in recording order
    pub fn entries(&self) -> StorageResult<Vec<TokenUsage>> {
        Ok(self
            .storage
            .get_json::<Vec<TokenUsage>>(TOKEN_STATS_KEY)?
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for TokenLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLedger").finish_non_exhaustive()
    }
}
