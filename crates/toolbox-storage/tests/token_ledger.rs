//! Integration tests for the token usage ledger

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::tempdir;
use toolbox_storage::{
    JsonFileStore, KeyValueStore, MemoryStore, TokenLedger, TokenStat, TokenUsage, TOKEN_STATS_KEY,
};

fn ledger() -> (TokenLedger, Arc<dyn KeyValueStore>) {
    let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    (TokenLedger::new(storage.clone()), storage)
}

fn stat(date: &str, prompt_tokens: u64, completion_tokens: u64) -> TokenStat {
    TokenStat {
        date: date.to_string(),
        prompt_tokens,
        completion_tokens,
    }
}

#[test]
fn test_empty_ledger_has_no_stats() {
    let (ledger, _) = ledger();
    assert!(ledger.aggregated().unwrap().is_empty());
    assert!(ledger.entries().unwrap().is_empty());
}

#[test]
fn test_stats_are_summed_per_date_across_models_oldest_first() {
    let (ledger, _) = ledger();
    ledger.record(TokenUsage::new("2024-05-02", 10, 20, "llama3")).unwrap();
    ledger.record(TokenUsage::new("2024-05-01", 1, 2, "qwen2:7b")).unwrap();
    ledger.record(TokenUsage::new("2024-05-02", 5, 7, "qwen2:7b")).unwrap();

    assert_eq!(
        ledger.aggregated().unwrap(),
        vec![stat("2024-05-01", 1, 2), stat("2024-05-02", 15, 27)]
    );
    // entries keep the model they were recorded for
    let models: Vec<String> = ledger
        .entries()
        .unwrap()
        .into_iter()
        .map(|usage| usage.model_name)
        .collect();
    assert_eq!(models, vec!["llama3", "qwen2:7b", "qwen2:7b"]);
}

#[test]
fn test_clear_drops_everything() {
    let (ledger, storage) = ledger();
    ledger.record(TokenUsage::new("2024-05-01", 1, 2, "llama3")).unwrap();

    ledger.clear().unwrap();

    assert!(ledger.aggregated().unwrap().is_empty());
    assert_eq!(storage.get(TOKEN_STATS_KEY).unwrap(), None);
    // clearing an empty ledger is fine
    ledger.clear().unwrap();
}

#[test]
fn test_sums_saturate_instead_of_overflowing() {
    let (ledger, _) = ledger();
    ledger.record(TokenUsage::new("2024-05-01", u64::MAX, 1, "a")).unwrap();
    ledger.record(TokenUsage::new("2024-05-01", 1, 1, "b")).unwrap();

    let stats = ledger.aggregated().unwrap();
    assert_eq!(stats[0].prompt_tokens, u64::MAX);
    assert_eq!(stats[0].total_tokens(), u64::MAX);
}

#[test]
fn test_entries_survive_reopening_the_file() {
    let dir = tempdir().unwrap();
    let path = JsonFileStore::path_in(dir.path());

    {
        let ledger = TokenLedger::new(Arc::new(JsonFileStore::open(&path).unwrap()));
        ledger.record(TokenUsage::new("2024-05-01", 3, 4, "llama3")).unwrap();
    }

    let ledger = TokenLedger::new(Arc::new(JsonFileStore::open(&path).unwrap()));
    assert_eq!(ledger.aggregated().unwrap(), vec![stat("2024-05-01", 3, 4)]);
}

#[test]
fn test_corrupt_entries_surface_as_an_error() {
    let (ledger, storage) = ledger();
    storage.set(TOKEN_STATS_KEY, "not json").unwrap();

    assert!(ledger.aggregated().is_err());
    assert!(ledger.record(TokenUsage::new("2024-05-01", 1, 1, "a")).is_err());
}

proptest! {
    #[test]
    fn prop_aggregate_preserves_totals(
        usages in prop::collection::vec((0u8..5, 0u64..10_000, 0u64..10_000), 0..40)
    ) {
        let (ledger, _) = ledger();
        for (day, prompt, completion) in &usages {
            let date = format!("2024-05-0{}", day + 1);
            ledger.record(TokenUsage::new(date, *prompt, *completion, "m")).unwrap();
        }

        let stats = ledger.aggregated().unwrap();
        let prompt: u64 = usages.iter().map(|(_, p, _)| p).sum();
        let completion: u64 = usages.iter().map(|(_, _, c)| c).sum();
        prop_assert_eq!(stats.iter().map(|s| s.prompt_tokens).sum::<u64>(), prompt);
        prop_assert_eq!(stats.iter().map(|s| s.completion_tokens).sum::<u64>(), completion);
        prop_assert!(stats.windows(2).all(|pair| pair[0].date < pair[1].date));
    }
}
