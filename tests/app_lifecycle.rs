//! Application-level scenarios: startup, shutdown, and commands routed
//! through the shared context

mod common;

use std::sync::Arc;

use common::{context, downloading, record_progress, ScriptedBackend, ENDPOINT};
use serde_json::{json, Value};
use chrono::NaiveDate;
use tempfile::tempdir;
use toolbox_cli::{
    AppContext, CliError, CommandRouter, Commands, ConfigSubcommand, StatsSubcommand,
};
use toolbox_models::{commands, ModelSyncError, TransportError, PULL_PROGRESS_TOPIC};
use toolbox_preferences::{EndpointSync, Preferences, Theme, PREFERENCES_KEY};
use toolbox_storage::{JsonFileStore, KeyValueStore, KeyValueStoreExt, MemoryStore};

fn memory() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

// ============================================================================
// Startup and shutdown
// ============================================================================

#[tokio::test]
async fn test_activate_is_local_and_idempotent() {
    let backend = ScriptedBackend::new();
    let ctx = context(&backend, memory());

    ctx.activate();
    ctx.activate();

    assert!(ctx.is_listening());
    assert!(ctx.preferences().is_initialized());
    assert_eq!(backend.hub.handler_count(PULL_PROGRESS_TOPIC), 1);
    assert_eq!(backend.total(), 0);
}

#[tokio::test]
async fn test_start_pushes_endpoint_and_refreshes_once() {
    let backend = ScriptedBackend::new();
    backend.reply(commands::GET_MODELS, json!([{ "name": "llama3:latest" }]));
    backend.reply(commands::GET_RUNNING_MODELS, json!([]));
    backend.reply(
        commands::GET_GPU_INFO,
        json!({ "name": "RTX 3060", "total_mb": 12288, "used_mb": 0 }),
    );
    let ctx = context(&backend, memory());

    ctx.start().await;
    ctx.start().await;

    assert_eq!(
        backend.args_of(commands::UPDATE_OLLAMA_CONFIG),
        vec![json!({ "endpoint": ENDPOINT })]
    );
    assert_eq!(backend.count(commands::GET_MODELS), 1);
    assert_eq!(backend.count(commands::GET_RUNNING_MODELS), 1);
    assert_eq!(backend.count(commands::GET_GPU_INFO), 1);
    assert!(ctx.registry().is_installed("llama3:latest"));
    assert_eq!(ctx.registry().gpu_info().name, "RTX 3060");
    assert_eq!(ctx.preferences().endpoint_sync(), EndpointSync::Synced);
}

#[tokio::test]
async fn test_start_survives_an_unreachable_manager() {
    let backend = ScriptedBackend::new();
    for command in [
        commands::UPDATE_OLLAMA_CONFIG,
        commands::GET_MODELS,
        commands::GET_RUNNING_MODELS,
        commands::GET_GPU_INFO,
    ] {
        backend.reject(command, "connection refused");
    }
    let ctx = context(&backend, memory());

    ctx.start().await;

    assert!(ctx.registry().models().is_empty());
    assert!(!ctx.registry().is_loading());
    assert!(matches!(
        ctx.preferences().endpoint_sync(),
        EndpointSync::Failed(_)
    ));
    assert_eq!(ctx.preferences().ollama_endpoint(), ENDPOINT);
}

#[tokio::test]
async fn test_shutdown_releases_the_subscription() {
    let backend = ScriptedBackend::new();
    let ctx = context(&backend, memory());
    ctx.activate();

    ctx.shutdown();
    ctx.shutdown();

    assert!(!ctx.is_listening());
    assert_eq!(backend.hub.handler_count(PULL_PROGRESS_TOPIC), 0);
}

#[tokio::test]
async fn test_dropping_the_context_unsubscribes() {
    let backend = ScriptedBackend::new();
    let ctx = context(&backend, memory());
    ctx.activate();
    assert_eq!(backend.hub.handler_count(PULL_PROGRESS_TOPIC), 1);

    drop(ctx);

    assert_eq!(backend.hub.handler_count(PULL_PROGRESS_TOPIC), 0);
}

// ============================================================================
// Model commands
// ============================================================================

#[tokio::test]
async fn test_pull_reports_progress_then_refreshes() {
    let backend = ScriptedBackend::new();
    backend.reply(commands::GET_MODELS, json!([{ "name": "llama3:latest" }]));
    let ctx = context(&backend, memory());
    let (observed, watcher) = record_progress(ctx.registry());

    // all three events are queued before the call resolves
    let hub = backend.hub.clone();
    backend.script(commands::PULL_MODEL, move |_| {
        for completed in [0u64, 50, 100] {
            hub.emit(
                PULL_PROGRESS_TOPIC,
                json!({ "status": "downloading", "completed": completed, "total": 100 }),
            );
        }
        async { Ok(Value::Null) }
    });

    CommandRouter::execute(
        Commands::Pull {
            name: "llama3".to_string(),
        },
        &ctx,
    )
    .await
    .unwrap();
    tokio::task::yield_now().await;
    watcher.abort();

    assert_eq!(downloading(&observed.lock()), vec![0, 50, 100]);
    assert!(ctx.registry().pull_progress().is_empty());
    // One refresh at startup, one after the pull
    assert_eq!(backend.count(commands::GET_MODELS), 2);
    assert!(ctx.registry().is_installed("llama3:latest"));
}

#[tokio::test]
async fn test_failed_pull_surfaces_the_command() {
    let backend = ScriptedBackend::new();
    backend.reject(commands::PULL_MODEL, "manifest unknown");
    let ctx = context(&backend, memory());

    let err = CommandRouter::execute(
        Commands::Pull {
            name: "nope".to_string(),
        },
        &ctx,
    )
    .await
    .unwrap_err();

    match err {
        CliError::Model(e) => {
            assert_eq!(e.command(), Some(commands::PULL_MODEL));
            assert!(!e.is_transient());
        }
        other => panic!("Expected model error, got {:?}", other),
    }
    assert!(ctx.registry().pull_progress().is_empty());
}

#[tokio::test]
async fn test_empty_model_name_is_rejected() {
    let backend = ScriptedBackend::new();
    let ctx = context(&backend, memory());

    let err = CommandRouter::execute(
        Commands::Start {
            name: "  ".to_string(),
        },
        &ctx,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        CliError::Model(ModelSyncError::InvalidModelName(_))
    ));
    assert_eq!(backend.count(commands::START_MODEL), 0);
}

#[tokio::test]
async fn test_unload_refreshes_running_models() {
    let backend = ScriptedBackend::new();
    let ctx = context(&backend, memory());

    CommandRouter::execute(
        Commands::Unload {
            name: "llama3".to_string(),
        },
        &ctx,
    )
    .await
    .unwrap();

    assert_eq!(
        backend.args_of(commands::UNLOAD_MODEL),
        vec![json!({ "name": "llama3" })]
    );
    // Startup refresh plus the post-unload refresh
    assert_eq!(backend.count(commands::GET_RUNNING_MODELS), 2);
}

#[tokio::test]
async fn test_selected_model_survives_a_restart() {
    let dir = tempdir().unwrap();
    let path = JsonFileStore::path_in(dir.path());
    let backend = ScriptedBackend::new();

    {
        let ctx = context(&backend, Arc::new(JsonFileStore::open(&path).unwrap()));
        CommandRouter::execute(
            Commands::Select {
                name: "qwen2:7b".to_string(),
            },
            &ctx,
        )
        .await
        .unwrap();
    }

    let ctx = context(&backend, Arc::new(JsonFileStore::open(&path).unwrap()));
    assert_eq!(ctx.registry().selected_model(), "qwen2:7b");
    assert_eq!(backend.total(), 0);
}

// ============================================================================
// Preference commands
// ============================================================================

#[tokio::test]
async fn test_rejected_endpoint_is_kept_locally() {
    let backend = ScriptedBackend::new();
    backend.reject(commands::UPDATE_OLLAMA_CONFIG, "host not allowed");
    let storage = memory();
    let ctx = context(&backend, storage.clone());

    CommandRouter::execute(
        Commands::Config {
            action: Some(ConfigSubcommand::Endpoint {
                uri: "http://gpu-box:11434".to_string(),
            }),
        },
        &ctx,
    )
    .await
    .unwrap();

    assert_eq!(ctx.preferences().ollama_endpoint(), "http://gpu-box:11434");
    match ctx.preferences().endpoint_sync() {
        EndpointSync::Failed(reason) => assert!(reason.contains("host not allowed")),
        other => panic!("Expected failed sync, got {:?}", other),
    }
    let persisted: Preferences = storage.get_json(PREFERENCES_KEY).unwrap().unwrap();
    assert_eq!(persisted.ollama_endpoint, "http://gpu-box:11434");
}

#[tokio::test]
async fn test_theme_command_validates_and_persists() {
    let backend = ScriptedBackend::new();
    let storage = memory();
    let ctx = context(&backend, storage.clone());

    let err = CommandRouter::execute(
        Commands::Config {
            action: Some(ConfigSubcommand::Theme {
                theme: "neon".to_string(),
            }),
        },
        &ctx,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CliError::Preference(_)));
    assert_eq!(ctx.preferences().theme(), Theme::System);

    CommandRouter::execute(
        Commands::Config {
            action: Some(ConfigSubcommand::Theme {
                theme: "Dark".to_string(),
            }),
        },
        &ctx,
    )
    .await
    .unwrap();

    assert!(ctx.preferences().appearance().dark);
    let persisted: Preferences = storage.get_json(PREFERENCES_KEY).unwrap().unwrap();
    assert_eq!(persisted.theme, Theme::Dark);
    assert_eq!(backend.total(), 0);
}

#[tokio::test]
async fn test_config_without_action_shows_preferences() {
    let backend = ScriptedBackend::new();
    let ctx: Arc<AppContext> = context(&backend, memory());

    CommandRouter::execute(Commands::Config { action: None }, &ctx)
        .await
        .unwrap();

    assert_eq!(backend.total(), 0);
}

// ============================================================================
// Token usage
// ============================================================================

#[tokio::test]
async fn test_stats_record_sends_usage_without_touching_models() {
    let backend = ScriptedBackend::new();
    let ctx = context(&backend, memory());

    CommandRouter::execute(
        Commands::Stats {
            action: Some(StatsSubcommand::Record {
                model: " llama3 ".to_string(),
                prompt: 12,
                completion: 30,
                date: NaiveDate::from_ymd_opt(2024, 5, 1),
            }),
        },
        &ctx,
    )
    .await
    .unwrap();

    assert_eq!(
        backend.args_of(commands::RECORD_TOKENS),
        vec![json!({ "date": "2024-05-01", "prompt": 12, "completion": 30, "model": "llama3" })]
    );
    assert_eq!(backend.total(), 1);
    assert!(ctx.is_listening());
}

#[tokio::test]
async fn test_stats_defaults_to_showing_totals() {
    let backend = ScriptedBackend::new();
    backend.reply(
        commands::GET_TOKEN_STATS,
        json!([{ "date": "2024-05-01", "prompt_tokens": 1, "completion_tokens": 2 }]),
    );
    let ctx = context(&backend, memory());

    CommandRouter::execute(Commands::Stats { action: None }, &ctx)
        .await
        .unwrap();

    assert_eq!(backend.count(commands::GET_TOKEN_STATS), 1);
    assert_eq!(backend.total(), 1);
}

#[tokio::test]
async fn test_clear_requires_confirmation() {
    let backend = ScriptedBackend::new();
    let ctx = context(&backend, memory());

    let err = CommandRouter::execute(Commands::Clear { yes: false }, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::InvalidArgument { .. }));
    assert_eq!(backend.count(commands::CLEAR_ALL_DATA), 0);

    CommandRouter::execute(Commands::Clear { yes: true }, &ctx)
        .await
        .unwrap();
    assert_eq!(backend.count(commands::CLEAR_ALL_DATA), 1);
}

#[tokio::test]
async fn test_failed_clear_surfaces_the_command() {
    let backend = ScriptedBackend::new();
    backend.reject(commands::CLEAR_ALL_DATA, "read-only data dir");
    let ctx = context(&backend, memory());

    match CommandRouter::execute(Commands::Clear { yes: true }, &ctx).await {
        Err(CliError::Model(e)) => assert_eq!(e.command(), Some(commands::CLEAR_ALL_DATA)),
        other => panic!("Expected model error, got {:?}", other),
    }
}
