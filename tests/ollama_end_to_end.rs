//! End-to-end: the CLI context driving a real Ollama backend over HTTP
//! against a mock Ollama server

mod common;

use std::sync::Arc;

use common::{downloading, record_progress};
use mockito::{Matcher, Server};
use serde_json::json;
use chrono::NaiveDate;
use toolbox_cli::{AppContext, CommandRouter, Commands, ConfigSubcommand, StatsSubcommand};
use toolbox_ollama::OllamaBackend;
use toolbox_preferences::{EndpointSync, StaticColorScheme};
use toolbox_storage::MemoryStore;

fn context_for(backend: &Arc<OllamaBackend>, endpoint: &str) -> Arc<AppContext> {
    Arc::new(AppContext::with_parts(
        backend.clone(),
        backend.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticColorScheme::new(true)),
        endpoint,
    ))
}

#[tokio::test]
async fn test_startup_populates_state_from_ollama() {
    let mut server = Server::new_async().await;
    let tags = server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(
            json!({ "models": [
                { "name": "llama3:latest", "size": 4661224676u64, "digest": "365c0bd3c000" },
                { "name": "qwen2:7b", "size": 4431388192u64 }
            ]})
            .to_string(),
        )
        .create_async()
        .await;
    let ps = server
        .mock("GET", "/api/ps")
        .with_status(200)
        .with_body(json!({ "models": [{ "name": "llama3:latest", "size_vram": 5137025024u64 }] }).to_string())
        .create_async()
        .await;

    let backend = Arc::new(OllamaBackend::new(server.url()).unwrap());
    let ctx = context_for(&backend, &server.url());

    ctx.start().await;

    tags.assert_async().await;
    ps.assert_async().await;
    let models = ctx.registry().models();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].size(), Some(4661224676));
    assert_eq!(
        models[0].attribute("digest"),
        Some(&json!("365c0bd3c000"))
    );
    assert!(ctx.registry().is_running("llama3:latest"));
    assert_eq!(ctx.registry().gpu_info().total_bytes, 0);
    assert_eq!(ctx.preferences().endpoint_sync(), EndpointSync::Synced);
    assert!(ctx.preferences().appearance().dark);
}

#[tokio::test]
async fn test_pull_streams_progress_and_refreshes_models() {
    let mut server = Server::new_async().await;
    let body = [
        json!({ "status": "pulling manifest" }),
        json!({ "status": "downloading", "total": 200, "completed": 0 }),
        json!({ "status": "downloading", "total": 200, "completed": 100 }),
        json!({ "status": "downloading", "total": 200, "completed": 200 }),
        json!({ "status": "success" }),
    ]
    .iter()
    .map(|line| line.to_string())
    .collect::<Vec<_>>()
    .join("\n");
    let pull = server
        .mock("POST", "/api/pull")
        .match_body(Matcher::PartialJson(json!({ "name": "phi3", "stream": true })))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;
    let tags = server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(json!({ "models": [{ "name": "phi3:latest" }] }).to_string())
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/api/ps")
        .with_status(200)
        .with_body(json!({ "models": [] }).to_string())
        .create_async()
        .await;

    let backend = Arc::new(OllamaBackend::new(server.url()).unwrap());
    let ctx = context_for(&backend, &server.url());
    let (observed, watcher) = record_progress(ctx.registry());

    CommandRouter::execute(
        Commands::Pull {
            name: "phi3".to_string(),
        },
        &ctx,
    )
    .await
    .unwrap();
    tokio::task::yield_now().await;
    watcher.abort();

    pull.assert_async().await;
    tags.assert_async().await;
    let observed = observed.lock().clone();
    assert_eq!(downloading(&observed), vec![0, 50, 100]);
    assert_eq!(
        observed.last(),
        Some(&("success".to_string(), 0)),
        "the closing line is published before the reset"
    );
    assert!(ctx.registry().pull_progress().is_empty());
    assert!(ctx.registry().is_installed("phi3:latest"));
}

#[tokio::test]
async fn test_endpoint_change_redirects_the_backend() {
    let mut first = Server::new_async().await;
    let mut second = Server::new_async().await;
    let moved = second
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(json!({ "models": [{ "name": "mistral:latest" }] }).to_string())
        .create_async()
        .await;
    let stale = first
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(json!({ "models": [] }).to_string())
        .expect(0)
        .create_async()
        .await;

    let backend = Arc::new(OllamaBackend::new(first.url()).unwrap());
    let ctx = context_for(&backend, &first.url());

    CommandRouter::execute(
        Commands::Config {
            action: Some(ConfigSubcommand::Endpoint {
                uri: second.url(),
            }),
        },
        &ctx,
    )
    .await
    .unwrap();
    ctx.registry().fetch_models().await;

    assert_eq!(backend.base_url(), second.url());
    assert_eq!(ctx.preferences().endpoint_sync(), EndpointSync::Synced);
    assert!(ctx.registry().is_installed("mistral:latest"));
    moved.assert_async().await;
    stale.assert_async().await;
}

#[tokio::test]
async fn test_invalid_endpoint_is_rejected_by_the_backend() {
    let server = Server::new_async().await;
    let backend = Arc::new(OllamaBackend::new(server.url()).unwrap());
    let ctx = context_for(&backend, &server.url());

    CommandRouter::execute(
        Commands::Config {
            action: Some(ConfigSubcommand::Endpoint {
                uri: "not a url".to_string(),
            }),
        },
        &ctx,
    )
    .await
    .unwrap();

    assert_eq!(ctx.preferences().ollama_endpoint(), "not a url");
    assert!(matches!(
        ctx.preferences().endpoint_sync(),
        EndpointSync::Failed(_)
    ));
    assert_eq!(backend.base_url(), server.url());
}

#[tokio::test]
async fn test_status_reports_connection() {
    let mut server = Server::new_async().await;
    let root = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("Ollama is running")
        .create_async()
        .await;

    let backend = Arc::new(OllamaBackend::new(server.url()).unwrap());
    let ctx = context_for(&backend, &server.url());

    assert!(ctx.gateway().check_connection().await.unwrap());
    root.assert_async().await;
}

#[tokio::test]
async fn test_token_usage_is_recorded_aggregated_and_cleared() {
    let server = Server::new_async().await;
    let backend = Arc::new(OllamaBackend::new(server.url()).unwrap());
    let ctx = context_for(&backend, &server.url());

    for (day, prompt, completion, model) in [
        (2, 10, 20, "llama3"),
        (1, 1, 2, "qwen2:7b"),
        (2, 5, 5, "qwen2:7b"),
    ] {
        CommandRouter::execute(
            Commands::Stats {
                action: Some(StatsSubcommand::Record {
                    model: model.to_string(),
                    prompt,
                    completion,
                    date: NaiveDate::from_ymd_opt(2024, 5, day),
                }),
            },
            &ctx,
        )
        .await
        .unwrap();
    }

    let stats = ctx.gateway().get_token_stats().await.unwrap();
    let totals: Vec<(&str, u64)> = stats.iter().map(|s| (s.date.as_str(), s.total_tokens())).collect();
    assert_eq!(totals, vec![("2024-05-01", 3), ("2024-05-02", 40)]);

    CommandRouter::execute(Commands::Clear { yes: true }, &ctx)
        .await
        .unwrap();
    assert!(ctx.gateway().get_token_stats().await.unwrap().is_empty());
}
