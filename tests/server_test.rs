//! Integration tests for the dashboard HTTP server

use activity_logger::collector::{
    ChannelSource, Capability, Collector, CollectorConfig, PointerButton, Position, RawInput,
};
use activity_logger::config::{Config, ServerSettings, SourceConfig};
use activity_logger::server::{run, AppState};
use activity_logger::Pipeline;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> Config {
    Config {
        data_path: dir.path().to_path_buf(),
        sources: SourceConfig::from_csv("all"),
        server: ServerSettings {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        ..Config::default()
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let pipeline = Pipeline::open(&config).unwrap();
    let state = Arc::new(AppState::new(&pipeline, &config));

    let (addr, shutdown_tx) = run(&config.server, state)
        .await
        .expect("Failed to start server");

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    assert!(response.headers().get("set-cookie").is_some());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some());
    assert_eq!(body["flush"]["events_written"], 0);

    let _ = shutdown_tx.send(());
}

/// Inputs pushed through a capture source end up in `/data` after a flush.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capture_to_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let pipeline = Pipeline::open(&config).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut collector = Collector::new(
        CollectorConfig::from_config(&config),
        pipeline.queue.clone(),
    );
    collector.add_source(Box::new(ChannelSource::from_receiver(
        "test-input",
        vec![Capability::Pointer, Capability::Keyboard],
        rx,
    )));
    collector.start().unwrap();

    let at = Position::new(200.0, 300.0);
    for pressed in [true, false, true, false] {
        tx.send(RawInput::PointerButton {
            button: PointerButton::Left,
            position: at,
            pressed,
        })
        .unwrap();
    }
    tx.send(RawInput::PointerButton {
        button: PointerButton::Right,
        position: at,
        pressed: true,
    })
    .unwrap();
    tx.send(RawInput::Key { pressed: true }).unwrap();
    tx.send(RawInput::Key { pressed: false }).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.queue.len() < 7 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    collector.stop();
    assert_eq!(pipeline.flush_worker().flush_once().unwrap(), 7);

    let state = Arc::new(AppState::new(&pipeline, &config));
    let (addr, shutdown_tx) = run(&config.server, state)
        .await
        .expect("Failed to start server");

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .get(format!("http://{}/data", addr))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(body["clicks_left"], 2);
    assert_eq!(body["clicks_right"], 1);
    assert_eq!(body["clicks_middle"], 0);
    assert_eq!(body["key_presses"], 1);
    assert_eq!(body["gamepad_actions"], 0);
    assert!(body["__logging_since__"].is_string());

    let traffic: serde_json::Value = client
        .get(format!("http://{}/traffic", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // Two requests without a cookie: two sessions.
    assert_eq!(traffic["users"], 2);
    let first = traffic["user_data"].as_object().unwrap().values().next().unwrap();
    assert_eq!(first["ip"], "127.0.0.1");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_bad_window_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let pipeline = Pipeline::open(&config).unwrap();
    let state = Arc::new(AppState::new(&pipeline, &config));

    let (addr, shutdown_tx) = run(&config.server, state).await.unwrap();

    let response = reqwest::get(format!("http://{}/data?window=-3h", addr))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_WINDOW");

    let _ = shutdown_tx.send(());
}
