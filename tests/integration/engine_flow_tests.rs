//! End-to-end coordinator flows against a real HTTP mock engine.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use notebook_evaluator::config::EngineConfig;
use notebook_evaluator::engine::HttpEngine;
use notebook_evaluator::evaluator::EvaluatorClient;

use super::mock_engine::spawn_mock_engine;

const POLL: Duration = Duration::from_millis(25);
const GRACE: Duration = Duration::from_millis(250);

fn http_engine(base_url: &str) -> Arc<HttpEngine> {
    let config = EngineConfig {
        base_url: base_url.to_owned(),
        request_timeout_seconds: 5,
    };
    Arc::new(HttpEngine::new(&config).expect("build http engine"))
}

fn client_for(engine: Arc<HttpEngine>) -> EvaluatorClient {
    EvaluatorClient::new(engine, POLL, GRACE)
}

/// Poll a condition until it holds or the deadline passes.
async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn evaluate_round_trip_over_http() {
    let (base_url, state) = spawn_mock_engine().await;
    let client = client_for(http_engine(&base_url));

    let mut events = client.on_engine_event();
    client.eval_notebook(
        "nb-http",
        &json!({ "version": 1, "cells": [] }),
        Some("/projects/demo"),
    );

    // The evaluate request reaches the engine with its wire-format field names.
    let delivered = wait_until(Duration::from_secs(2), || {
        !state.evaluates.lock().unwrap().is_empty()
    })
    .await;
    assert!(delivered, "engine never received the evaluate request");
    {
        let evaluates = state.evaluates.lock().unwrap();
        assert_eq!(evaluates.len(), 1);
        assert_eq!(evaluates[0]["notebookId"], "nb-http");
        assert_eq!(evaluates[0]["containingPath"], "/projects/demo");
        assert!(evaluates[0].get("cellId").is_none());
    }
    assert!(client.is_working());

    // Completion flows back through the message pump.
    state.queue_event(json!({ "event": "notebook-eval-completed" }));
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("completion event before timeout")
        .expect("signal live");
    assert_eq!(event["event"], "notebook-eval-completed");

    let idle = wait_until(Duration::from_secs(1), || !client.is_working()).await;
    assert!(idle, "job should retire after the completion event");

    // The pump stops once the grace window passes with no new work.
    tokio::time::sleep(GRACE + Duration::from_millis(250)).await;
    let settled = state.polls();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.polls(), settled, "pump must stop after the grace window");
}

#[tokio::test]
async fn single_cell_evaluation_carries_cell_fields() {
    let (base_url, state) = spawn_mock_engine().await;
    let client = client_for(http_engine(&base_url));

    client.eval_single_cell("nb-cell", &json!({ "version": 1 }), "cell-42", None);

    let delivered = wait_until(Duration::from_secs(2), || {
        !state.evaluates.lock().unwrap().is_empty()
    })
    .await;
    assert!(delivered);

    let evaluates = state.evaluates.lock().unwrap();
    assert_eq!(evaluates[0]["cellId"], "cell-42");
    assert_eq!(evaluates[0]["singleCell"], true);

    client.stop_evaluation("nb-cell");
}

#[tokio::test]
async fn stop_reaches_engine_and_halts_pump() {
    let (base_url, state) = spawn_mock_engine().await;
    let client = client_for(http_engine(&base_url));

    client.install_notebook("nb-stop", &json!({ "version": 1 }), None);
    let installed = wait_until(Duration::from_secs(2), || {
        !state.installs.lock().unwrap().is_empty()
    })
    .await;
    assert!(installed);

    client.stop_evaluation("nb-stop");
    assert!(!client.is_working());

    let stop_seen = wait_until(Duration::from_secs(2), || {
        !state.stops.lock().unwrap().is_empty()
    })
    .await;
    assert!(stop_seen, "engine never received the stop request");
    assert_eq!(state.stops.lock().unwrap()[0]["notebookId"], "nb-stop");

    // Let any in-flight poll land, then confirm silence.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = state.polls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(state.polls(), settled);
}

#[tokio::test]
async fn pump_survives_server_errors_on_messages() {
    let (base_url, state) = spawn_mock_engine().await;
    let client = client_for(http_engine(&base_url));
    state.set_fail_messages(true);

    client.eval_notebook("nb-err", &json!({ "version": 1 }), None);

    // Several failing cycles go by; the pump keeps polling.
    let kept_polling = wait_until(Duration::from_secs(2), || state.polls() >= 3).await;
    assert!(kept_polling, "pump gave up after failed polls");
    assert!(client.is_working());

    // Once the engine recovers, the session completes normally.
    state.set_fail_messages(false);
    state.queue_event(json!({ "event": "notebook-eval-completed" }));
    let idle = wait_until(Duration::from_secs(2), || !client.is_working()).await;
    assert!(idle, "completion after recovery should retire the job");
}

#[test]
fn http_engine_trims_trailing_slash() {
    let config = EngineConfig {
        base_url: "http://127.0.0.1:9000/".to_owned(),
        request_timeout_seconds: 5,
    };
    let engine = HttpEngine::new(&config).expect("build http engine");
    assert_eq!(engine.base_url(), "http://127.0.0.1:9000");
}
