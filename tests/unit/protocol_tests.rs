//! Unit tests for the evaluation engine wire protocol.

use serde_json::json;

use notebook_evaluator::engine::protocol::{EvaluateRequest, InstallRequest, MessagesResponse};

#[test]
fn evaluate_request_serializes_camel_case() {
    let request = EvaluateRequest {
        notebook_id: "nb-1".into(),
        notebook: json!({ "version": 1 }),
        cell_id: Some("cell-7".into()),
        single_cell: Some(true),
        containing_path: Some("/projects/demo".into()),
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["notebookId"], "nb-1");
    assert_eq!(value["cellId"], "cell-7");
    assert_eq!(value["singleCell"], true);
    assert_eq!(value["containingPath"], "/projects/demo");
}

#[test]
fn optional_fields_are_omitted_when_absent() {
    let request = EvaluateRequest {
        notebook_id: "nb-2".into(),
        notebook: json!({ "version": 1 }),
        cell_id: None,
        single_cell: None,
        containing_path: None,
    };

    let value = serde_json::to_value(&request).unwrap();
    let object = value.as_object().unwrap();
    assert!(!object.contains_key("cellId"));
    assert!(!object.contains_key("singleCell"));
    assert!(!object.contains_key("containingPath"));
}

#[test]
fn install_request_carries_notebook_verbatim() {
    let notebook = json!({ "version": 1, "cells": [{ "id": "a", "code": "print(1)" }] });
    let request = InstallRequest {
        notebook_id: "nb-3".into(),
        notebook: notebook.clone(),
        containing_path: None,
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["notebook"], notebook);
}

#[test]
fn messages_response_tolerates_missing_messages_array() {
    let response: MessagesResponse = serde_json::from_str("{}").unwrap();
    assert!(response.messages.is_empty());
}

#[test]
fn engine_message_defaults_args_to_null() {
    let response: MessagesResponse =
        serde_json::from_value(json!({ "messages": [{ "name": "evaluation-event" }] })).unwrap();

    assert_eq!(response.messages.len(), 1);
    assert!(response.messages[0].args.is_null());
}

#[test]
fn unknown_response_fields_are_ignored() {
    let response: MessagesResponse = serde_json::from_value(json!({
        "messages": [{ "name": "evaluation-event", "args": { "event": "cell-output" }, "extra": 1 }],
        "serverTime": "2024-01-01T00:00:00Z"
    }))
    .unwrap();

    assert_eq!(response.messages.len(), 1);
    assert_eq!(response.messages[0].args["event"], "cell-output");
}
