//! Wire protocol for the evaluation engine's HTTP endpoints.
//!
//! All four endpoints are JSON-over-POST. The notebook document itself is
//! an opaque serialized structure owned by the editor; it passes through
//! unchanged as a [`serde_json::Value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message category for notebook execution events pushed by the engine.
pub const EVALUATION_EVENT: &str = "evaluation-event";

/// Event discriminant signalling that a notebook install finished.
pub const NOTEBOOK_INSTALL_COMPLETED: &str = "notebook-install-completed";

/// Event discriminant signalling that a notebook evaluation finished.
pub const NOTEBOOK_EVAL_COMPLETED: &str = "notebook-eval-completed";

/// Payload for the `/install` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    /// The ID of the notebook to be installed.
    pub notebook_id: String,
    /// The serialized notebook to install.
    pub notebook: Value,
    /// The containing path of the notebook, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing_path: Option<String>,
}

/// Payload for the `/evaluate` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    /// The ID of the notebook to be evaluated.
    pub notebook_id: String,
    /// The serialized notebook to evaluate.
    pub notebook: Value,
    /// Evaluate up to and including this cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    /// When set, evaluate only `cell_id` and no others.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_cell: Option<bool>,
    /// The containing path of the notebook, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing_path: Option<String>,
}

/// Payload for the `/stop-evaluation` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    /// The ID of the notebook to be stopped.
    pub notebook_id: String,
}

/// Payload for the `/messages` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRequest {
    /// The notebook whose queued messages are requested.
    pub notebook_id: String,
}

/// One queued message retrieved from the engine.
///
/// Messages named [`EVALUATION_EVENT`] carry an `event` discriminant inside
/// `args`; everything else in `args` is opaque to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMessage {
    /// Message category name.
    pub name: String,
    /// Raw message payload, forwarded verbatim to subscribers.
    #[serde(default)]
    pub args: Value,
}

/// Response body of the `/messages` endpoint.
///
/// A body missing the `messages` array deserializes to an empty list rather
/// than failing the poll cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Queued messages, oldest first. May be empty.
    #[serde(default)]
    pub messages: Vec<EngineMessage>,
}
