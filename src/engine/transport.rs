//! HTTP transport to the evaluation engine.
//!
//! [`HttpEngine`] is the production implementation; the coordinator only
//! sees the [`EvaluationEngine`] trait, so tests can swap in a scripted
//! engine without a network.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::protocol::{
    EvaluateRequest, InstallRequest, MessagesRequest, MessagesResponse, StopRequest,
};
use crate::{AppError, Result};

/// Interface between the session coordinator and the evaluation engine.
///
/// All methods are single-shot requests. Install, evaluate, and stop
/// responses are ignored by the caller; only `poll_messages` returns data.
pub trait EvaluationEngine: Send + Sync {
    /// Ask the engine to install a notebook's dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the request cannot be delivered or
    /// the engine responds with a non-success status.
    fn install(
        &self,
        request: InstallRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask the engine to evaluate a notebook (whole, to a cell, or one cell).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the request cannot be delivered or
    /// the engine responds with a non-success status.
    fn evaluate(
        &self,
        request: EvaluateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask the engine to stop all work for a notebook.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the request cannot be delivered or
    /// the engine responds with a non-success status.
    fn stop(&self, request: StopRequest) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Retrieve the messages queued for a notebook since the last poll.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the request cannot be delivered or
    /// the engine responds with a non-success status. A syntactically
    /// unreadable body is not an error; implementations degrade it to an
    /// empty message list.
    fn poll_messages(
        &self,
        request: MessagesRequest,
    ) -> Pin<Box<dyn Future<Output = Result<MessagesResponse>> + Send + '_>>;
}

/// Evaluation engine client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngine {
    /// Build an HTTP client for the configured engine.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AppError::Engine(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// The engine base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "engine request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| AppError::Engine(format!("POST {path} failed: {err}")))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(AppError::Engine(format!(
                "POST {path} returned {}",
                response.status()
            )))
        }
    }
}

impl EvaluationEngine for HttpEngine {
    fn install(
        &self,
        request: InstallRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.post("/install", &request).await?;
            Ok(())
        })
    }

    fn evaluate(
        &self,
        request: EvaluateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.post("/evaluate", &request).await?;
            Ok(())
        })
    }

    fn stop(&self, request: StopRequest) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.post("/stop-evaluation", &request).await?;
            Ok(())
        })
    }

    fn poll_messages(
        &self,
        request: MessagesRequest,
    ) -> Pin<Box<dyn Future<Output = Result<MessagesResponse>> + Send + '_>> {
        Box::pin(async move {
            let response = self.post("/messages", &request).await?;

            // An unreadable body is treated as "no messages queued" so a
            // misbehaving engine cannot wedge the pump.
            match response.json::<MessagesResponse>().await {
                Ok(body) => Ok(body),
                Err(err) => {
                    debug!(%err, "unreadable messages response, treating as empty");
                    Ok(MessagesResponse::default())
                }
            }
        })
    }
}
