//! App-side client to the evaluation engine.
//!
//! [`EvaluatorClient`] owns the evaluation session: which named jobs are
//! in flight, which notebook is bound to the engine, and whether the
//! message pump is running. Install/evaluate/stop calls mutate the local
//! job state synchronously and dispatch the corresponding engine request
//! fire-and-forget; request failures are logged, never surfaced to the
//! caller, and never roll back job state. The recurring pump retrieves
//! queued engine messages, retires jobs on completion events, and forwards
//! every evaluation event verbatim to subscribers.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::protocol::{
    EngineMessage, EvaluateRequest, InstallRequest, MessagesRequest, StopRequest,
    EVALUATION_EVENT, NOTEBOOK_EVAL_COMPLETED, NOTEBOOK_INSTALL_COMPLETED,
};
use crate::engine::EvaluationEngine;
use crate::evaluator::signal::{Signal, Subscription};

/// Label shown while a notebook's dependencies are being installed.
const INSTALLING_NOTEBOOK_JOB_NAME: &str = "Installing notebook";

/// Label shown while a notebook is being evaluated.
const EVALUATING_NOTEBOOK_JOB_NAME: &str = "Evaluating notebook";

/// Job description reported when nothing is in flight.
const IDLE_JOB_NAME: &str = "Idle";

/// A named unit of in-flight engine work, tracked by category rather than
/// by request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Installing a notebook's dependencies.
    Install,
    /// Evaluating notebook cells.
    Evaluate,
}

impl Job {
    /// Human-readable label for this job category.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Install => INSTALLING_NOTEBOOK_JOB_NAME,
            Self::Evaluate => EVALUATING_NOTEBOOK_JOB_NAME,
        }
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Session state guarded by the coordinator's mutex.
///
/// `pump` is `Some` exactly while the pump task is live: from the first
/// job start until cancellation by `stop_evaluation` or an idle check.
#[derive(Debug, Default)]
struct SessionState {
    /// Notebook currently bound to the engine for polling.
    notebook_id: Option<String>,
    /// Active jobs, deduplicated, in insertion order.
    jobs: Vec<Job>,
    /// Bumped on every job start; lets a scheduled idle check detect that
    /// new work arrived after it was scheduled.
    epoch: u64,
    /// Cancellation token for the running pump task.
    pump: Option<CancellationToken>,
}

/// Client to the evaluation engine that tracks the active session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct EvaluatorClient {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn EvaluationEngine>,
    session: Mutex<SessionState>,
    jobs_changed: Signal<()>,
    engine_events: Signal<Value>,
    poll_interval: Duration,
    idle_grace: Duration,
}

impl EvaluatorClient {
    /// Create a coordinator for `engine` with the given pump cadence and
    /// idle grace window.
    #[must_use]
    pub fn new(engine: Arc<dyn EvaluationEngine>, poll_interval: Duration, idle_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                session: Mutex::new(SessionState::default()),
                jobs_changed: Signal::new(),
                engine_events: Signal::new(),
                poll_interval,
                idle_grace,
            }),
        }
    }

    /// True while at least one job is in flight.
    #[must_use]
    pub fn is_working(&self) -> bool {
        !self.inner.session().jobs.is_empty()
    }

    /// Description of the work in flight: `"Idle"` when nothing is active,
    /// otherwise the active job labels joined with `", "` in start order.
    #[must_use]
    pub fn current_job_name(&self) -> String {
        let session = self.inner.session();
        if session.jobs.is_empty() {
            IDLE_JOB_NAME.to_owned()
        } else {
            session
                .jobs
                .iter()
                .map(|job| job.label())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    /// Subscribe to job-set changes (add, retire, clear).
    #[must_use]
    pub fn on_jobs_changed(&self) -> Subscription<()> {
        self.inner.jobs_changed.subscribe()
    }

    /// Subscribe to raw evaluation events pushed by the engine.
    #[must_use]
    pub fn on_engine_event(&self) -> Subscription<Value> {
        self.inner.engine_events.subscribe()
    }

    /// Ask the engine to install `notebook`'s dependencies.
    ///
    /// Returns once the local job state is updated; the install request is
    /// dispatched in the background and its failure is logged, not raised.
    pub fn install_notebook(&self, notebook_id: &str, notebook: &Value, containing_path: Option<&str>) {
        info!(notebook_id, "install notebook");

        Inner::begin_job(&self.inner, notebook_id, Job::Install);

        let request = InstallRequest {
            notebook_id: notebook_id.to_owned(),
            notebook: notebook.clone(),
            containing_path: containing_path.map(ToOwned::to_owned),
        };
        let engine = Arc::clone(&self.inner.engine);
        tokio::spawn(async move {
            if let Err(err) = engine.install(request).await {
                warn!(%err, "install request failed");
            }
        });
    }

    /// Evaluate the entire notebook.
    pub fn eval_notebook(&self, notebook_id: &str, notebook: &Value, containing_path: Option<&str>) {
        info!(notebook_id, "eval notebook");

        self.start_evaluation(notebook_id, notebook, None, None, containing_path);
    }

    /// Evaluate all cells up to and including `cell_id`.
    pub fn eval_to_cell(
        &self,
        notebook_id: &str,
        notebook: &Value,
        cell_id: &str,
        containing_path: Option<&str>,
    ) {
        info!(notebook_id, cell_id, "eval to cell");

        self.start_evaluation(notebook_id, notebook, Some(cell_id), Some(false), containing_path);
    }

    /// Evaluate only `cell_id`.
    pub fn eval_single_cell(
        &self,
        notebook_id: &str,
        notebook: &Value,
        cell_id: &str,
        containing_path: Option<&str>,
    ) {
        info!(notebook_id, cell_id, "eval single cell");

        self.start_evaluation(notebook_id, notebook, Some(cell_id), Some(true), containing_path);
    }

    /// Stop all engine work for `notebook_id`.
    ///
    /// This is an unconditional local reset: every active job is cleared
    /// (install tracking included) and the pump stops immediately, with no
    /// grace window. The stop request to the engine is best-effort.
    pub fn stop_evaluation(&self, notebook_id: &str) {
        info!(notebook_id, "stop evaluation");

        let pump = {
            let mut session = self.inner.session();
            session.jobs.clear();
            session.pump.take()
        };
        self.inner.jobs_changed.emit(());
        if let Some(cancel) = pump {
            cancel.cancel();
            info!("stopped the message pump");
        }

        let request = StopRequest {
            notebook_id: notebook_id.to_owned(),
        };
        let engine = Arc::clone(&self.inner.engine);
        tokio::spawn(async move {
            if let Err(err) = engine.stop(request).await {
                warn!(%err, "stop request failed");
            }
        });
    }

    /// Shared path for the three evaluate variants.
    fn start_evaluation(
        &self,
        notebook_id: &str,
        notebook: &Value,
        cell_id: Option<&str>,
        single_cell: Option<bool>,
        containing_path: Option<&str>,
    ) {
        Inner::begin_job(&self.inner, notebook_id, Job::Evaluate);

        let request = EvaluateRequest {
            notebook_id: notebook_id.to_owned(),
            notebook: notebook.clone(),
            cell_id: cell_id.map(ToOwned::to_owned),
            single_cell,
            containing_path: containing_path.map(ToOwned::to_owned),
        };
        let engine = Arc::clone(&self.inner.engine);
        tokio::spawn(async move {
            if let Err(err) = engine.evaluate(request).await {
                warn!(%err, "evaluate request failed");
            }
        });
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the notebook, add `job` to the active set, and make sure the
    /// pump is running. The mutation completes before this returns, so
    /// `is_working` observers see the new state immediately.
    fn begin_job(inner: &Arc<Self>, notebook_id: &str, job: Job) {
        {
            let mut session = inner.session();
            session.notebook_id = Some(notebook_id.to_owned());
            if !session.jobs.contains(&job) {
                session.jobs.push(job);
            }
            session.epoch = session.epoch.wrapping_add(1);
        }
        inner.jobs_changed.emit(());
        Self::ensure_pump(inner);
    }

    /// Start the message pump unless it is already running.
    fn ensure_pump(inner: &Arc<Self>) {
        let cancel = {
            let mut session = inner.session();
            if session.pump.is_some() {
                // Pump already running.
                return;
            }
            let cancel = CancellationToken::new();
            session.pump = Some(cancel.clone());
            cancel
        };

        let pump = Arc::clone(inner);
        tokio::spawn(async move {
            pump.pump_loop(cancel).await;
        });
        info!("started the message pump");
    }

    /// Recurring poll against the engine's message queue.
    ///
    /// Each cycle awaits its poll before sleeping again, so at most one
    /// poll request is in flight at any time. A failed poll skips that
    /// cycle's message processing and the loop keeps going.
    async fn pump_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("message pump cancelled");
                    return;
                }
                () = tokio::time::sleep(self.poll_interval) => {}
            }

            let Some(notebook_id) = self.session().notebook_id.clone() else {
                continue;
            };

            match self
                .engine
                .poll_messages(MessagesRequest { notebook_id })
                .await
            {
                Ok(response) => Self::dispatch_messages(&self, response.messages),
                Err(err) => warn!(%err, "message poll failed"),
            }
        }
    }

    /// Interpret one poll cycle's messages.
    ///
    /// Completion events retire their job; every evaluation event is then
    /// forwarded verbatim, retired or not.
    fn dispatch_messages(inner: &Arc<Self>, messages: Vec<EngineMessage>) {
        for message in messages {
            if message.name != EVALUATION_EVENT {
                debug!(name = %message.name, "ignoring non-evaluation message");
                continue;
            }

            match message.args.get("event").and_then(Value::as_str) {
                Some(NOTEBOOK_INSTALL_COMPLETED) => {
                    info!("notebook install completed");
                    Self::retire_job(inner, Job::Install);
                }
                Some(NOTEBOOK_EVAL_COMPLETED) => {
                    info!("notebook evaluation completed");
                    Self::retire_job(inner, Job::Evaluate);
                }
                _ => {}
            }

            inner.engine_events.emit(message.args);
        }
    }

    /// Remove `job` from the active set and schedule the idle check that
    /// may stop the pump once the grace window elapses.
    fn retire_job(inner: &Arc<Self>, job: Job) {
        let epoch = {
            let mut session = inner.session();
            session.jobs.retain(|active| *active != job);
            session.epoch
        };
        inner.jobs_changed.emit(());
        Self::schedule_idle_check(inner, epoch);
    }

    /// Stop the pump after the grace window, unless work arrived meanwhile.
    ///
    /// The check captures the epoch at schedule time; a job started before
    /// the timer fires bumps the epoch and turns the check into a no-op,
    /// so a completion chained straight into a new evaluation never sees a
    /// pump stop/restart gap.
    fn schedule_idle_check(inner: &Arc<Self>, epoch: u64) {
        let check = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(check.idle_grace).await;

            let pump = {
                let mut session = check.session();
                if session.epoch != epoch || !session.jobs.is_empty() {
                    return;
                }
                session.pump.take()
            };
            if let Some(cancel) = pump {
                cancel.cancel();
                info!("stopped the message pump");
            }
        });
    }
}
