//! The requests handler: batch submission, deferred drain, terminal callbacks.
//!
//! ```text
//! parallel()/series()/group()
//!     │ enqueue (rejected once draining started)
//!     ▼
//! BatchQueue ──► spawned drain (one yield, or at then/catch/wait) or run()
//!                    │
//!                    ├─► Parallel: dispatch all, await all, slots by index
//!                    ├─► Series:   one item at a time, results fed forward
//!                    │
//!                    ├─ required error ──► RequiredFailure, stop
//!                    └─ optional error ──► remembered, keep draining
//!                    ▼
//!               settle once ──► then() | catch()
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::batch_result::{BatchResult, Verdict};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, OptionalFailure, RequiredFailure};
use crate::operation::{OperationDescriptor, Requests};
use crate::queue::{Batch, BatchQueue, Mode, QueuedBatch};
use crate::response::{OperationError, Response};

type SuccessCallback = Box<dyn FnOnce(Response) + Send>;
type FailureCallback = Box<dyn FnOnce(EngineError) + Send>;
type Outcome = EngineResult<Response>;

/// Identifies one handler run in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Default)]
struct RunState {
    queue: BatchQueue,
    scheduled: bool,
    /// Runtime to start the drain on once the chain closes.
    deferred: Option<Handle>,
    started: bool,
    settled: bool,
    delivered: bool,
    outcome: Option<Outcome>,
    group_names: HashSet<String>,
    group_results: HashMap<String, BatchResult>,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

struct Inner {
    id: RunId,
    config: EngineConfig,
    state: Mutex<RunState>,
    settled_tx: watch::Sender<Option<Outcome>>,
}

/// Collects batches of operations and runs them to a single outcome.
///
/// The handle is cheap to clone; clones share the same queue and run.
///
/// ```rust,ignore
/// let handler = RequestsHandler::new();
/// handler
///     .series(vec![load_user, load_settings])?
///     .parallel(Requests::new().required(load_todos).optional(load_badges))?
///     .then(|results| render(results))
///     .catch(|error| report(error));
/// ```
#[derive(Clone)]
pub struct RequestsHandler {
    inner: Arc<Inner>,
}

impl fmt::Debug for RequestsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("RequestsHandler")
            .field("id", &self.inner.id)
            .field("pending_batches", &state.queue.len())
            .field("started", &state.started)
            .field("settled", &state.settled)
            .finish()
    }
}

impl Default for RequestsHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestsHandler {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let (settled_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                id: RunId::new(),
                config,
                state: Mutex::new(RunState::default()),
                settled_tx,
            }),
        }
    }

    pub fn id(&self) -> RunId {
        self.inner.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Enqueues a batch whose operations are all dispatched at once.
    pub fn parallel(&self, requests: impl Into<Requests>) -> EngineResult<&Self> {
        self.enqueue(None, Mode::Parallel, requests.into())
    }

    /// Enqueues a batch whose operations run one after another.
    pub fn series(&self, requests: impl Into<Requests>) -> EngineResult<&Self> {
        self.enqueue(None, Mode::Series, requests.into())
    }

    /// Enqueues a batch in the configured default mode.
    pub fn requests(&self, requests: impl Into<Requests>) -> EngineResult<&Self> {
        self.enqueue(None, self.inner.config.default_mode, requests.into())
    }

    /// Enqueues a named batch whose result is kept for [`group_result`](Self::group_result).
    pub fn group(
        &self,
        name: impl Into<String>,
        mode: Mode,
        requests: impl Into<Requests>,
    ) -> EngineResult<&Self> {
        self.enqueue(Some(name.into()), mode, requests.into())
    }

    /// Registers the success callback.
    ///
    /// Replaces any earlier one. If the run already succeeded and no success
    /// callback was delivered yet, fires immediately.
    pub fn then<F>(&self, on_success: F) -> &Self
    where
        F: FnOnce(Response) + Send + 'static,
    {
        let mut state = self.state();
        if state.outcome.is_none() {
            state.on_success = Some(Box::new(on_success));
            self.start_deferred(state);
            return self;
        }
        let results = match &state.outcome {
            Some(Ok(results)) if !state.delivered => Some(results.clone()),
            _ => None,
        };
        if let Some(results) = results {
            state.delivered = true;
            drop(state);
            on_success(results);
        }
        self
    }

    /// Registers the failure callback. Same delivery rules as [`then`](Self::then).
    pub fn catch<F>(&self, on_failure: F)
    where
        F: FnOnce(EngineError) + Send + 'static,
    {
        let mut state = self.state();
        if state.outcome.is_none() {
            state.on_failure = Some(Box::new(on_failure));
            self.start_deferred(state);
            return;
        }
        let error = match &state.outcome {
            Some(Err(error)) if !state.delivered => Some(error.clone()),
            _ => None,
        };
        if let Some(error) = error {
            state.delivered = true;
            drop(state);
            on_failure(error);
        }
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    pub fn is_settled(&self) -> bool {
        self.state().settled
    }

    /// Batches submitted but not yet taken by a drain.
    pub fn pending_batches(&self) -> usize {
        self.state().queue.len()
    }

    /// Completed result of a named group.
    pub fn group_result(&self, name: &str) -> Option<BatchResult> {
        self.state().group_results.get(name).cloned()
    }

    /// Drains the queue and returns the run's outcome.
    ///
    /// If another task already started the drain this waits for it instead.
    /// Terminal callbacks fire either way.
    pub async fn run(&self) -> Outcome {
        let queue = {
            let mut state = self.state();
            if state.started {
                None
            } else {
                state.started = true;
                state.scheduled = true;
                state.deferred = None;
                Some(std::mem::take(&mut state.queue))
            }
        };

        let Some(queue) = queue else {
            return self.observe().await;
        };

        let span = tracing::info_span!("requests_handler", run_id = %self.inner.id);
        let outcome = self.drain(queue).instrument(span).await;
        self.settle(outcome.clone());
        outcome
    }

    /// Waits for the run to settle.
    ///
    /// With `auto_start` this closes the chain and drains right away if no
    /// drain started yet. Without it, this waits for someone to call
    /// [`run`](Self::run).
    pub async fn wait(&self) -> Outcome {
        if self.inner.config.auto_start && !self.is_started() {
            return self.run().await;
        }
        self.observe().await
    }

    async fn observe(&self) -> Outcome {
        let mut rx = self.inner.settled_tx.subscribe();
        let settled = rx.wait_for(Option::is_some).await;
        match settled {
            Ok(outcome) => match &*outcome {
                Some(outcome) => outcome.clone(),
                None => Err(EngineError::Unknown("settled without an outcome".into())),
            },
            Err(_) => Err(EngineError::Unknown("handler dropped before settling".into())),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, group: Option<String>, mode: Mode, requests: Requests) -> EngineResult<&Self> {
        let mut state = self.state();

        if state.started {
            return Err(EngineError::Configuration(
                "cannot submit requests after the handler started draining".into(),
            ));
        }

        if let Some(name) = &group {
            if state.group_names.contains(name) && !self.inner.config.allow_duplicate_groups {
                warn!(run_id = %self.inner.id, group = %name, "duplicate group rejected");
                return Err(EngineError::DuplicateGroup(name.clone()));
            }
        }

        let runtime = if self.inner.config.auto_start && !state.scheduled && state.deferred.is_none()
        {
            let handle = Handle::try_current().map_err(|e| {
                EngineError::Configuration(format!("no tokio runtime to schedule the drain: {e}"))
            })?;
            Some(handle)
        } else {
            None
        };

        if let Some(name) = &group {
            state.group_names.insert(name.clone());
        }
        debug!(
            run_id = %self.inner.id,
            group = group.as_deref(),
            ?mode,
            operations = requests.len(),
            "batch enqueued"
        );
        state.queue.push(group, Batch::new(mode, requests));

        if let Some(runtime) = runtime {
            match runtime.runtime_flavor() {
                // The caller keeps the only worker until it awaits, so one
                // yield is enough for the rest of the chain to land.
                RuntimeFlavor::CurrentThread => {
                    state.scheduled = true;
                    drop(state);
                    self.spawn_drain(&runtime);
                }
                // Another worker could drain mid-chain; wait for then/catch/wait.
                _ => {
                    debug!(run_id = %self.inner.id, "drain deferred until the chain closes");
                    state.deferred = Some(runtime);
                }
            }
        }

        Ok(self)
    }

    /// Starts a drain deferred by a multi-thread runtime, if any.
    fn start_deferred(&self, mut state: MutexGuard<'_, RunState>) {
        let Some(runtime) = state.deferred.take() else {
            return;
        };
        state.scheduled = true;
        drop(state);
        self.spawn_drain(&runtime);
    }

    fn spawn_drain(&self, runtime: &Handle) {
        let handler = self.clone();
        runtime.spawn(async move {
            // Let the submitting code finish its synchronous chain first.
            tokio::task::yield_now().await;
            let _ = handler.run().await;
        });
    }

    async fn drain(&self, mut queue: BatchQueue) -> Outcome {
        info!(batches = queue.len(), "draining requests queue");

        let mut completed: Vec<Response> = Vec::with_capacity(queue.len());
        let mut prior: Option<Response> = None;
        let mut failed_batches = Vec::new();
        let mut optional_errors = 0;

        while let Some(QueuedBatch { group, batch }) = queue.next() {
            let batch_index = completed.len();
            debug!(
                batch_index,
                group = group.as_deref(),
                mode = ?batch.mode(),
                operations = batch.len(),
                "handling batch"
            );

            let result = match batch {
                Batch::Parallel(items) => run_parallel(items, prior.take()).await,
                Batch::Series(items) => run_series(items, prior.take()).await,
            };

            if let Some(name) = group {
                self.state().group_results.insert(name, result.clone());
            }

            match result.verdict() {
                Verdict::RequiredFailed => {
                    warn!(
                        batch_index,
                        required_errors = result.required_error_count,
                        "required request failed, aborting run"
                    );
                    return Err(EngineError::RequiredFailure(RequiredFailure {
                        batch_index,
                        batch: result,
                        completed,
                    }));
                }
                Verdict::Inconsistent => {
                    return Err(EngineError::Unknown(format!(
                        "batch {batch_index} settled {} of {} requests ({} ok, {} failed)",
                        result.total_complete,
                        result.total_requests,
                        result.success_count,
                        result.error_count
                    )));
                }
                Verdict::OptionalFailed => {
                    warn!(
                        batch_index,
                        optional_errors = result.optional_error_count,
                        "optional request failed, continuing"
                    );
                    failed_batches.push(batch_index);
                    optional_errors += result.optional_error_count;
                }
                Verdict::Fulfilled => debug!(batch_index, "batch fulfilled"),
            }

            let response = result.into_response();
            prior = Some(response.clone());
            completed.push(response);
        }

        let results = Response::unwrap_single(completed);
        if failed_batches.is_empty() {
            info!("requests queue is clear");
            Ok(results)
        } else {
            Err(EngineError::OptionalFailure(OptionalFailure {
                results,
                failed_batches,
                error_count: optional_errors,
            }))
        }
    }

    fn settle(&self, outcome: Outcome) {
        let mut state = self.state();
        if state.settled {
            return;
        }
        state.settled = true;
        state.outcome = Some(outcome.clone());

        let on_success = state.on_success.take();
        let on_failure = state.on_failure.take();
        match &outcome {
            Ok(_) => state.delivered = on_success.is_some(),
            Err(_) => state.delivered = on_failure.is_some(),
        }
        drop(state);

        match &outcome {
            Ok(_) => info!(run_id = %self.inner.id, "run succeeded"),
            Err(error) if error.is_warning() => {
                warn!(run_id = %self.inner.id, %error, "run completed with warnings")
            }
            Err(error) => warn!(run_id = %self.inner.id, %error, "run failed"),
        }

        self.inner.settled_tx.send_replace(Some(outcome.clone()));

        match outcome {
            Ok(results) => {
                if let Some(callback) = on_success {
                    callback(results);
                }
            }
            Err(error) => {
                if let Some(callback) = on_failure {
                    callback(error);
                }
            }
        }
    }
}

/// Dispatches every operation at once and waits for all of them.
///
/// Siblings of a failed required operation are still awaited so nothing
/// outlives the run unobserved.
async fn run_parallel(items: Vec<OperationDescriptor>, prior: Option<Response>) -> BatchResult {
    let mut result = BatchResult::new(items.len());

    let dispatched = items.into_iter().map(|OperationDescriptor { required, operation }| {
        let future = operation.start(prior.clone());
        async move { (required, future.await.map_err(OperationError::from)) }
    });

    for (required, outcome) in join_all(dispatched).await {
        result.record(required, outcome);
    }
    result
}

/// Runs items in order. The first item sees the previous batch's result,
/// later items see this batch's results so far. Stops at a required failure.
async fn run_series(items: Vec<OperationDescriptor>, prior: Option<Response>) -> BatchResult {
    let mut result = BatchResult::new(items.len());
    let mut prior = prior;

    for (position, OperationDescriptor { required, operation }) in items.into_iter().enumerate() {
        let input = if position == 0 {
            prior.take()
        } else {
            Some(Response::List(result.results.clone()))
        };

        let outcome = operation.start(input).await.map_err(OperationError::from);
        let abort = required && outcome.is_err();
        result.record(required, outcome);
        if abort {
            break;
        }
    }
    result
}
