//! Asynchronous script execution
//!
//! [`ScriptExecutor`] owns a tokio runtime and runs direct-runtime scans
//! as background jobs. Scans are CPU-bound, so each one runs on
//! `spawn_blocking`; a lightweight poller task watches job states and
//! dispatches completion events to registered listeners.
//!
//! Evaluation failures and panics never propagate to the caller; they
//! surface as failure events and a FAILED job state.


use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ExecutorError, RuntimeError};
use crate::runtime::{DirectRuntime, ProgressListener, ScanResult};

/// How often the poller samples job states unless configured otherwise
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(20);

/* ===================== Job Types ===================== */

/// Identifier of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

/// What a finished job produced
#[derive(Clone)]
pub enum JobOutcome {
    /// Scan finished; carries final image-scope variables and the
    /// destination rasters
    Completed(ScanResult),
    /// Scan aborted; carries the rendered error
    Failed(String),
}

/// Event delivered to listeners when a job finishes
#[derive(Clone)]
pub struct JobEvent {
    pub job_id: JobId,
    pub outcome: JobOutcome,
}

/// Callback interface for job completion events
pub trait JobEventListener: Send + Sync {
    fn on_event(&self, event: &JobEvent);
}

struct Job {
    state: JobState,
    cancel: Arc<AtomicBool>,
    outcome: Option<JobOutcome>,
    /// Cancelled jobs deliver no event, so they start out notified
    notified: bool,
    /// The runtime comes back here when the job reaches a terminal state
    runtime: Option<DirectRuntime>,
}

/* ===================== Shared State ===================== */

struct ExecutorShared {
    jobs: Mutex<HashMap<JobId, Job>>,
    listeners: Mutex<Vec<Arc<dyn JobEventListener>>>,
    polling_interval: Mutex<Duration>,
    first_submit: AtomicBool,
    accepting: AtomicBool,
}

/// A mutex here only guards plain data; a panicked holder cannot leave it
/// inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Deliver events for terminal jobs that have not been announced yet
fn dispatch_pending(shared: &ExecutorShared) {
    let events: Vec<JobEvent> = {
        let mut jobs = lock(&shared.jobs);
        jobs.iter_mut()
            .filter(|(_, job)| job.state.is_terminal() && !job.notified)
            .filter_map(|(id, job)| {
                job.notified = true;
                job.outcome.clone().map(|outcome| JobEvent {
                    job_id: *id,
                    outcome,
                })
            })
            .collect()
    };
    if events.is_empty() {
        return;
    }
    let listeners: Vec<Arc<dyn JobEventListener>> = lock(&shared.listeners).clone();
    for event in &events {
        for listener in &listeners {
            listener.on_event(event);
        }
    }
}

/// Jobs whose blocking task never started are discarded when the owned
/// runtime shuts down; mark them failed so listeners still hear about
/// them.
fn fail_unstarted(shared: &ExecutorShared) {
    for job in lock(&shared.jobs).values_mut() {
        if !job.state.is_terminal() {
            job.state = JobState::Failed;
            job.outcome = Some(JobOutcome::Failed(
                "executor shut down before evaluation started".to_string(),
            ));
        }
    }
}

async fn poll_loop(shared: Arc<ExecutorShared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        dispatch_pending(&shared);
    }
}

/* ===================== Executor ===================== */

/// Runs direct-runtime scans as background jobs on an owned tokio
/// runtime.
///
/// Dropping the executor behaves like [`shutdown_now`](Self::shutdown_now).
pub struct ScriptExecutor {
    rt: Option<Runtime>,
    shared: Arc<ExecutorShared>,
}

impl ScriptExecutor {
    pub fn new() -> Result<Self, ExecutorError> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_time();
        Self::from_builder(builder)
    }

    /// Like [`new`](Self::new), capping how many scans may evaluate at
    /// once; further submissions queue until a slot frees up. `max_scans`
    /// must be at least 1.
    pub fn with_max_concurrent_scans(max_scans: usize) -> Result<Self, ExecutorError> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_time().max_blocking_threads(max_scans);
        Self::from_builder(builder)
    }

    fn from_builder(mut builder: tokio::runtime::Builder) -> Result<Self, ExecutorError> {
        let rt = builder.build().map_err(ExecutorError::Init)?;
        Ok(Self {
            rt: Some(rt),
            shared: Arc::new(ExecutorShared {
                jobs: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                polling_interval: Mutex::new(DEFAULT_POLLING_INTERVAL),
                first_submit: AtomicBool::new(false),
                accepting: AtomicBool::new(true),
            }),
        })
    }

    /// Queue a configured runtime for evaluation
    pub fn submit(
        &self,
        mut runtime: DirectRuntime,
        mut progress: Option<Box<dyn ProgressListener + Send>>,
    ) -> Result<JobId, ExecutorError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(ExecutorError::ShutDown);
        }
        let rt = self.rt.as_ref().ok_or(ExecutorError::ShutDown)?;

        let job_id = JobId::new();
        let cancel = runtime.cancel_token();
        lock(&self.shared.jobs).insert(
            job_id,
            Job {
                state: JobState::Queued,
                cancel,
                outcome: None,
                notified: false,
                runtime: None,
            },
        );

        // The poller starts with the first job, freezing the interval.
        if !self.shared.first_submit.swap(true, Ordering::SeqCst) {
            let interval = *lock(&self.shared.polling_interval);
            rt.spawn(poll_loop(Arc::clone(&self.shared), interval));
        }

        let shared = Arc::clone(&self.shared);
        rt.spawn_blocking(move || {
            if let Some(job) = lock(&shared.jobs).get_mut(&job_id) {
                job.state = JobState::Running;
            }
            debug!(%job_id, "job running");

            let result = catch_unwind(AssertUnwindSafe(|| {
                let listener = progress
                    .as_deref_mut()
                    .map(|p| p as &mut dyn ProgressListener);
                runtime.evaluate_all(listener)
            }));

            let mut jobs = lock(&shared.jobs);
            if let Some(job) = jobs.get_mut(&job_id) {
                match result {
                    Ok(Ok(())) => {
                        job.state = JobState::Completed;
                        job.outcome = Some(JobOutcome::Completed(runtime.scan_result()));
                    }
                    Ok(Err(RuntimeError::Cancelled)) => {
                        job.state = JobState::Cancelled;
                        job.notified = true;
                    }
                    Ok(Err(e)) => {
                        job.state = JobState::Failed;
                        job.outcome = Some(JobOutcome::Failed(e.to_string()));
                    }
                    Err(_) => {
                        job.state = JobState::Failed;
                        job.outcome = Some(JobOutcome::Failed(
                            "evaluation panicked".to_string(),
                        ));
                    }
                }
                debug!(%job_id, state = ?job.state, "job finished");
                job.runtime = Some(runtime);
            }
        });

        Ok(job_id)
    }

    /// Current state of a job
    pub fn job_state(&self, job_id: JobId) -> Option<JobState> {
        lock(&self.shared.jobs).get(&job_id).map(|j| j.state)
    }

    /// Request cancellation. Returns false when the job is unknown or
    /// already terminal. The scan stops at the next pixel boundary.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let jobs = lock(&self.shared.jobs);
        match jobs.get(&job_id) {
            Some(job) if !job.state.is_terminal() => {
                job.cancel.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Reclaim the runtime of a terminal job, with its written rasters
    /// and final variables
    pub fn take_runtime(&self, job_id: JobId) -> Option<DirectRuntime> {
        let mut jobs = lock(&self.shared.jobs);
        let job = jobs.get_mut(&job_id)?;
        if !job.state.is_terminal() {
            return None;
        }
        job.runtime.take()
    }

    /// Change how often completion events are dispatched. Effective only
    /// before the first submit; later calls keep the current value.
    pub fn set_polling_interval(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("polling interval ignored: must be positive");
            return;
        }
        if self.shared.first_submit.load(Ordering::SeqCst) {
            warn!("polling interval ignored: executor has already started polling");
            return;
        }
        *lock(&self.shared.polling_interval) = interval;
    }

    pub fn polling_interval(&self) -> Duration {
        *lock(&self.shared.polling_interval)
    }

    pub fn add_event_listener(&self, listener: Arc<dyn JobEventListener>) {
        lock(&self.shared.listeners).push(listener);
    }

    /// Remove a previously added listener (matched by identity)
    pub fn remove_event_listener(&self, listener: &Arc<dyn JobEventListener>) -> bool {
        let mut listeners = lock(&self.shared.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Stop accepting jobs, wait for in-flight scans to finish and deliver
    /// their events. Jobs still queued when the worker pool drains are
    /// marked failed and announced too.
    pub fn shutdown(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        if let Some(rt) = self.rt.take() {
            // Dropping the runtime waits for started blocking tasks.
            drop(rt);
        }
        fail_unstarted(&self.shared);
        dispatch_pending(&self.shared);
    }

    /// Stop accepting jobs and cancel everything still running; cancelled
    /// jobs deliver no events
    pub fn shutdown_now(&mut self) {
        self.abort();
    }

    /// Shut down and block until jobs drain or the timeout elapses
    pub fn shutdown_and_wait(&mut self, timeout: Duration) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        if let Some(rt) = self.rt.take() {
            rt.shutdown_timeout(timeout);
        }
        fail_unstarted(&self.shared);
        dispatch_pending(&self.shared);
    }

    fn abort(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        for job in lock(&self.shared.jobs).values() {
            if !job.state.is_terminal() {
                job.cancel.store(true, Ordering::Relaxed);
            }
        }
        if let Some(rt) = self.rt.take() {
            rt.shutdown_background();
        }
    }
}

impl Drop for ScriptExecutor {
    fn drop(&mut self) {
        if self.rt.is_some() {
            self.abort();
        }
    }
}
