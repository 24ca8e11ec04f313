//! Asynchronous, cancellable workflow execution.
//!
//! A run moves through `Idle → Running → {Committed, Failed, Aborted}`.
//! The worker thread only ever touches the isolated working copy; the real
//! core is written exactly once, by [`RunHandle::finish`], which commits on
//! success and strips the plan layer on failure or abort. The outcome a
//! caller receives is therefore ordered after every effect it implies.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver};
use uuid::Uuid;

use crate::error::{Result, StratumError};
use crate::model::{Core, WorkingCore};
use crate::plan::workflow::{ComputationPlan, ExecutionStatus, Workflow};

/// Cooperative cancellation signal shared between the requesting flow and
/// the running workflow.
///
/// Cancellation is observed between steps, never preemptively mid-step.
/// Cancelling an already-completed run is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Terminal state of a finished run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The workflow completed and its layer was merged into the core.
    Committed,
    /// A step raised an error; the plan layer was stripped from the core.
    /// The triggering error is retained for diagnostics.
    Failed(StratumError),
    /// Cancellation was observed; the plan layer was stripped from the
    /// core. No error is attached.
    Aborted,
}

impl RunOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, RunOutcome::Committed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Committed => "Committed",
            RunOutcome::Failed(_) => "Failed",
            RunOutcome::Aborted => "Aborted",
        }
    }
}

type WorkerResult = (Result<ExecutionStatus>, WorkingCore);

/// Runs workflows off the interactive path, one at a time per
/// `(core, plan)` pair.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    active: Arc<Mutex<HashSet<(String, String)>>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run for this `(core, plan)` pair is currently in flight.
    pub fn is_running(&self, core: &str, plan: &str) -> bool {
        self.active
            .lock()
            .expect("executor registry poisoned")
            .contains(&(core.to_string(), plan.to_string()))
    }

    /// Start a workflow run against an isolated working copy of `core`.
    ///
    /// Rejects a second concurrent run for the same `(core, plan)` pair
    /// with `PlanAlreadyRunning`. The caller keeps the token to request
    /// cancellation and must call [`RunHandle::finish`] to apply the
    /// outcome to the real core.
    pub fn start(
        &self,
        core: &Core,
        plan: &ComputationPlan,
        workflow: Workflow,
        cancel: CancelToken,
    ) -> Result<RunHandle> {
        let key = (core.name().to_string(), plan.name.clone());
        {
            let mut active = self.active.lock().expect("executor registry poisoned");
            if !active.insert(key.clone()) {
                return Err(StratumError::PlanAlreadyRunning {
                    core: key.0,
                    plan: key.1,
                });
            }
        }

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut working = core.new_computation(&plan.name);
        let worker_token = cancel.clone();
        let (tx, rx) = bounded::<WorkerResult>(1);

        tracing::info!(
            run = %id,
            core = %key.0,
            plan = %key.1,
            samples = working.len(),
            "starting computation run"
        );

        let spawn = std::thread::Builder::new()
            .name(format!("stratum-run-{}", plan.name))
            .spawn(move || {
                let status = workflow.execute(&mut working, &worker_token);
                // The receiver may be gone if the handle was dropped; the
                // working copy dies with us either way.
                let _ = tx.send((status, working));
            });

        let worker = match spawn {
            Ok(handle) => handle,
            Err(e) => {
                self.release(&key);
                return Err(StratumError::Io(e));
            }
        };

        Ok(RunHandle {
            id,
            core_name: key.0,
            plan_name: key.1,
            started_at,
            cancel,
            rx,
            worker: Some(worker),
            active: Arc::clone(&self.active),
            released: false,
        })
    }

    fn release(&self, key: &(String, String)) {
        self.active
            .lock()
            .expect("executor registry poisoned")
            .remove(key);
    }
}

/// Handle to one in-flight run.
///
/// Exists only while the run is Running; [`RunHandle::finish`] consumes it,
/// applies the result to the real core, and returns the terminal outcome
/// exactly once.
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    core_name: String,
    plan_name: String,
    started_at: DateTime<Utc>,
    cancel: CancelToken,
    rx: Receiver<WorkerResult>,
    worker: Option<JoinHandle<()>>,
    active: Arc<Mutex<HashSet<(String, String)>>>,
    released: bool,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn core_name(&self) -> &str {
        &self.core_name
    }

    pub fn plan_name(&self) -> &str {
        &self.plan_name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the worker has produced its result (non-blocking).
    pub fn is_finished(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Wait for the worker and apply its result to the real core.
    ///
    /// Commit on completion; strip the plan layer on failure or abort —
    /// including a commit that failed validation, so no partial layer ever
    /// survives. Blocks until the worker is done.
    pub fn finish(mut self, core: &mut Core) -> RunOutcome {
        debug_assert_eq!(core.name(), self.core_name, "outcome applied to the wrong core");
        let received = self.rx.recv();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.release();

        let outcome = match received {
            Ok((Ok(ExecutionStatus::Completed), working)) => {
                match core.commit_computation(working) {
                    Ok(()) => RunOutcome::Committed,
                    Err(e) => {
                        core.strip_experiment(&self.plan_name);
                        RunOutcome::Failed(e)
                    }
                }
            }
            Ok((Ok(ExecutionStatus::Aborted), working)) => {
                drop(working);
                core.strip_experiment(&self.plan_name);
                RunOutcome::Aborted
            }
            Ok((Err(e), working)) => {
                drop(working);
                core.strip_experiment(&self.plan_name);
                RunOutcome::Failed(e)
            }
            // Worker panicked before sending: treat as failure, roll back.
            Err(_) => {
                core.strip_experiment(&self.plan_name);
                RunOutcome::Failed(StratumError::WorkerLost {
                    plan: self.plan_name.clone(),
                })
            }
        };

        tracing::info!(
            run = %self.id,
            core = %self.core_name,
            plan = %self.plan_name,
            outcome = outcome.label(),
            duration_ms = (Utc::now() - self.started_at).num_milliseconds(),
            "computation run finished"
        );
        outcome
    }

    fn release(&mut self) {
        if !self.released {
            self.active
                .lock()
                .expect("executor registry poisoned")
                .remove(&(self.core_name.clone(), self.plan_name.clone()));
            self.released = true;
        }
    }
}

impl Drop for RunHandle {
    /// An abandoned handle cancels its run and frees the `(core, plan)`
    /// slot. The real core was never written, and the working copy dies
    /// with the worker, so no rollback is needed.
    fn drop(&mut self) {
        if !self.released {
            self.cancel.cancel();
            self.release();
        }
    }
}
