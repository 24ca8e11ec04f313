//! Computation plans, workflows, and the executor that runs them.

pub mod executor;
pub mod workflow;

pub use executor::{CancelToken, Executor, RunHandle, RunOutcome};
pub use workflow::{
    ComputationPlan, DeriveOp, ExecutionStatus, StepDef, StepError, Workflow, WorkflowDef,
    WorkflowStep,
};
