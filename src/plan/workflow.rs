//! Computation plans and the workflows that realize them.
//!
//! A plan names a workflow; a workflow is an ordered chain of steps. Each
//! step reads attributes through full sample resolution and writes only
//! into the layer being built for the active plan. Steps are pure per
//! sample: a sample whose inputs are undefined is skipped, which is how a
//! committed run can apply to only part of a core.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};
use crate::model::{Value, WorkingCore, WorkingSample};
use crate::plan::executor::CancelToken;

/// Named plan binding a workflow to user-facing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationPlan {
    pub name: String,
    /// Name of the workflow this plan runs.
    pub workflow: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ComputationPlan {
    pub fn new(name: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workflow: workflow.into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Error raised inside a workflow step. The workflow wraps it with plan and
/// step context before it reaches the executor.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StepError(pub String);

/// One transform in a workflow chain.
pub trait WorkflowStep: Send + Sync {
    fn name(&self) -> &str;

    /// Apply the transform to one working sample. Reads resolve through the
    /// pending layer first, then the sample's full layer stack; writes go
    /// into the pending layer only.
    fn apply(&self, sample: &mut WorkingSample) -> std::result::Result<(), StepError>;
}

/// How a workflow run ended, from the workflow's own point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Every step ran on every sample.
    Completed,
    /// The cancellation signal was observed between steps; no further
    /// writes were issued.
    Aborted,
}

/// Ordered chain of steps producing one plan layer.
pub struct Workflow {
    name: String,
    steps: Vec<Box<dyn WorkflowStep>>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, step: Box<dyn WorkflowStep>) {
        self.steps.push(step);
    }

    pub fn with_step(mut self, step: Box<dyn WorkflowStep>) -> Self {
        self.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step over every sample of the working copy.
    ///
    /// The cancellation token is checked before each step application —
    /// cooperative, never preemptive mid-step. A step error aborts the run
    /// with a `ComputationFailed` carrying the step context; the caller is
    /// responsible for rollback either way.
    pub fn execute(
        &self,
        working: &mut WorkingCore,
        cancel: &CancelToken,
    ) -> Result<ExecutionStatus> {
        let plan = working.plan().to_string();
        for depth in working.depths() {
            let sample = working
                .sample_mut(depth)
                .expect("depth list comes from the working copy itself");
            for step in &self.steps {
                if cancel.is_cancelled() {
                    return Ok(ExecutionStatus::Aborted);
                }
                step.apply(sample)
                    .map_err(|e| StratumError::ComputationFailed {
                        plan: plan.clone(),
                        step: step.name().to_string(),
                        reason: e.to_string(),
                        source: Some(Box::new(e)),
                    })?;
            }
        }
        Ok(ExecutionStatus::Completed)
    }
}

/// Arithmetic applied by a [`StepDef::Derive`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeriveOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Serializable step definition; workflows persist as a list of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDef {
    /// `target = source <op> operand` where `source` is defined and numeric;
    /// samples without `source` are skipped.
    Derive {
        target: String,
        source: String,
        op: DeriveOp,
        operand: f64,
    },
    /// Write a fixed value on every sample.
    Constant { target: String, value: Value },
    /// Copy `source` into `target` where `source` is defined.
    Rename { target: String, source: String },
}

impl StepDef {
    fn into_step(self) -> Box<dyn WorkflowStep> {
        match self {
            StepDef::Derive {
                target,
                source,
                op,
                operand,
            } => Box::new(DeriveStep {
                name: format!("derive {}", target),
                target,
                source,
                op,
                operand,
            }),
            StepDef::Constant { target, value } => Box::new(ConstantStep {
                name: format!("constant {}", target),
                target,
                value,
            }),
            StepDef::Rename { target, source } => Box::new(RenameStep {
                name: format!("rename {} -> {}", source, target),
                target,
                source,
            }),
        }
    }
}

/// Persisted form of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    pub steps: Vec<StepDef>,
}

impl WorkflowDef {
    pub fn new(name: impl Into<String>, steps: Vec<StepDef>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Instantiate the runnable chain.
    pub fn build(&self) -> Workflow {
        let mut workflow = Workflow::new(self.name.clone());
        for def in self.steps.iter().cloned() {
            workflow.push(def.into_step());
        }
        workflow
    }
}

struct DeriveStep {
    name: String,
    target: String,
    source: String,
    op: DeriveOp,
    operand: f64,
}

impl WorkflowStep for DeriveStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, sample: &mut WorkingSample) -> std::result::Result<(), StepError> {
        let value = match sample.get(&self.source) {
            Some(v) => v.clone(),
            None => return Ok(()), // undefined input: skip this sample
        };
        let input = value.as_f64().ok_or_else(|| {
            StepError(format!("attribute '{}' is not numeric", self.source))
        })?;
        let result = match self.op {
            DeriveOp::Add => input + self.operand,
            DeriveOp::Sub => input - self.operand,
            DeriveOp::Mul => input * self.operand,
            DeriveOp::Div => {
                if self.operand == 0.0 {
                    return Err(StepError("division by zero".to_string()));
                }
                input / self.operand
            }
        };
        sample.set(&self.target, Value::Float(result));
        Ok(())
    }
}

struct ConstantStep {
    name: String,
    target: String,
    value: Value,
}

impl WorkflowStep for ConstantStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, sample: &mut WorkingSample) -> std::result::Result<(), StepError> {
        sample.set(&self.target, self.value.clone());
        Ok(())
    }
}

struct RenameStep {
    name: String,
    target: String,
    source: String,
}

impl WorkflowStep for RenameStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, sample: &mut WorkingSample) -> std::result::Result<(), StepError> {
        if let Some(value) = sample.get(&self.source).cloned() {
            sample.set(&self.target, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::model::{Core, Depth, Sample};
    use std::collections::BTreeMap;

    fn core() -> Core {
        let mut core = Core::new("X");
        for (depth, temp) in [(10.0, Some(5.0)), (20.0, None), (30.0, Some(7.0))] {
            let mut input = BTreeMap::new();
            input.insert("depth".to_string(), Value::Float(depth));
            if let Some(t) = temp {
                input.insert("temp".to_string(), Value::Float(t));
            }
            core.add(Sample::new(input)).unwrap();
        }
        core
    }

    fn calib_workflow() -> Workflow {
        WorkflowDef::new(
            "calibration",
            vec![StepDef::Derive {
                target: "temp_calibrated".to_string(),
                source: "temp".to_string(),
                op: DeriveOp::Add,
                operand: 1.0,
            }],
        )
        .build()
    }

    #[test]
    fn test_derive_skips_undefined_sources() {
        let core = core();
        let mut working = core.new_computation("calib");
        let status = calib_workflow()
            .execute(&mut working, &CancelToken::new())
            .unwrap();

        assert_eq!(status, ExecutionStatus::Completed);
        assert!(working.sample_mut(Depth(10.0)).unwrap().has_writes());
        assert!(!working.sample_mut(Depth(20.0)).unwrap().has_writes());
        assert!(working.sample_mut(Depth(30.0)).unwrap().has_writes());
        assert_eq!(
            working.sample_mut(Depth(10.0)).unwrap().get("temp_calibrated"),
            Some(&Value::Float(6.0))
        );
    }

    #[test]
    fn test_division_by_zero_fails_the_step() {
        let core = core();
        let mut working = core.new_computation("calib");
        let workflow = WorkflowDef::new(
            "bad",
            vec![StepDef::Derive {
                target: "x".to_string(),
                source: "temp".to_string(),
                op: DeriveOp::Div,
                operand: 0.0,
            }],
        )
        .build();

        let err = workflow
            .execute(&mut working, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.error_code(), "COMPUTATION_FAILED");
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_non_numeric_source_fails_the_step() {
        let mut core = Core::new("X");
        let mut input = BTreeMap::new();
        input.insert("depth".to_string(), Value::Float(1.0));
        input.insert("label".to_string(), Value::Text("granite".to_string()));
        core.add(Sample::new(input)).unwrap();

        let mut working = core.new_computation("calib");
        let workflow = WorkflowDef::new(
            "bad",
            vec![StepDef::Derive {
                target: "x".to_string(),
                source: "label".to_string(),
                op: DeriveOp::Mul,
                operand: 2.0,
            }],
        )
        .build();

        let err = workflow
            .execute(&mut working, &CancelToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("not numeric"));
    }

    #[test]
    fn test_cancelled_token_aborts_before_any_write() {
        let core = core();
        let mut working = core.new_computation("calib");
        let cancel = CancelToken::new();
        cancel.cancel();

        let status = calib_workflow().execute(&mut working, &cancel).unwrap();
        assert_eq!(status, ExecutionStatus::Aborted);
        assert_eq!(working.affected(), 0);
    }

    #[test]
    fn test_steps_see_earlier_writes_in_same_run() {
        let core = core();
        let mut working = core.new_computation("calib");
        let workflow = WorkflowDef::new(
            "chained",
            vec![
                StepDef::Derive {
                    target: "a".to_string(),
                    source: "temp".to_string(),
                    op: DeriveOp::Add,
                    operand: 1.0,
                },
                StepDef::Derive {
                    target: "b".to_string(),
                    source: "a".to_string(),
                    op: DeriveOp::Mul,
                    operand: 2.0,
                },
            ],
        )
        .build();

        workflow.execute(&mut working, &CancelToken::new()).unwrap();
        let derived = working
            .sample_mut(Depth(10.0))
            .unwrap()
            .get("b")
            .and_then(Value::as_f64)
            .unwrap();
        assert_relative_eq!(derived, 12.0);
    }

    #[test]
    fn test_workflow_def_round_trips_through_json() {
        let def = WorkflowDef::new(
            "calibration",
            vec![
                StepDef::Derive {
                    target: "temp_calibrated".to_string(),
                    source: "temp".to_string(),
                    op: DeriveOp::Add,
                    operand: 1.0,
                },
                StepDef::Constant {
                    target: "calibrated_by".to_string(),
                    value: Value::Text("v2 bench".to_string()),
                },
            ],
        );
        let json = serde_json::to_string(&def).unwrap();
        let back: WorkflowDef = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
        assert_eq!(back.build().len(), 2);
    }
}
