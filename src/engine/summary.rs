// src/engine/summary.rs

//! Per-plan outcome of a finished batch.

use std::fmt;

use crate::exec::BatchReport;
use crate::plan::{Commit, Pipeline, Stage, StageOutput};

/// The stage that broke a plan's pipeline, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    pub plan: String,
    /// The deployed commit, or the first stage that failed.
    pub result: Result<Commit, StageFailure>,
}

impl PlanOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of every pipeline in one batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub outcomes: Vec<PlanOutcome>,
}

impl BatchSummary {
    pub fn from_report(pipelines: &[Pipeline], report: &BatchReport<StageOutput>) -> Self {
        let outcomes = pipelines
            .iter()
            .map(|pipeline| PlanOutcome {
                plan: pipeline.plan.clone(),
                result: pipeline_result(pipeline, report),
            })
            .collect();
        Self { outcomes }
    }

    pub fn outcome(&self, plan: &str) -> Option<&PlanOutcome> {
        self.outcomes.iter().find(|o| o.plan == plan)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

fn pipeline_result(
    pipeline: &Pipeline,
    report: &BatchReport<StageOutput>,
) -> Result<Commit, StageFailure> {
    // Later stages only ever fail with UpstreamFailed, so the first error
    // in stage order is the root cause.
    for (stage, id) in pipeline.stages() {
        if let Err(e) = report.result(id) {
            return Err(StageFailure {
                stage,
                message: e.to_string(),
            });
        }
    }

    match report.result(pipeline.checkout) {
        Ok(StageOutput::CheckedOut(commit)) => Ok(commit.clone()),
        Ok(other) => Err(StageFailure {
            stage: Stage::Checkout,
            message: format!("unexpected checkout output {other:?}"),
        }),
        Err(e) => Err(StageFailure {
            stage: Stage::Checkout,
            message: e.to_string(),
        }),
    }
}
