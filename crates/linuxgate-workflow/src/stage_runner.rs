//! Ordered step execution with a failure policy per step.
//!
//! Steps run strictly one after another. A `Required` step that fails ends
//! the run; a `BestEffort` step that fails is recorded as degraded and the
//! next step runs.

use std::fmt::{Debug, Display};

pub type StepFn<'a, C, E> = Box<dyn Fn(&mut C) -> Result<StepStatus, E> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    Required,
    BestEffort,
}

/// What a step reports when it returns normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Skipped(String),
    Degraded(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    Degraded(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

impl From<StepStatus> for StepOutcome {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::Completed => StepOutcome::Completed,
            StepStatus::Skipped(reason) => StepOutcome::Skipped(reason),
            StepStatus::Degraded(warning) => StepOutcome::Degraded(warning),
        }
    }
}

pub struct StepDefinition<'a, K, C, E> {
    pub key: K,
    pub policy: StepPolicy,
    pub run: StepFn<'a, C, E>,
}

/// Progress bookkeeping the runner drives while it walks the steps.
pub trait WorkflowState<K> {
    fn set_current(&mut self, index: usize, key: K);
    fn mark_finished(&mut self, index: usize, key: K, outcome: &StepOutcome);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord<K> {
    pub key: K,
    pub policy: StepPolicy,
    pub outcome: StepOutcome,
}

/// The required step that ended a run.
#[derive(Debug)]
pub struct StepFailure<K, E> {
    pub index: usize,
    pub key: K,
    pub error: E,
}

#[derive(Debug)]
pub struct RunSummary<K, E> {
    pub records: Vec<StepRecord<K>>,
    pub failure: Option<StepFailure<K, E>>,
}

impl<K, E> RunSummary<K, E> {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct StepRunner<'a, K, C, E> {
    steps: Vec<StepDefinition<'a, K, C, E>>,
}

impl<'a, K, C, E> StepRunner<'a, K, C, E>
where
    K: Copy + Debug,
    C: WorkflowState<K>,
    E: Display,
{
    pub fn new(steps: Vec<StepDefinition<'a, K, C, E>>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.steps.iter().map(|s| s.key)
    }

    pub fn run(&self, state: &mut C) -> RunSummary<K, E> {
        let mut records = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            state.set_current(index, step.key);
            log::debug!("step {}/{}: {:?}", index + 1, self.steps.len(), step.key);

            let outcome = match ((step.run)(state), step.policy) {
                (Ok(status), _) => StepOutcome::from(status),
                (Err(err), StepPolicy::BestEffort) => {
                    log::warn!("best-effort step {:?} failed: {}", step.key, err);
                    StepOutcome::Degraded(err.to_string())
                }
                (Err(err), StepPolicy::Required) => {
                    log::error!("step {:?} failed: {}", step.key, err);
                    let outcome = StepOutcome::Failed(err.to_string());
                    state.mark_finished(index, step.key, &outcome);
                    records.push(StepRecord {
                        key: step.key,
                        policy: step.policy,
                        outcome,
                    });
                    return RunSummary {
                        records,
                        failure: Some(StepFailure {
                            index,
                            key: step.key,
                            error: err,
                        }),
                    };
                }
            };

            state.mark_finished(index, step.key, &outcome);
            records.push(StepRecord {
                key: step.key,
                policy: step.policy,
                outcome,
            });
        }

        RunSummary {
            records,
            failure: None,
        }
    }
}
