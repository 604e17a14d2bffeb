//! Installation pipeline.
//!
//! One run walks the fixed step table in [`steps`]: reclaim space, create the
//! staging partition, fetch and stage the boot image, write the installer
//! configuration and register the boot entry. Only one run may be active per
//! pipeline; its progress is visible through [`InstallationPipeline::state`]
//! and streamed to a [`StatusSender`].

mod context;
mod report;
mod state;
mod steps;

#[cfg(test)]
mod tests;

pub use report::{InstallSummary, RunReport};
pub use state::PipelineState;
pub use steps::StepId;

use crate::preflight::LayoutGate;
use crate::stage_runner::StepRunner;
use crate::status::StatusSender;
use context::RunContext;
use linuxgate_core::plan::InstallationPlan;
use linuxgate_core::settings::Settings;
use linuxgate_error::PipelineError;
use linuxgate_hal::InstallerHal;
use state::{lock, RunGuard, SharedState};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Label shown in place of the step label once a required step has failed.
pub const ERROR_LABEL: &str = "Error occurred";

pub type DynHal = dyn InstallerHal;

pub enum StartOutcome {
    Started(JoinHandle<RunReport>),
    /// A run was already active; nothing was started.
    AlreadyRunning,
}

#[derive(Clone)]
pub struct InstallationPipeline {
    hal: Arc<DynHal>,
    settings: Arc<Settings>,
    state: SharedState,
}

impl InstallationPipeline {
    pub fn new(hal: Arc<DynHal>, settings: Settings) -> Self {
        Self {
            hal,
            settings: Arc::new(settings),
            state: SharedState::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Snapshot of the current (or last) run.
    pub fn state(&self) -> PipelineState {
        lock(&self.state).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).is_running
    }

    /// Front ends may only navigate back while nothing is running.
    pub fn can_go_back(&self) -> bool {
        !self.is_running()
    }

    fn begin(&self, gate: &LayoutGate) -> Result<RunGuard, PipelineError> {
        if !gate.can_proceed() {
            return Err(PipelineError::LayoutNotAcknowledged);
        }
        RunGuard::acquire(&self.state)
    }

    /// Run on the calling thread.
    pub fn run(
        &self,
        plan: &InstallationPlan,
        gate: &LayoutGate,
        status: &StatusSender,
    ) -> Result<RunReport, PipelineError> {
        let guard = self.begin(gate)?;
        Ok(self.execute(guard, plan, status))
    }

    /// Run on a dedicated worker thread. The running flag is taken before this
    /// returns, so a second call made right after sees `AlreadyRunning`.
    pub fn start(
        &self,
        plan: InstallationPlan,
        gate: &LayoutGate,
        status: StatusSender,
    ) -> Result<StartOutcome, PipelineError> {
        let guard = match self.begin(gate) {
            Ok(guard) => guard,
            Err(PipelineError::AlreadyRunning) => {
                log::warn!("installation already running; start ignored");
                return Ok(StartOutcome::AlreadyRunning);
            }
            Err(err) => return Err(err),
        };
        let pipeline = self.clone();
        let handle = thread::spawn(move || pipeline.execute(guard, &plan, &status));
        Ok(StartOutcome::Started(handle))
    }

    fn execute(&self, guard: RunGuard, plan: &InstallationPlan, status: &StatusSender) -> RunReport {
        log::info!(
            "🚀 installing {} ({} GB for Linux)",
            plan.selected_image.metadata_name,
            plan.requested_linux_size_gb
        );
        let runner = StepRunner::new(steps::table());
        let mut ctx = RunContext::new(
            self.hal.as_ref(),
            &self.settings,
            plan,
            status,
            &self.state,
            runner.len(),
        );
        let outcome = runner.run(&mut ctx);
        let summary = std::mem::take(&mut ctx.summary);
        // Drops the boot image guard if staging never got to clean it up.
        drop(ctx);

        let (failed_step, error) = match outcome.failure {
            Some(failure) => (Some(failure.key), Some(failure.error)),
            None => (None, None),
        };
        let final_percent = {
            let mut state = lock(&self.state);
            if let Some(err) = &error {
                state.percent = 0;
                state.last_error = Some(err.to_string());
            }
            state.percent
        };
        // Consumers may start again as soon as they see `Finished`.
        drop(guard);

        match (&failed_step, &error) {
            (Some(step), Some(err)) => {
                status.log(&format!("Error during {}: {}", step.label().to_lowercase(), err));
                status.progress(0, ERROR_LABEL);
                status.finished(false);
            }
            _ => {
                log::info!("✅ installation prepared");
                status.finished(true);
            }
        }

        RunReport {
            steps: outcome.records,
            final_percent,
            failed_step,
            error,
            summary,
        }
    }
}
