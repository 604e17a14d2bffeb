use super::report::InstallSummary;
use super::state::{lock, PipelineState};
use super::steps::StepId;
use super::DynHal;
use crate::stage_runner::{StepOutcome, WorkflowState};
use crate::status::StatusSender;
use linuxgate_core::diskpart::PartitionBuilder;
use linuxgate_core::downloader::{DownloadOptions, ResumableDownloader};
use linuxgate_core::plan::InstallationPlan;
use linuxgate_core::planner::ShrinkPolicy;
use linuxgate_core::settings::Settings;
use linuxgate_core::LogSink;
use linuxgate_hal::TempFileGuard;
use std::sync::Mutex;

/// Everything a step can touch during one run.
pub(crate) struct RunContext<'a> {
    pub hal: &'a DynHal,
    pub settings: &'a Settings,
    pub plan: &'a InstallationPlan,
    pub status: &'a StatusSender,
    state: &'a Mutex<PipelineState>,
    step_count: usize,
    /// Downloaded boot image; dropping the context deletes it.
    pub boot_image: Option<TempFileGuard>,
    pub summary: InstallSummary,
}

impl<'a> RunContext<'a> {
    pub fn new(
        hal: &'a DynHal,
        settings: &'a Settings,
        plan: &'a InstallationPlan,
        status: &'a StatusSender,
        state: &'a Mutex<PipelineState>,
        step_count: usize,
    ) -> Self {
        Self {
            hal,
            settings,
            plan,
            status,
            state,
            step_count,
            boot_image: None,
            summary: InstallSummary::default(),
        }
    }

    pub fn sink(&self) -> &'a dyn LogSink {
        self.status
    }

    pub fn log(&self, line: &str) {
        self.status.log(line);
    }

    /// Report progress. The percentage never moves backwards during a run.
    pub fn progress(&self, percent: u8, label: &str) {
        let percent = {
            let mut state = lock(self.state);
            state.percent = state.percent.max(percent.min(100));
            state.percent
        };
        self.status.progress(percent, label);
    }

    pub fn builder(&self) -> PartitionBuilder<'a, DynHal> {
        PartitionBuilder::new(self.hal, self.settings, self.sink())
    }

    pub fn policy(&self) -> ShrinkPolicy {
        ShrinkPolicy::from_settings(&self.settings.disk)
    }

    pub fn downloader(&self) -> ResumableDownloader {
        ResumableDownloader::new(DownloadOptions::from_settings(&self.settings.downloads))
    }
}

impl WorkflowState<StepId> for RunContext<'_> {
    fn set_current(&mut self, index: usize, key: StepId) {
        lock(self.state).current_step_index = index;
        log::info!("▶ step {}/{}: {}", index + 1, self.step_count, key.name());
        if let Some(mark) = key.progress_mark() {
            self.progress(mark, key.label());
        }
    }

    fn mark_finished(&mut self, _index: usize, key: StepId, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Skipped(reason) => {
                self.log(&format!("Skipped: {} ({})", key.label(), reason))
            }
            StepOutcome::Degraded(warning) => self.log(&format!(
                "Warning: {} did not complete: {}. Continuing.",
                key.label(),
                warning
            )),
            StepOutcome::Completed | StepOutcome::Failed(_) => {}
        }
    }
}
