use super::steps::StepId;
use crate::stage_runner::{StepOutcome, StepRecord};
use linuxgate_core::bootcfg::BootEntry;
use linuxgate_core::downloader::format_bytes;
use linuxgate_error::InstallError;
use std::path::PathBuf;

/// Facts gathered by the steps that did run.
#[derive(Debug, Clone, Default)]
pub struct InstallSummary {
    pub available_mb: Option<f64>,
    pub phase1_mb: Option<f64>,
    pub phase2_mb: Option<f64>,
    pub boot_image_bytes: Option<u64>,
    pub files_staged: Option<u64>,
    pub installer_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub bootloader_files: Vec<PathBuf>,
    pub boot_entry: Option<BootEntry>,
}

impl InstallSummary {
    /// Human-readable recap logged when the run completes.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["Summary:".to_string()];
        let reserved = self.phase1_mb.unwrap_or(0.0) + self.phase2_mb.unwrap_or(0.0);
        lines.push(format!(
            "  Space taken from Windows: {:.0} MB ({:.0} MB boot partition)",
            reserved,
            self.phase1_mb.unwrap_or(0.0)
        ));
        if self.phase2_mb.is_none() {
            lines.push("  The Linux installer will finish resizing Windows".to_string());
        }
        if let Some(bytes) = self.boot_image_bytes {
            lines.push(format!("  Boot image: {}", format_bytes(bytes)));
        }
        if let Some(files) = self.files_staged {
            lines.push(format!("  Files on the boot partition: {}", files));
        }
        match &self.installer_path {
            Some(path) => lines.push(format!("  Installer image: {}", path.display())),
            None => lines.push("  Installer image: not downloaded".to_string()),
        }
        if let Some(path) = &self.config_path {
            lines.push(format!("  Installer configuration: {}", path.display()));
        }
        if let Some(entry) = &self.boot_entry {
            lines.push(format!("  Boot entry: {}", entry.identifier));
        }
        lines.push("Restart the computer and pick \"Install Linux\" in the boot menu.".to_string());
        lines
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub steps: Vec<StepRecord<StepId>>,
    pub final_percent: u8,
    /// Step that ended the run, if one did.
    pub failed_step: Option<StepId>,
    pub error: Option<InstallError>,
    pub summary: InstallSummary,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn outcome(&self, step: StepId) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.key == step)
            .map(|r| &r.outcome)
    }

    /// Best-effort steps that failed, with their warnings.
    pub fn degraded(&self) -> impl Iterator<Item = (StepId, &str)> + '_ {
        self.steps.iter().filter_map(|r| match &r.outcome {
            StepOutcome::Degraded(warning) => Some((r.key, warning.as_str())),
            _ => None,
        })
    }
}
