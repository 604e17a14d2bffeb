//! Scripted `diskpart` invocations.
//!
//! Every operation writes a one-off script file, runs `diskpart /s <file>` and
//! removes the file again, whatever the outcome.

use crate::parser::{self, Outcome, PartitionKind, PartitionRecord, PhraseSet};
use crate::settings::Settings;
use crate::sink::LogSink;
use linuxgate_error::{InstallError, InstallResult};
use linuxgate_hal::{ProcessOps, TempFileGuard};
use std::fs;

/// A diskpart script under construction.
#[derive(Debug, Clone)]
pub struct DiskScript {
    name: &'static str,
    lines: Vec<String>,
}

impl DiskScript {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lines: Vec::new(),
        }
    }

    /// Refresh diskpart's view of the disks. Must come before any selection
    /// that depends on a previous script's changes.
    pub fn rescan(self) -> Self {
        self.line("rescan")
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn render(&self) -> String {
        let mut text = self.lines.join("\r\n");
        text.push_str("\r\nexit\r\n");
        text
    }
}

/// Captured result of one diskpart run.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn text(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Outcome phrases decide; the exit status only breaks a tie.
    pub fn succeeded(&self, phrases: &PhraseSet) -> bool {
        match parser::detect_outcome(&self.text(), phrases) {
            Outcome::Success => true,
            Outcome::Failure => false,
            Outcome::Unknown => self.exit_code == Some(0),
        }
    }
}

/// Unallocated region directly after the Windows partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeSpace {
    pub start_mb: f64,
    pub end_mb: f64,
}

impl FreeSpace {
    pub fn size_mb(&self) -> f64 {
        (self.end_mb - self.start_mb).max(0.0)
    }
}

/// Locate the free region in a sorted partition snapshot.
///
/// The Windows partition is the largest data partition before the last record
/// (the second record when none is classified). The region runs from its end
/// to the start of the partition that follows it.
pub fn free_space_between(records: &[PartitionRecord]) -> InstallResult<FreeSpace> {
    if records.len() < 2 {
        return Err(InstallError::ParseMismatch {
            expected: "at least 2 partitions".to_string(),
            found: records.len().to_string(),
        });
    }
    let fallback = if records.len() > 2 { 1 } else { 0 };
    let windows_idx = records[..records.len() - 1]
        .iter()
        .enumerate()
        .filter(|(_, r)| r.kind == PartitionKind::Data)
        .max_by(|(_, a), (_, b)| a.size_mb.total_cmp(&b.size_mb))
        .map(|(i, _)| i)
        .unwrap_or(fallback);
    let windows = &records[windows_idx];
    let next = &records[windows_idx + 1];
    Ok(FreeSpace {
        start_mb: windows.end_mb(),
        end_mb: next.offset_mb.max(windows.end_mb()),
    })
}

pub struct PartitionBuilder<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    settings: &'a Settings,
    sink: &'a dyn LogSink,
}

impl<'a, H: ProcessOps + ?Sized> PartitionBuilder<'a, H> {
    pub fn new(hal: &'a H, settings: &'a Settings, sink: &'a dyn LogSink) -> Self {
        Self {
            hal,
            settings,
            sink,
        }
    }

    /// Run a script and return its output without judging it.
    pub fn run_script(&self, script: &DiskScript) -> InstallResult<ScriptOutput> {
        let dir = self.settings.temp_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "linuxgate_{}_{}.txt",
            script.name(),
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&path, script.render())?;
        let guard = TempFileGuard::new(&path);

        let script_arg = guard.path().to_string_lossy().to_string();
        log::debug!("diskpart script {}:\n{}", script.name(), script.render());
        let out = self.hal.command_output(
            &self.settings.tools.diskpart,
            &["/s", &script_arg],
            self.settings.tools.process_timeout(),
        )?;
        Ok(ScriptOutput {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        })
    }

    /// Run a script and judge it with the phrases of the operation it performs.
    fn run_checked(
        &self,
        script: &DiskScript,
        phrases: &PhraseSet,
    ) -> InstallResult<ScriptOutput> {
        let output = self.run_script(script)?;
        let text = output.text();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.sink.line(&format!("  diskpart: {}", line));
        }
        if output.succeeded(phrases) {
            Ok(output)
        } else {
            Err(InstallError::ToolInvocationFailed {
                tool: format!("diskpart ({})", script.name()),
                detail: format!("exit={:?}: {}", output.exit_code, text.trim()),
            })
        }
    }

    /// Raw answer of `shrink querymax` for `volume`.
    pub fn query_max(&self, volume: char) -> InstallResult<String> {
        let script = DiskScript::new("querymax")
            .rescan()
            .line(format!("select volume {}", volume))
            .line("shrink querymax");
        Ok(self.run_script(&script)?.text())
    }

    pub fn shrink(&self, volume: char, mb: f64) -> InstallResult<()> {
        let script = DiskScript::new("shrink")
            .rescan()
            .line("list volume")
            .line(format!("select volume {}", volume))
            .line(format!("shrink desired={:.0}", mb.floor()));
        self.sink
            .line(&format!("Shrinking volume {} by {:.0} MB", volume, mb.floor()));
        self.run_checked(&script, &PhraseSet::SHRINK)?;
        Ok(())
    }

    /// Create, format and letter the staging partition in the space freed by the first shrink.
    pub fn create_staging_partition(&self) -> InstallResult<()> {
        let disk = &self.settings.disk;
        let script = DiskScript::new("create_staging")
            .rescan()
            .line(format!("select disk {}", disk.disk_number))
            .line(format!("create partition primary size={}", disk.staging_size_mb))
            .line(format!("format fs=fat32 quick label={}", disk.staging_label))
            .line(format!("assign letter={}", disk.staging_letter));
        self.sink.line(&format!(
            "Creating {} MB FAT32 partition {} ({}:)",
            disk.staging_size_mb, disk.staging_label, disk.staging_letter
        ));
        self.run_checked(&script, &PhraseSet::CREATE)?;
        Ok(())
    }

    pub fn list_partitions(&self) -> InstallResult<Vec<PartitionRecord>> {
        let script = DiskScript::new("list_partition")
            .rescan()
            .line(format!("select disk {}", self.settings.disk.disk_number))
            .line("list partition");
        let output = self.run_script(&script)?;
        if output.exit_code != Some(0)
            && parser::detect_outcome(&output.text(), &PhraseSet::QUERY) == Outcome::Failure
        {
            return Err(InstallError::ToolInvocationFailed {
                tool: "diskpart (list_partition)".to_string(),
                detail: output.text().trim().to_string(),
            });
        }
        Ok(parser::parse_partitions(&output.stdout))
    }
}
