//! Real HAL backed by Windows tooling.
//!
//! Images are attached with the PowerShell storage cmdlets and copied with
//! `xcopy`; everything else is a plain process call with a timeout.

use super::{CopyOps, CopyOptions, CopyReport, ImageOps, ProcessOps, TempFileGuard};
use crate::process_timeout::output_with_timeout;
use crate::{HalError, HalResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WindowsHal {
    powershell: String,
    xcopy: String,
    script_dir: PathBuf,
}

impl Default for WindowsHal {
    fn default() -> Self {
        Self::new("powershell.exe", "xcopy.exe", std::env::temp_dir())
    }
}

/// Quote a path for a single-quoted PowerShell string literal.
fn ps_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "''"))
}

fn mount_script(image: &Path) -> String {
    format!(
        "$ErrorActionPreference = 'Stop'\r\n\
         $image = Mount-DiskImage -ImagePath {} -PassThru\r\n\
         $volume = $image | Get-Volume\r\n\
         Write-Output $volume.DriveLetter\r\n",
        ps_quote(image)
    )
}

/// First non-empty stdout line, which must be a single drive letter.
fn parse_drive_letter(stdout: &str) -> Option<char> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
        _ => None,
    }
}

impl WindowsHal {
    pub fn new(
        powershell: impl Into<String>,
        xcopy: impl Into<String>,
        script_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            powershell: powershell.into(),
            xcopy: xcopy.into(),
            script_dir: script_dir.into(),
        }
    }

    fn run_powershell_script(&self, body: &str, timeout: Duration) -> HalResult<Output> {
        let path = self
            .script_dir
            .join(format!("linuxgate_{}.ps1", uuid::Uuid::new_v4().simple()));
        fs::write(&path, body)?;
        let guard = TempFileGuard::new(&path);
        let script = guard.path().to_string_lossy().to_string();
        self.command_output(
            &self.powershell,
            &[
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-File",
                &script,
            ],
            timeout,
        )
    }
}

impl ProcessOps for WindowsHal {
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output> {
        log::debug!("exec: {} {}", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args);
        output_with_timeout(program, &mut cmd, timeout)
    }
}

impl ImageOps for WindowsHal {
    fn mount_image(&self, image: &Path, timeout: Duration) -> HalResult<PathBuf> {
        let out = self.run_powershell_script(&mount_script(image), timeout)?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        let failed = |detail: String| HalError::MountFailed {
            image: image.display().to_string(),
            detail,
        };
        if !out.status.success() {
            return Err(failed(String::from_utf8_lossy(&out.stderr).trim().to_string()));
        }
        let letter = parse_drive_letter(&stdout)
            .ok_or_else(|| failed(format!("no drive letter in output: {}", stdout.trim())))?;
        Ok(PathBuf::from(format!("{}:\\", letter)))
    }

    fn dismount_image(&self, image: &Path, timeout: Duration) -> HalResult<()> {
        let command = format!("Dismount-DiskImage -ImagePath {}", ps_quote(image));
        let out = self.command_output(
            &self.powershell,
            &["-NoProfile", "-NonInteractive", "-Command", &command],
            timeout,
        )?;
        if out.status.success() {
            Ok(())
        } else {
            Err(HalError::DismountFailed {
                image: image.display().to_string(),
                detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            })
        }
    }
}

impl CopyOps for WindowsHal {
    fn copy_tree(
        &self,
        src: &Path,
        dst: &Path,
        opts: &CopyOptions,
        timeout: Duration,
    ) -> HalResult<CopyReport> {
        let source = src.join("*").to_string_lossy().to_string();
        let target = dst.to_string_lossy().to_string();
        let mut args = vec![source.as_str(), target.as_str(), "/E", "/Q", "/I"];
        if opts.overwrite {
            args.push("/Y");
        }
        if opts.include_hidden {
            args.push("/H");
        }
        let out = self.command_output(&self.xcopy, &args, timeout)?;
        let mut output = String::from_utf8_lossy(&out.stdout).to_string();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.trim().is_empty() {
            output.push('\n');
            output.push_str(stderr.trim());
        }
        Ok(CopyReport {
            exit_code: out.status.code(),
            files_copied: None,
            output,
        })
    }
}
