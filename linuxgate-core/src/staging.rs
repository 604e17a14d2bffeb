//! Copy a boot image's contents onto the staging partition.

use crate::parser;
use crate::settings::Settings;
use crate::sink::LogSink;
use linuxgate_error::{InstallError, InstallResult};
use linuxgate_hal::{CopyOps, CopyOptions, ImageMountGuard, ImageOps};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StageReport {
    pub source_root: PathBuf,
    pub files_copied: u64,
    pub exit_code: Option<i32>,
}

pub struct IsoStager<'a, H: ImageOps + CopyOps + ?Sized> {
    hal: &'a H,
    sink: &'a dyn LogSink,
    settle: Duration,
    timeout: Duration,
}

impl<'a, H: ImageOps + CopyOps + ?Sized> IsoStager<'a, H> {
    pub fn new(hal: &'a H, settings: &Settings, sink: &'a dyn LogSink) -> Self {
        Self {
            hal,
            sink,
            settle: settings.delays.mount_settle(),
            timeout: settings.tools.copy_timeout(),
        }
    }

    /// Mount `image`, copy its whole tree into `destination_root`, dismount.
    ///
    /// The dismount is attempted exactly once however this returns, including
    /// when the mount itself fails half way.
    pub fn stage_contents(
        &self,
        image: &Path,
        destination_root: &Path,
    ) -> InstallResult<StageReport> {
        let _mounted = ImageMountGuard::new(self.hal, image, self.timeout);
        let source_root = self
            .hal
            .mount_image(image, self.timeout)
            .map_err(|e| InstallError::StagingFailed(format!("mount failed: {}", e)))?;
        self.sink.line(&format!(
            "Mounted {} at {}",
            image.display(),
            source_root.display()
        ));
        thread::sleep(self.settle);

        self.sink.line(&format!(
            "Copying {} to {}",
            source_root.display(),
            destination_root.display()
        ));
        let report = self
            .hal
            .copy_tree(
                &source_root,
                destination_root,
                &CopyOptions::staging(),
                self.timeout,
            )
            .map_err(|e| InstallError::StagingFailed(format!("copy failed: {}", e)))?;

        let files_copied = report
            .files_copied
            .or_else(|| parser::extract_copied_file_count(&report.output))
            .unwrap_or(0);
        if !report.succeeded() {
            if files_copied == 0 {
                return Err(InstallError::StagingFailed(format!(
                    "copy exited with {:?} and copied nothing: {}",
                    report.exit_code,
                    report.output.trim()
                )));
            }
            self.sink.line(&format!(
                "Warning: copy exited with {:?} after {} files; continuing",
                report.exit_code, files_copied
            ));
        }
        self.sink
            .line(&format!("Copied {} files to the staging partition", files_copied));

        Ok(StageReport {
            source_root,
            files_copied,
            exit_code: report.exit_code,
        })
    }
}
