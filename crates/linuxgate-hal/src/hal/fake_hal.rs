//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without touching the machine,
//! allowing the installer pipeline to run in CI without Windows, elevation or
//! real disks. Tool output is scripted per command with [`FakeHal::respond`]
//! and [`FakeHal::respond_once`].

use super::{copy_tree_native, CopyOps, CopyOptions, CopyReport, ImageOps, ProcessOps};
use crate::{HalError, HalResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Operation records for testing and verification.
#[derive(Debug, Clone)]
pub enum Operation {
    Command {
        program: String,
        args: Vec<String>,
        /// Contents of any script file passed as an argument, read at call time.
        script: Option<String>,
        timeout_secs: u64,
    },
    MountImage {
        image: PathBuf,
    },
    DismountImage {
        image: PathBuf,
    },
    CopyTree {
        src: PathBuf,
        dst: PathBuf,
    },
}

impl Operation {
    /// Program name and script text for command operations, for easy assertions.
    pub fn command_text(&self) -> Option<String> {
        match self {
            Operation::Command {
                program,
                args,
                script,
                ..
            } => Some(haystack(program, args, script.as_deref())),
            _ => None,
        }
    }
}

/// Scripted process result.
#[derive(Debug, Clone, Default)]
pub struct FakeResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl FakeResponse {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// How [`FakeHal::copy_tree`] behaves.
#[derive(Debug, Clone, Default)]
pub enum CopyBehavior {
    /// Really copy the tree with [`copy_tree_native`].
    #[default]
    Native,
    /// Return a HAL error.
    Fail(String),
    /// Return a report with a fixed exit code and file count.
    Report { exit_code: i32, files: u64 },
    /// Panic mid-copy.
    Panic,
}

#[derive(Debug, Clone)]
struct Scripted {
    pattern: String,
    response: FakeResponse,
    once: bool,
}

/// Shared state for FakeHal operations.
#[derive(Debug, Clone, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    scripted: Vec<Scripted>,
    mounted_images: HashSet<PathBuf>,
    mount_root: Option<PathBuf>,
    mount_error: Option<String>,
    copy_behavior: CopyBehavior,
}

/// Fake HAL implementation that records operations without executing them.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

fn haystack(program: &str, args: &[String], script: Option<&str>) -> String {
    let mut text = program.to_string();
    for arg in args {
        text.push(' ');
        text.push_str(arg);
    }
    if let Some(script) = script {
        text.push('\n');
        text.push_str(script);
    }
    text
}

#[cfg(unix)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw((code & 0xff) << 8)
}

#[cfg(windows)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeHalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Always answer commands whose program, arguments or script contain `pattern`.
    pub fn respond(&self, pattern: impl Into<String>, response: FakeResponse) {
        self.state().scripted.push(Scripted {
            pattern: pattern.into().to_lowercase(),
            response,
            once: false,
        });
    }

    /// Answer the next matching command only. One-shot responses are consumed in
    /// the order they were queued and take precedence over [`FakeHal::respond`].
    pub fn respond_once(&self, pattern: impl Into<String>, response: FakeResponse) {
        self.state().scripted.push(Scripted {
            pattern: pattern.into().to_lowercase(),
            response,
            once: true,
        });
    }

    /// Directory returned as the volume root of every mounted image.
    pub fn set_mount_root(&self, root: impl Into<PathBuf>) {
        self.state().mount_root = Some(root.into());
    }

    pub fn fail_mount(&self, detail: impl Into<String>) {
        self.state().mount_error = Some(detail.into());
    }

    pub fn set_copy_behavior(&self, behavior: CopyBehavior) {
        self.state().copy_behavior = behavior;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Program/argument/script text of every recorded command, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .operations
            .iter()
            .filter_map(Operation::command_text)
            .collect()
    }

    /// Count recorded operations matching `check`.
    pub fn count(&self, check: impl Fn(&Operation) -> bool) -> usize {
        self.state().operations.iter().filter(|op| check(op)).count()
    }

    pub fn is_mounted(&self, image: &Path) -> bool {
        self.state().mounted_images.contains(image)
    }

    fn record_operation(&self, op: Operation) {
        self.state().operations.push(op);
    }

    fn take_response(&self, text: &str) -> FakeResponse {
        let text = text.to_lowercase();
        let mut state = self.state();
        let once = state
            .scripted
            .iter()
            .position(|s| s.once && text.contains(&s.pattern));
        if let Some(idx) = once {
            return state.scripted.remove(idx).response;
        }
        state
            .scripted
            .iter()
            .find(|s| !s.once && text.contains(&s.pattern))
            .map(|s| s.response.clone())
            .unwrap_or_default()
    }
}

impl ProcessOps for FakeHal {
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        // Script files are deleted by their guards right after the call, so
        // capture the contents now.
        let script = args
            .iter()
            .map(Path::new)
            .filter(|p| p.is_file())
            .filter_map(|p| std::fs::read_to_string(p).ok())
            .reduce(|a, b| a + "\n" + &b);

        let text = haystack(program, &args, script.as_deref());
        log::info!("FAKE HAL: {}", text.lines().next().unwrap_or(program));
        self.record_operation(Operation::Command {
            program: program.to_string(),
            args,
            script,
            timeout_secs: timeout.as_secs(),
        });

        let response = self.take_response(&text);
        Ok(Output {
            status: exit_status(response.exit_code),
            stdout: response.stdout.into_bytes(),
            stderr: response.stderr.into_bytes(),
        })
    }
}

impl ImageOps for FakeHal {
    fn mount_image(&self, image: &Path, _timeout: Duration) -> HalResult<PathBuf> {
        log::info!("FAKE HAL: mount image {}", image.display());
        self.record_operation(Operation::MountImage {
            image: image.to_path_buf(),
        });

        let mut state = self.state();
        if let Some(detail) = state.mount_error.clone() {
            return Err(HalError::MountFailed {
                image: image.display().to_string(),
                detail,
            });
        }
        let root = state.mount_root.clone().ok_or_else(|| HalError::MountFailed {
            image: image.display().to_string(),
            detail: "no mount root configured".to_string(),
        })?;
        state.mounted_images.insert(image.to_path_buf());
        Ok(root)
    }

    fn dismount_image(&self, image: &Path, _timeout: Duration) -> HalResult<()> {
        log::info!("FAKE HAL: dismount image {}", image.display());
        self.record_operation(Operation::DismountImage {
            image: image.to_path_buf(),
        });
        self.state().mounted_images.remove(image);
        Ok(())
    }
}

impl CopyOps for FakeHal {
    fn copy_tree(
        &self,
        src: &Path,
        dst: &Path,
        opts: &CopyOptions,
        _timeout: Duration,
    ) -> HalResult<CopyReport> {
        log::info!("FAKE HAL: copy {} -> {}", src.display(), dst.display());
        self.record_operation(Operation::CopyTree {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });

        // Clone first so the lock is not held if this call panics.
        let behavior = self.state().copy_behavior.clone();
        match behavior {
            CopyBehavior::Native => {
                let files = copy_tree_native(src, dst, opts)?;
                Ok(CopyReport {
                    exit_code: Some(0),
                    files_copied: Some(files),
                    output: format!("{} File(s) copied", files),
                })
            }
            CopyBehavior::Fail(detail) => Err(HalError::CopyFailed(detail)),
            CopyBehavior::Report { exit_code, files } => Ok(CopyReport {
                exit_code: Some(exit_code),
                files_copied: Some(files),
                output: format!("{} File(s) copied", files),
            }),
            CopyBehavior::Panic => panic!("fake copy panicked"),
        }
    }
}
