//! Process execution helpers.
//!
//! External commands are considered "world-touching" and must go through the HAL so we can
//! test workflows without spawning real processes.

use crate::HalResult;
use std::process::Output;
use std::time::Duration;

/// Process execution trait (external command runner).
pub trait ProcessOps {
    /// Run `program` to completion and capture both output streams.
    ///
    /// A non-zero exit is not an error at this level; callers decide what the
    /// status and the captured text mean.
    fn command_output(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<Output>;

    /// Run `program` and fail unless it exits successfully.
    fn command_status(&self, program: &str, args: &[&str], timeout: Duration) -> HalResult<()> {
        let out = self.command_output(program, args, timeout)?;
        if out.status.success() {
            Ok(())
        } else {
            Err(crate::HalError::CommandFailed {
                program: program.to_string(),
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            })
        }
    }
}
