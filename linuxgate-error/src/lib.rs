use std::io;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;
pub type InstallResult<T> = Result<T, InstallError>;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("Image mount failed for {image}: {detail}")]
    MountFailed { image: String, detail: String },

    #[error("Image dismount failed for {image}: {detail}")]
    DismountFailed { image: String, detail: String },

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Not enough free space: {available_mb:.0} MB available, {required_mb:.0} MB required")]
    InsufficientSpace { available_mb: f64, required_mb: f64 },

    #[error("{tool} failed: {detail}")]
    ToolInvocationFailed { tool: String, detail: String },

    #[error("Boot entry identifier not found in output: {output}")]
    IdentifierNotFound { output: String },

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Staging failed: {0}")]
    StagingFailed(String),

    #[error("Unexpected disk layout: expected {expected}, found {found}")]
    ParseMismatch { expected: String, found: String },

    #[error("The selected distribution has no boot image URL")]
    MissingImageUrl,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing --yes-i-know flag. This operation modifies the disk and boot configuration!")]
    MissingYesIKnow,

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("An installation is already running")]
    AlreadyRunning,

    #[error("Partition layout warnings were not acknowledged")]
    LayoutNotAcknowledged,
}
