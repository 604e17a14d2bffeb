//! LinuxGate workflow orchestration.
//!
//! This crate holds the step runner, the status channel between the worker
//! thread and whoever displays progress, the pre-flight layout gate and the
//! installation pipeline built from those pieces.

pub mod pipeline;
pub mod preflight;
pub mod stage_runner;
pub mod status;

pub use pipeline::{InstallationPipeline, PipelineState, RunReport, StartOutcome, StepId};
pub use preflight::{LayoutGate, LayoutReport, LayoutWarning, PartitionLayoutValidator};
pub use status::{StatusConsumer, StatusEvent, StatusSender};
