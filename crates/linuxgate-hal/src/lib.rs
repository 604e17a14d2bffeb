//! Hardware abstraction layer for LinuxGate.
//!
//! Everything that touches the machine (external tools, image mounts, bulk
//! copies) goes through the traits exported here so the pipeline can be
//! exercised against [`FakeHal`] without a Windows host.

pub mod hal;
pub mod process_timeout;

pub use hal::{
    copy_tree_native, CopyBehavior, CopyOps, CopyOptions, CopyReport, FakeHal, FakeResponse,
    ImageMountGuard, ImageOps, InstallerHal, Operation, ProcessOps, TempFileGuard, WindowsHal,
};
pub use linuxgate_error::{HalError, HalResult};
