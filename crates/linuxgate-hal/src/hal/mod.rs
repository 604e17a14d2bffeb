//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for system operations and provides
//! both real (WindowsHal) and fake (FakeHal) implementations.

pub mod copy_ops;
pub mod fake_hal;
pub mod guards;
pub mod image_ops;
pub mod process_ops;
pub mod windows_hal;

pub use copy_ops::{copy_tree_native, CopyOps, CopyOptions, CopyReport};
pub use fake_hal::{CopyBehavior, FakeHal, FakeResponse, Operation};
pub use guards::{ImageMountGuard, TempFileGuard};
pub use image_ops::ImageOps;
pub use process_ops::ProcessOps;
pub use windows_hal::WindowsHal;

/// Complete HAL combining all operation traits the installer needs.
pub trait InstallerHal: ProcessOps + ImageOps + CopyOps + Send + Sync {}

/// Automatically implement InstallerHal for any type implementing all required traits.
impl<T> InstallerHal for T where T: ProcessOps + ImageOps + CopyOps + Send + Sync {}
