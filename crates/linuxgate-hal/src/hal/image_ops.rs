//! Disk image attach/detach.

use crate::HalResult;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub trait ImageOps {
    /// Attach an ISO image and return the root directory of its volume.
    fn mount_image(&self, image: &Path, timeout: Duration) -> HalResult<PathBuf>;

    /// Detach a previously attached image.
    fn dismount_image(&self, image: &Path, timeout: Duration) -> HalResult<()>;
}
