use crate::ImageOps;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// RAII guard that dismounts an attached image when dropped.
#[derive(Debug)]
pub struct ImageMountGuard<'a, H: ImageOps + ?Sized> {
    hal: &'a H,
    image: PathBuf,
    timeout: Duration,
    active: bool,
}

impl<'a, H: ImageOps + ?Sized> ImageMountGuard<'a, H> {
    pub fn new(hal: &'a H, image: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            hal,
            image: image.into(),
            timeout,
            active: true,
        }
    }

    /// Prevent automatic dismount and return the image path.
    pub fn release(mut self) -> PathBuf {
        self.active = false;
        self.image.clone()
    }

    pub fn image(&self) -> &Path {
        &self.image
    }
}

impl<'a, H: ImageOps + ?Sized> Drop for ImageMountGuard<'a, H> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(err) = self.hal.dismount_image(&self.image, self.timeout) {
            log::warn!(
                "image guard failed to dismount {}: {}",
                self.image.display(),
                err
            );
        }
    }
}

/// RAII guard that deletes a temporary file when dropped.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
    active: bool,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            active: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file and return its path.
    pub fn release(mut self) -> PathBuf {
        self.active = false;
        self.path.clone()
    }

    /// Delete the file now and report the outcome instead of logging it.
    pub fn remove(mut self) -> io::Result<()> {
        self.active = false;
        remove_if_present(&self.path)
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(err) = remove_if_present(&self.path) {
            log::warn!(
                "temp file guard failed to remove {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FakeHal, Operation};

    #[test]
    fn image_guard_dismounts_on_drop() {
        let hal = FakeHal::new();
        let root = tempfile::tempdir().unwrap();
        hal.set_mount_root(root.path());
        let image = Path::new("C:/Temp/boot.iso");

        hal.mount_image(image, Duration::from_secs(1)).unwrap();
        assert!(hal.is_mounted(image));

        {
            let _guard = ImageMountGuard::new(&hal, image, Duration::from_secs(1));
        }

        assert!(!hal.is_mounted(image));
        assert_eq!(
            hal.count(|op| matches!(op, Operation::DismountImage { .. })),
            1
        );
    }

    #[test]
    fn image_guard_release_skips_dismount() {
        let hal = FakeHal::new();
        let root = tempfile::tempdir().unwrap();
        hal.set_mount_root(root.path());
        let image = Path::new("C:/Temp/keep.iso");
        hal.mount_image(image, Duration::from_secs(1)).unwrap();

        {
            let guard = ImageMountGuard::new(&hal, image, Duration::from_secs(1));
            let _ = guard.release();
        }

        assert!(hal.is_mounted(image));
    }

    #[test]
    fn temp_file_guard_removes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.txt");
        fs::write(&path, "rescan").unwrap();

        {
            let _guard = TempFileGuard::new(&path);
        }

        assert!(!path.exists());
    }

    #[test]
    fn temp_file_guard_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let guard = TempFileGuard::new(dir.path().join("never-written.iso"));
        assert!(guard.remove().is_ok());
    }
}
