//! Runtime settings.
//!
//! Every field has a default matching a stock Windows installation; a TOML file
//! passed with `--config` only needs the values it wants to change.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str = "https://tpm28.com/filepool/distros.json";
pub const DEFAULT_BOOTLOADER_BASE_URL: &str = "https://tpm28.com/filepool/";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiskSettings {
    pub disk_number: u32,
    /// Drive letter of the Windows volume that gets shrunk.
    pub system_volume: char,
    pub staging_letter: char,
    pub staging_label: String,
    pub staging_size_mb: u64,
    pub min_linux_size_mb: u64,
    /// Kept free on the Windows volume when shrinking the second time.
    pub safety_margin_mb: u64,
    /// Second shrink is skipped at or below this much reclaimable space.
    pub phase2_min_remaining_mb: u64,
    pub expected_partition_count: usize,
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            disk_number: 0,
            system_volume: 'C',
            staging_letter: 'Z',
            staging_label: "LINUXGATE".to_string(),
            staging_size_mb: 2048,
            min_linux_size_mb: 5120,
            safety_margin_mb: 512,
            phase2_min_remaining_mb: 1024,
            expected_partition_count: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    pub disk_settle_ms: u64,
    pub boot_store_settle_ms: u64,
    pub mount_settle_ms: u64,
}

impl DelaySettings {
    pub fn none() -> Self {
        Self {
            disk_settle_ms: 0,
            boot_store_settle_ms: 0,
            mount_settle_ms: 0,
        }
    }

    pub fn disk_settle(&self) -> Duration {
        Duration::from_millis(self.disk_settle_ms)
    }

    pub fn boot_store_settle(&self) -> Duration {
        Duration::from_millis(self.boot_store_settle_ms)
    }

    pub fn mount_settle(&self) -> Duration {
        Duration::from_millis(self.mount_settle_ms)
    }
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            disk_settle_ms: 3000,
            boot_store_settle_ms: 1000,
            mount_settle_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub catalog_url: String,
    pub bootloader_base_url: String,
    pub bootloader_files: Vec<String>,
    pub short_timeout_secs: u64,
    pub long_timeout_secs: u64,
    pub catalog_timeout_secs: u64,
    pub progress_interval_ms: u64,
    pub resume: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            bootloader_base_url: DEFAULT_BOOTLOADER_BASE_URL.to_string(),
            bootloader_files: vec![
                "grldr".to_string(),
                "grldr.mbr".to_string(),
                "menu.lst".to_string(),
            ],
            short_timeout_secs: 30 * 60,
            long_timeout_secs: 4 * 60 * 60,
            catalog_timeout_secs: 30,
            progress_interval_ms: 500,
            resume: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub diskpart: String,
    /// Explicit bcdedit path; resolved from `%WINDIR%` when unset.
    pub bcdedit: Option<String>,
    pub powershell: String,
    pub xcopy: String,
    pub shutdown: String,
    pub tzutil: String,
    pub process_timeout_secs: u64,
    /// Upper bound for mounting and copying an installation image.
    pub copy_timeout_secs: u64,
}

impl ToolSettings {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn copy_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_timeout_secs)
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            diskpart: "diskpart.exe".to_string(),
            bcdedit: None,
            powershell: "powershell.exe".to_string(),
            xcopy: "xcopy.exe".to_string(),
            shutdown: "shutdown.exe".to_string(),
            tzutil: "tzutil.exe".to_string(),
            process_timeout_secs: 300,
            copy_timeout_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Where the installer image and bootloader files are written.
    pub system_root: PathBuf,
    /// Scratch directory for scripts and the boot image; the OS temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    /// Root of the staging partition; derived from the staging letter when unset.
    pub staging_root: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            system_root: PathBuf::from("C:\\"),
            temp_dir: None,
            staging_root: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootSettings {
    pub entry_description: String,
    pub device: String,
    pub loader_path: String,
}

impl Default for BootSettings {
    fn default() -> Self {
        Self {
            entry_description: "Install Linux".to_string(),
            device: "partition=C:".to_string(),
            loader_path: "\\grldr.mbr".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub disk: DiskSettings,
    pub delays: DelaySettings,
    pub downloads: DownloadSettings,
    pub tools: ToolSettings,
    pub paths: PathSettings,
    pub boot: BootSettings,
}

impl Settings {
    /// Load settings from `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read settings {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("invalid settings file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.paths
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.paths
            .staging_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}:\\", self.disk.staging_letter)))
    }

    /// bcdedit location: the configured path, else `%WINDIR%\Sysnative\bcdedit.exe`
    /// when it exists (32-bit process on 64-bit Windows), else `System32`.
    pub fn bcdedit_path(&self) -> PathBuf {
        if let Some(path) = &self.tools.bcdedit {
            return PathBuf::from(path);
        }
        let windir = std::env::var_os("WINDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("C:\\Windows"));
        resolve_bcdedit(&windir)
    }
}

pub fn resolve_bcdedit(windir: &Path) -> PathBuf {
    let sysnative = windir.join("Sysnative").join("bcdedit.exe");
    if sysnative.exists() {
        sysnative
    } else {
        windir.join("System32").join("bcdedit.exe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_layout() {
        let s = Settings::default();
        assert_eq!(s.disk.system_volume, 'C');
        assert_eq!(s.disk.staging_letter, 'Z');
        assert_eq!(s.disk.staging_size_mb, 2048);
        assert_eq!(s.downloads.bootloader_files.len(), 3);
        assert_eq!(s.staging_root(), PathBuf::from("Z:\\"));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let s = Settings::from_toml(
            r#"
            [disk]
            staging_letter = "Y"
            staging_size_mb = 4096

            [delays]
            disk_settle_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(s.disk.staging_letter, 'Y');
        assert_eq!(s.disk.staging_size_mb, 4096);
        assert_eq!(s.disk.min_linux_size_mb, 5120);
        assert_eq!(s.delays.disk_settle_ms, 0);
        assert_eq!(s.delays.boot_store_settle_ms, 1000);
        assert_eq!(s.downloads.catalog_url, DEFAULT_CATALOG_URL);
    }

    #[test]
    fn unknown_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn bcdedit_prefers_sysnative_when_present() {
        let windir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_bcdedit(windir.path()),
            windir.path().join("System32").join("bcdedit.exe")
        );

        fs::create_dir_all(windir.path().join("Sysnative")).unwrap();
        fs::write(windir.path().join("Sysnative/bcdedit.exe"), b"").unwrap();
        assert_eq!(
            resolve_bcdedit(windir.path()),
            windir.path().join("Sysnative").join("bcdedit.exe")
        );
    }

    #[test]
    fn explicit_bcdedit_path_wins() {
        let mut s = Settings::default();
        s.tools.bcdedit = Some("D:\\tools\\bcdedit.exe".to_string());
        assert_eq!(s.bcdedit_path(), PathBuf::from("D:\\tools\\bcdedit.exe"));
    }
}
