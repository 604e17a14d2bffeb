//! `config.txt` read by the Linux installer from the staging partition.

use crate::plan::InstallationPlan;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.txt";
pub const KEYBOARD_MODEL: &str = "pc105";

/// Ordered `KEY="value"` pairs.
#[derive(Clone, PartialEq, Eq)]
pub struct InstallConfigFile {
    entries: Vec<(&'static str, String)>,
}

impl InstallConfigFile {
    pub fn from_plan(plan: &InstallationPlan) -> Self {
        let entries = vec![
            ("SYSTEM_LANG", plan.locale.system_locale.clone()),
            ("KEYBOARD_LAYOUT", plan.locale.keyboard_layout.clone()),
            ("KEYBOARD_MODEL", KEYBOARD_MODEL.to_string()),
            ("TIMEZONE", plan.locale.timezone.clone()),
            ("USERNAME", plan.account.username.clone()),
            ("PASSWORD", plan.account.password.clone()),
            (
                "ISO_FILENAME",
                plan.selected_image
                    .installer_file_name_or_default()
                    .to_string(),
            ),
            (
                "LINUX_SIZE_GB",
                format!("{}", plan.requested_linux_size_gb.round() as i64),
            ),
        ];
        Self { entries }
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Entries safe to log: everything except the password.
    pub fn loggable(&self) -> impl Iterator<Item = String> + '_ {
        self.entries
            .iter()
            .filter(|(k, _)| *k != "PASSWORD")
            .map(|(k, v)| format!("{}={}", k, v))
    }

    pub fn write_to(&self, root: &Path) -> io::Result<PathBuf> {
        let path = root.join(CONFIG_FILE_NAME);
        fs::write(&path, self.render())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::fixtures::mint_plan;

    #[test]
    fn renders_keys_in_fixed_order() {
        let cfg = InstallConfigFile::from_plan(&mint_plan());
        assert_eq!(
            cfg.render(),
            "SYSTEM_LANG=\"fr_FR.UTF-8\"\n\
             KEYBOARD_LAYOUT=\"fr\"\n\
             KEYBOARD_MODEL=\"pc105\"\n\
             TIMEZONE=\"Europe/Paris\"\n\
             USERNAME=\"alice\"\n\
             PASSWORD=\"pw12\"\n\
             ISO_FILENAME=\"mint.iso\"\n\
             LINUX_SIZE_GB=\"50\""
        );
    }

    #[test]
    fn size_is_rounded_and_file_name_defaults() {
        let mut plan = mint_plan();
        plan.requested_linux_size_gb = 42.6;
        plan.selected_image.installer_file_name = None;
        let text = InstallConfigFile::from_plan(&plan).render();
        assert!(text.contains("LINUX_SIZE_GB=\"43\""));
        assert!(text.contains("ISO_FILENAME=\"mint.iso\""));
    }

    #[test]
    fn loggable_entries_skip_password() {
        let cfg = InstallConfigFile::from_plan(&mint_plan());
        let lines: Vec<String> = cfg.loggable().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines.iter().all(|l| !l.contains("pw12")));
    }

    #[test]
    fn writes_to_staging_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = InstallConfigFile::from_plan(&mint_plan())
            .write_to(dir.path())
            .unwrap();
        assert_eq!(path, dir.path().join("config.txt"));
        assert!(fs::read_to_string(path).unwrap().starts_with("SYSTEM_LANG="));
    }
}
