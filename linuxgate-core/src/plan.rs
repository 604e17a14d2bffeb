//! What the user asked for: target size, image, locale and account.
//!
//! A plan is built once by the front end and only read afterwards.

use crate::catalog::DistroEntry;
use linuxgate_error::{InstallError, InstallResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Smallest Linux target the installer offers.
pub const MIN_LINUX_SIZE_GB: f64 = 30.0;
/// Largest recommended target.
pub const MAX_RECOMMENDED_SIZE_GB: f64 = 100.0;
pub const MIN_PASSWORD_LEN: usize = 4;
pub const DEFAULT_INSTALLER_FILE_NAME: &str = "mint.iso";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("name pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    /// Boot image staged onto the FAT32 partition.
    pub url: String,
    pub metadata_name: String,
    pub installer_url: Option<String>,
    pub installer_file_name: Option<String>,
}

impl SelectedImage {
    pub fn from_distro(entry: &DistroEntry) -> Self {
        Self {
            url: entry.iso_url.clone(),
            metadata_name: entry.name.clone(),
            installer_url: entry.iso_installer.clone(),
            installer_file_name: entry.iso_installer_file_name.clone(),
        }
    }

    /// File name written as `ISO_FILENAME`.
    pub fn installer_file_name_or_default(&self) -> &str {
        self.installer_file_name
            .as_deref()
            .unwrap_or(DEFAULT_INSTALLER_FILE_NAME)
    }

    /// Both installer fields are needed to download the installer image.
    pub fn installer(&self) -> Option<(&str, &str)> {
        match (&self.installer_url, &self.installer_file_name) {
            (Some(url), Some(name)) => Some((url.as_str(), name.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSelection {
    pub system_locale: String,
    pub keyboard_layout: String,
    pub timezone: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub hostname: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("hostname", &self.hostname)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallationPlan {
    pub requested_linux_size_gb: f64,
    pub selected_image: SelectedImage,
    pub locale: LocaleSelection,
    pub account: Account,
}

impl InstallationPlan {
    /// Check the account and size rules a plan must satisfy before it can run.
    pub fn validate(&self) -> InstallResult<()> {
        let size = self.requested_linux_size_gb;
        if !size.is_finite() || size < MIN_LINUX_SIZE_GB {
            return Err(InstallError::Validation(format!(
                "Linux size must be at least {} GB (got {})",
                MIN_LINUX_SIZE_GB, size
            )));
        }
        let account = &self.account;
        if !NAME_PATTERN.is_match(&account.username) {
            return Err(InstallError::Validation(format!(
                "invalid username '{}': use lowercase letters, digits and '-', starting with a letter",
                account.username
            )));
        }
        if !NAME_PATTERN.is_match(&account.hostname) {
            return Err(InstallError::Validation(format!(
                "invalid hostname '{}': use lowercase letters, digits and '-', starting with a letter",
                account.hostname
            )));
        }
        if account.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(InstallError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

/// Recommended Linux size for `free_gb` of free space: 40 % of it, at least
/// the minimum and at most the recommended maximum.
pub fn recommended_linux_size_gb(free_gb: f64) -> f64 {
    (free_gb * 0.4)
        .max(MIN_LINUX_SIZE_GB)
        .min(MAX_RECOMMENDED_SIZE_GB)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn mint_plan() -> InstallationPlan {
        InstallationPlan {
            requested_linux_size_gb: 50.0,
            selected_image: SelectedImage {
                url: "http://x/boot.iso".to_string(),
                metadata_name: "Linux Mint".to_string(),
                installer_url: Some("http://x/mint.iso".to_string()),
                installer_file_name: Some("mint.iso".to_string()),
            },
            locale: LocaleSelection {
                system_locale: "fr_FR.UTF-8".to_string(),
                keyboard_layout: "fr".to_string(),
                timezone: "Europe/Paris".to_string(),
            },
            account: Account {
                username: "alice".to_string(),
                password: "pw12".to_string(),
                hostname: "alice-pc".to_string(),
            },
        }
    }
}
