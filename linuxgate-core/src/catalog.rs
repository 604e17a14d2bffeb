//! Remote distribution catalog.
//!
//! The catalog is a JSON array of objects. Field names are matched without
//! regard to case, so `isoUrl`, `IsoUrl` and `isourl` are the same field.

use crate::downloader::create_http_client;
use anyhow::Context;
use linuxgate_error::{InstallError, InstallResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

pub const NO_DESCRIPTION: &str = "No description available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistroEntry {
    pub name: String,
    pub description: String,
    /// Logo shown by graphical front ends.
    pub image_url: Option<String>,
    /// Boot image staged onto the FAT32 partition. Empty when the entry has none.
    pub iso_url: String,
    /// Full installer image saved to the system drive.
    pub iso_installer: Option<String>,
    pub iso_installer_file_name: Option<String>,
}

impl DistroEntry {
    pub fn has_installer(&self) -> bool {
        self.iso_installer.is_some() && self.iso_installer_file_name.is_some()
    }
}

fn field(obj: &Map<String, Value>, name: &str) -> Option<String> {
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse catalog JSON. Entries without a name are skipped.
pub fn parse_catalog(json: &str) -> InstallResult<Vec<DistroEntry>> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| InstallError::Catalog(format!("invalid JSON: {}", e)))?;
    let items = value
        .as_array()
        .ok_or_else(|| InstallError::Catalog("expected a JSON array".to_string()))?;

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else {
            log::warn!("skipping non-object catalog entry: {}", item);
            continue;
        };
        let Some(name) = field(obj, "name") else {
            log::warn!("skipping catalog entry without a name");
            continue;
        };
        entries.push(DistroEntry {
            name,
            description: field(obj, "description").unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            image_url: field(obj, "imageUrl"),
            iso_url: field(obj, "isoUrl").unwrap_or_default(),
            iso_installer: field(obj, "isoInstaller"),
            iso_installer_file_name: field(obj, "isoInstallerFileName"),
        });
    }
    Ok(entries)
}

pub fn fetch_catalog(url: &str, timeout: Duration) -> InstallResult<Vec<DistroEntry>> {
    log::info!("fetching catalog {}", url);
    let fetch = || -> anyhow::Result<String> {
        let client = create_http_client(timeout)?;
        let text = client
            .get(url)
            .send()
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()?
            .text()?;
        Ok(text)
    };
    let text = fetch().map_err(|e| InstallError::DownloadFailed {
        url: url.to_string(),
        reason: format!("{:#}", e),
    })?;
    parse_catalog(&text)
}

/// Look an entry up by name, ignoring case.
pub fn find<'a>(entries: &'a [DistroEntry], name: &str) -> Option<&'a DistroEntry> {
    entries.iter().find(|e| e.name.eq_ignore_ascii_case(name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    const CATALOG: &str = r#"[
        {
            "name": "Linux Mint",
            "description": "Friendly desktop",
            "imageUrl": "https://example.org/mint.png",
            "isoUrl": "http://x/boot.iso",
            "isoInstaller": "http://x/mint.iso",
            "isoInstallerFileName": "mint.iso"
        },
        { "NAME": "Ubuntu", "ISOURL": "http://x/ubuntu-boot.iso" },
        { "name": "Broken", "description": "" },
        { "description": "nameless" },
        42
    ]"#;

    #[test]
    fn parses_fields_case_insensitively() {
        let entries = parse_catalog(CATALOG).unwrap();
        assert_eq!(entries.len(), 3);

        let mint = &entries[0];
        assert_eq!(mint.iso_url, "http://x/boot.iso");
        assert_eq!(mint.iso_installer_file_name.as_deref(), Some("mint.iso"));
        assert!(mint.has_installer());

        let ubuntu = &entries[1];
        assert_eq!(ubuntu.iso_url, "http://x/ubuntu-boot.iso");
        assert_eq!(ubuntu.description, NO_DESCRIPTION);
        assert!(!ubuntu.has_installer());
    }

    #[test]
    fn missing_iso_url_is_empty() {
        let entries = parse_catalog(CATALOG).unwrap();
        let broken = find(&entries, "broken").unwrap();
        assert!(broken.iso_url.is_empty());
        assert_eq!(broken.description, NO_DESCRIPTION);
    }

    #[test]
    fn non_array_is_rejected() {
        assert!(matches!(
            parse_catalog(r#"{"name": "x"}"#),
            Err(InstallError::Catalog(_))
        ));
        assert!(matches!(parse_catalog("not json"), Err(InstallError::Catalog(_))));
    }

    #[test]
    fn fetches_over_http() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/filepool/distros.json");
            then.status(200).body(CATALOG);
        });
        let entries =
            fetch_catalog(&server.url("/filepool/distros.json"), Duration::from_secs(5)).unwrap();
        assert_eq!(entries[0].name, "Linux Mint");
    }

    #[test]
    fn http_failure_is_download_failed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/filepool/distros.json");
            then.status(500);
        });
        assert!(matches!(
            fetch_catalog(&server.url("/filepool/distros.json"), Duration::from_secs(5)),
            Err(InstallError::DownloadFailed { .. })
        ));
    }
}
