//! Firmware boot entry registration through `bcdedit`.

use crate::parser::{self, Outcome, PhraseSet};
use crate::settings::{BootSettings, Settings};
use crate::sink::LogSink;
use linuxgate_error::{InstallError, InstallResult};
use linuxgate_hal::ProcessOps;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Progress of one entry registration. Each transition is one bcdedit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootConfigState {
    Idle,
    EntryCreated,
    DeviceBound,
    PathBound,
    Ordered,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEntry {
    pub identifier: String,
}

/// The `{...}` identifier printed by `bcdedit /create`, braces included.
pub fn extract_identifier(output: &str) -> Option<String> {
    let start = output.find('{')?;
    let len = output[start..].find('}')?;
    Some(output[start..=start + len].to_string())
}

pub struct BootConfigurator<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    sink: &'a dyn LogSink,
    bcdedit: PathBuf,
    boot: BootSettings,
    settle: Duration,
    timeout: Duration,
    state: BootConfigState,
}

impl<'a, H: ProcessOps + ?Sized> BootConfigurator<'a, H> {
    pub fn new(hal: &'a H, settings: &Settings, sink: &'a dyn LogSink) -> Self {
        Self {
            hal,
            sink,
            bcdedit: settings.bcdedit_path(),
            boot: settings.boot.clone(),
            settle: settings.delays.boot_store_settle(),
            timeout: settings.tools.process_timeout(),
            state: BootConfigState::Idle,
        }
    }

    pub fn state(&self) -> BootConfigState {
        self.state
    }

    fn run(&self, args: &[&str]) -> InstallResult<String> {
        let program = self.bcdedit.to_string_lossy().to_string();
        let command = format!("{} {}", program, args.join(" "));
        self.sink.line(&format!("Running: {}", command));

        let out = self.hal.command_output(&program, args, self.timeout)?;
        let mut text = String::from_utf8_lossy(&out.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(stderr.trim());
        }
        if !text.is_empty() {
            self.sink.line(&format!("  bcdedit: {}", text));
        }

        let failed = !out.status.success()
            || parser::detect_outcome(&text, &PhraseSet::BOOT_STORE) == Outcome::Failure;
        if failed {
            return Err(InstallError::ToolInvocationFailed {
                tool: "bcdedit".to_string(),
                detail: format!("`{}` (exit={:?}): {}", command, out.status.code(), text),
            });
        }
        Ok(text)
    }

    fn step(&mut self, next: BootConfigState, args: &[&str]) -> InstallResult<String> {
        if self.state != BootConfigState::Idle {
            thread::sleep(self.settle);
        }
        let text = self.run(args)?;
        log::debug!("boot entry: {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(text)
    }

    /// Create the entry, bind it to the system partition and loader, and append it to the menu.
    pub fn configure(&mut self) -> InstallResult<BootEntry> {
        let description = self.boot.entry_description.clone();
        let created = self.step(
            BootConfigState::EntryCreated,
            &["/create", "/d", &description, "/application", "bootsector"],
        )?;
        let identifier = extract_identifier(&created)
            .ok_or_else(|| InstallError::IdentifierNotFound { output: created })?;
        self.sink
            .line(&format!("Created boot entry {}", identifier));

        let device = self.boot.device.clone();
        self.step(
            BootConfigState::DeviceBound,
            &["/set", &identifier, "device", &device],
        )?;
        let loader = self.boot.loader_path.clone();
        self.step(
            BootConfigState::PathBound,
            &["/set", &identifier, "path", &loader],
        )?;
        self.step(
            BootConfigState::Ordered,
            &["/displayorder", &identifier, "/addlast"],
        )?;
        self.state = BootConfigState::Done;
        Ok(BootEntry { identifier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DelaySettings;
    use crate::sink::LogOnly;
    use linuxgate_hal::{FakeHal, FakeResponse};

    const GUID: &str = "{4a0c8f5e-1d2b-11ef-9c3e-0800200c9a66}";

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.delays = DelaySettings::none();
        s.tools.bcdedit = Some("bcdedit.exe".to_string());
        s
    }

    #[test]
    fn identifier_includes_braces() {
        let out = format!("The entry {} was successfully created.", GUID);
        assert_eq!(extract_identifier(&out).as_deref(), Some(GUID));
        assert_eq!(extract_identifier("L'entrée {abc} a été créée."), Some("{abc}".into()));
        assert_eq!(extract_identifier("no braces here"), None);
        assert_eq!(extract_identifier("dangling { brace"), None);
    }

    #[test]
    fn configure_runs_four_commands_in_order() {
        let hal = FakeHal::new();
        hal.respond(
            "/create",
            FakeResponse::ok(format!("The entry {} was successfully created.", GUID)),
        );
        hal.respond("bcdedit", FakeResponse::ok("The operation completed successfully."));
        let settings = settings();
        let mut cfg = BootConfigurator::new(&hal, &settings, &LogOnly);

        let entry = cfg.configure().unwrap();

        assert_eq!(entry.identifier, GUID);
        assert_eq!(cfg.state(), BootConfigState::Done);
        assert_eq!(
            hal.commands(),
            vec![
                "bcdedit.exe /create /d Install Linux /application bootsector".to_string(),
                format!("bcdedit.exe /set {} device partition=C:", GUID),
                format!("bcdedit.exe /set {} path \\grldr.mbr", GUID),
                format!("bcdedit.exe /displayorder {} /addlast", GUID),
            ]
        );
    }

    #[test]
    fn missing_identifier_stops_after_create() {
        let hal = FakeHal::new();
        hal.respond("/create", FakeResponse::ok("The operation completed successfully."));
        let settings = settings();
        let mut cfg = BootConfigurator::new(&hal, &settings, &LogOnly);

        let err = cfg.configure().unwrap_err();

        assert!(matches!(err, InstallError::IdentifierNotFound { .. }));
        assert_eq!(cfg.state(), BootConfigState::EntryCreated);
        assert_eq!(hal.commands().len(), 1);
    }

    #[test]
    fn failed_transition_reports_command_and_output() {
        let hal = FakeHal::new();
        hal.respond(
            "/create",
            FakeResponse::ok(format!("The entry {} was successfully created.", GUID)),
        );
        hal.respond(
            " path ",
            FakeResponse::failed(1, "An error occurred while attempting to reference the specified entry."),
        );
        let settings = settings();
        let mut cfg = BootConfigurator::new(&hal, &settings, &LogOnly);

        let err = cfg.configure().unwrap_err();

        match err {
            InstallError::ToolInvocationFailed { tool, detail } => {
                assert_eq!(tool, "bcdedit");
                assert!(detail.contains("/set"));
                assert!(detail.contains("path"));
                assert!(detail.contains("reference the specified entry"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(cfg.state(), BootConfigState::DeviceBound);
        assert_eq!(hal.commands().len(), 3);
    }
}
