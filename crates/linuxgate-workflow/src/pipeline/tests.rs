use super::*;
use crate::preflight::{LayoutReport, LayoutWarning, PartitionLayoutValidator};
use crate::stage_runner::StepOutcome;
use crate::status::{self, CollectingConsumer, StatusAggregator, StatusConsumer, StatusEvent};
use httpmock::Method::GET;
use httpmock::MockServer;
use linuxgate_core::catalog::DistroEntry;
use linuxgate_core::plan::{Account, LocaleSelection, SelectedImage};
use linuxgate_core::settings::DelaySettings;
use linuxgate_error::InstallError;
use linuxgate_hal::{FakeHal, FakeResponse, Operation};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GUID: &str = "{9dea862c-5cdd-4e70-acc1-f32b344d4795}";

const LAYOUT_AFTER: &str = "\
  Partition ###  Type              Size     Offset
  -------------  ----------------  -------  -------
  Partition 1    System             100 MB  1024 KB
  Partition 2    Primary            197 GB   101 MB
  Partition 4    Primary           2048 MB   234 GB
  Partition 3    Recovery           529 MB   237 GB
";

struct Fixture {
    _dir: TempDir,
    hal: FakeHal,
    settings: Settings,
    server: MockServer,
    staging: PathBuf,
    system_root: PathBuf,
    temp: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let system_root = dir.path().join("c");
        let temp = dir.path().join("tmp");
        let mount = dir.path().join("mnt");
        for d in [&staging, &system_root, &temp, &mount.join("casper")] {
            fs::create_dir_all(d).unwrap();
        }
        fs::write(mount.join("casper").join("vmlinuz"), b"kernel").unwrap();
        fs::write(mount.join("grldr"), b"loader").unwrap();

        let server = MockServer::start();
        for (path, body) in [
            ("/boot.iso", "BOOT-IMAGE"),
            ("/mint.iso", "FULL-INSTALLER-IMAGE"),
            ("/filepool/grldr", "grldr"),
            ("/filepool/grldr.mbr", "grldr.mbr"),
            ("/filepool/menu.lst", "title Install Linux"),
        ] {
            server.mock(|when, then| {
                when.method(GET).path(path);
                then.status(200).body(body);
            });
        }

        let hal = FakeHal::new();
        hal.set_mount_root(&mount);

        let mut settings = Settings::default();
        settings.delays = DelaySettings::none();
        settings.tools.bcdedit = Some("bcdedit.exe".to_string());
        settings.paths.temp_dir = Some(temp.clone());
        settings.paths.staging_root = Some(staging.clone());
        settings.paths.system_root = system_root.clone();
        settings.downloads.bootloader_base_url = server.url("/filepool/");

        Self {
            _dir: dir,
            hal,
            settings,
            server,
            staging,
            system_root,
            temp,
        }
    }

    fn plan(&self) -> InstallationPlan {
        InstallationPlan {
            requested_linux_size_gb: 50.0,
            selected_image: SelectedImage {
                url: self.server.url("/boot.iso"),
                metadata_name: "Linux Mint".to_string(),
                installer_url: Some(self.server.url("/mint.iso")),
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

    fn pipeline(&self) -> InstallationPipeline {
        InstallationPipeline::new(Arc::new(self.hal.clone()), self.settings.clone())
    }
}

/// diskpart answers for a disk with 80000 MB reclaimable before and
/// 38000 MB after the staging partition is created.
fn script_disk(hal: &FakeHal, second_querymax: &str) {
    hal.respond_once(
        "querymax",
        FakeResponse::ok("The maximum number of reclaimable bytes is:   78 GB (80000 MB)"),
    );
    hal.respond_once("querymax", FakeResponse::ok(second_querymax));
    hal.respond(
        "desired=",
        FakeResponse::ok("DiskPart successfully shrunk the volume by:  2048 MB"),
    );
    hal.respond(
        "create partition",
        FakeResponse::ok(
            "DiskPart succeeded in creating the specified partition.\r\n\
             100 percent completed\r\n\
             DiskPart successfully formatted the volume.\r\n\
             DiskPart successfully assigned the drive letter or mount point.",
        ),
    );
    hal.respond("list partition", FakeResponse::ok(LAYOUT_AFTER));
}

fn script_bcdedit(hal: &FakeHal) {
    hal.respond(
        "/create",
        FakeResponse::ok(format!("The entry {} was successfully created.", GUID)),
    );
    hal.respond("bcdedit", FakeResponse::ok("The operation completed successfully."));
}

const SECOND_QUERYMAX: &str = "The maximum number of reclaimable bytes is:   37 GB (38000 MB)";

fn clean_gate() -> LayoutGate {
    LayoutGate::new(LayoutReport::default())
}

fn run_collecting(
    pipeline: &InstallationPipeline,
    plan: &InstallationPlan,
    gate: &LayoutGate,
) -> (Result<RunReport, PipelineError>, CollectingConsumer) {
    let (tx, rx) = status::channel();
    let aggregator = StatusAggregator::spawn(rx, CollectingConsumer::default());
    let result = pipeline.run(plan, gate, &tx);
    drop(tx);
    (result, aggregator.join().unwrap())
}

fn leftover_boot_images(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("linuxgate_boot_"))
        })
        .collect()
}

#[test]
fn mint_scenario_reaches_completion() {
    let fx = Fixture::new();
    script_disk(&fx.hal, SECOND_QUERYMAX);
    script_bcdedit(&fx.hal);
    let pipeline = fx.pipeline();

    let (report, consumer) = run_collecting(&pipeline, &fx.plan(), &clean_gate());
    let report = report.unwrap();

    assert!(report.succeeded(), "{:?}", report.error);
    assert_eq!(report.final_percent, 100);
    assert_eq!(report.degraded().count(), 0);
    assert_eq!(report.steps.len(), StepId::ALL.len());

    let config = fs::read_to_string(fx.staging.join("config.txt")).unwrap();
    assert_eq!(
        config,
        "SYSTEM_LANG=\"fr_FR.UTF-8\"\n\
         KEYBOARD_LAYOUT=\"fr\"\n\
         KEYBOARD_MODEL=\"pc105\"\n\
         TIMEZONE=\"Europe/Paris\"\n\
         USERNAME=\"alice\"\n\
         PASSWORD=\"pw12\"\n\
         ISO_FILENAME=\"mint.iso\"\n\
         LINUX_SIZE_GB=\"50\""
    );

    let commands = fx.hal.commands();
    let position = |needle: &str| {
        commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("no command containing {:?}", needle))
    };
    assert!(position("shrink desired=2048") < position("create partition primary size=2048"));
    assert!(position("create partition primary size=2048") < position("shrink desired=37488"));

    let bcdedit: Vec<String> = commands
        .iter()
        .filter(|c| c.starts_with("bcdedit.exe"))
        .cloned()
        .collect();
    assert_eq!(
        bcdedit,
        vec![
            "bcdedit.exe /create /d Install Linux /application bootsector".to_string(),
            format!("bcdedit.exe /set {} device partition=C:", GUID),
            format!("bcdedit.exe /set {} path \\grldr.mbr", GUID),
            format!("bcdedit.exe /displayorder {} /addlast", GUID),
        ]
    );

    assert_eq!(
        fs::read_to_string(fx.staging.join("casper").join("vmlinuz")).unwrap(),
        "kernel"
    );
    assert_eq!(
        fs::read(fx.system_root.join("mint.iso")).unwrap(),
        b"FULL-INSTALLER-IMAGE"
    );
    for name in ["grldr", "grldr.mbr", "menu.lst"] {
        assert!(fx.system_root.join(name).is_file(), "{} missing", name);
    }
    assert!(leftover_boot_images(&fx.temp).is_empty());
    assert_eq!(
        fx.hal
            .count(|op| matches!(op, Operation::DismountImage { .. })),
        1
    );

    let percents = consumer.percents();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));
    assert_eq!(consumer.labels().last(), Some(&"Partitioning complete!"));
    assert_eq!(
        consumer.events.last(),
        Some(&StatusEvent::Finished { success: true })
    );
    let lines = consumer.lines();
    assert!(lines.iter().all(|l| !l.contains("pw12")));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("Unallocated space for Linux")));
    assert!(lines.iter().any(|l| l.starts_with("Summary:")));

    let state = pipeline.state();
    assert!(!state.is_running);
    assert_eq!(state.percent, 100);
    assert_eq!(state.current_step_index, StepId::ALL.len() - 1);
    assert!(pipeline.can_go_back());
    assert_eq!(report.summary.phase2_mb, Some(37488.0));
    assert_eq!(report.summary.boot_entry.unwrap().identifier, GUID);
}

#[test]
fn insufficient_space_aborts_before_any_destructive_command() {
    let fx = Fixture::new();
    fx.hal.respond(
        "querymax",
        FakeResponse::ok("The maximum number of reclaimable bytes is:   6 GB (7000 MB)"),
    );
    let pipeline = fx.pipeline();

    let (report, consumer) = run_collecting(&pipeline, &fx.plan(), &clean_gate());
    let report = report.unwrap();

    assert!(matches!(
        report.error,
        Some(InstallError::InsufficientSpace { available_mb, required_mb })
            if available_mb == 7000.0 && required_mb == 7168.0
    ));
    assert_eq!(report.failed_step, Some(StepId::ValidateSpace));
    assert_eq!(report.final_percent, 0);

    let commands = fx.hal.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands
        .iter()
        .all(|c| !c.contains("desired=") && !c.contains("create partition")));

    let state = pipeline.state();
    assert_eq!(state.percent, 0);
    assert!(state
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("Not enough free space")));
    assert_eq!(consumer.labels().last(), Some(&ERROR_LABEL));
    assert_eq!(
        consumer.events.last(),
        Some(&StatusEvent::Finished { success: false })
    );
}

#[test]
fn best_effort_steps_degrade_without_stopping() {
    let fx = Fixture::new();
    script_disk(
        &fx.hal,
        "The maximum number of reclaimable bytes is:  900 MB",
    );
    script_bcdedit(&fx.hal);
    let mut plan = fx.plan();
    plan.selected_image.installer_url = Some(fx.server.url("/missing.iso"));

    let (report, consumer) = run_collecting(&fx.pipeline(), &plan, &clean_gate());
    let report = report.unwrap();

    assert!(report.succeeded(), "{:?}", report.error);
    assert_eq!(report.final_percent, 100);
    assert!(matches!(
        report.outcome(StepId::ShrinkPhase2),
        Some(StepOutcome::Skipped(_))
    ));
    assert!(matches!(
        report.outcome(StepId::DownloadInstaller),
        Some(StepOutcome::Degraded(_))
    ));
    assert_eq!(
        report.degraded().map(|(step, _)| step).collect::<Vec<_>>(),
        vec![StepId::DownloadInstaller]
    );
    assert_eq!(
        fx.hal.commands().iter().filter(|c| c.contains("desired=")).count(),
        1
    );
    assert!(!fx.system_root.join("mint.iso").exists());
    assert!(report.summary.installer_path.is_none());
    assert!(consumer
        .lines()
        .iter()
        .any(|l| l.starts_with("Warning: Downloading the installer image did not complete")));
}

#[test]
fn required_failure_resets_progress_and_stops() {
    let fx = Fixture::new();
    script_disk(&fx.hal, SECOND_QUERYMAX);
    fx.hal.respond(
        "/create",
        FakeResponse::failed(
            1,
            "The boot configuration data store could not be opened.\r\nAccess is denied.",
        ),
    );
    let pipeline = fx.pipeline();

    let (report, consumer) = run_collecting(&pipeline, &fx.plan(), &clean_gate());
    let report = report.unwrap();

    assert_eq!(report.failed_step, Some(StepId::ConfigureBootEntry));
    assert!(matches!(
        report.error,
        Some(InstallError::ToolInvocationFailed { .. })
    ));
    assert!(report.outcome(StepId::Complete).is_none());
    assert_eq!(report.final_percent, 0);
    assert_eq!(pipeline.state().percent, 0);
    assert!(pipeline.can_go_back());
    assert_eq!(consumer.labels().last(), Some(&ERROR_LABEL));
    assert!(!consumer.percents().contains(&100));
    assert_eq!(
        fx.hal
            .commands()
            .iter()
            .filter(|c| c.starts_with("bcdedit.exe"))
            .count(),
        1
    );
}

#[test]
fn missing_image_url_fails_before_download() {
    let fx = Fixture::new();
    script_disk(&fx.hal, SECOND_QUERYMAX);
    let mut plan = fx.plan();
    plan.selected_image.url = "  ".to_string();

    let (report, _) = run_collecting(&fx.pipeline(), &plan, &clean_gate());
    let report = report.unwrap();

    assert!(matches!(report.error, Some(InstallError::MissingImageUrl)));
    assert_eq!(report.failed_step, Some(StepId::DownloadBootImage));
    assert!(leftover_boot_images(&fx.temp).is_empty());
    assert_eq!(
        fx.hal.count(|op| matches!(op, Operation::MountImage { .. })),
        0
    );
}

#[test]
fn failed_staging_still_removes_boot_image() {
    let fx = Fixture::new();
    script_disk(&fx.hal, SECOND_QUERYMAX);
    fx.hal.fail_mount("no drive letter assigned");

    let (report, _) = run_collecting(&fx.pipeline(), &fx.plan(), &clean_gate());
    let report = report.unwrap();

    assert!(matches!(report.error, Some(InstallError::StagingFailed(_))));
    assert_eq!(report.failed_step, Some(StepId::StageIso));
    assert!(leftover_boot_images(&fx.temp).is_empty());
    assert_eq!(
        fx.hal
            .count(|op| matches!(op, Operation::DismountImage { .. })),
        1
    );
}

#[test]
fn invalid_plan_is_rejected_before_touching_the_disk() {
    let fx = Fixture::new();
    let mut plan = fx.plan();
    plan.account.username = "Alice".to_string();

    let (report, _) = run_collecting(&fx.pipeline(), &plan, &clean_gate());

    assert!(matches!(
        report.unwrap().error,
        Some(InstallError::Validation(_))
    ));
    assert!(fx.hal.commands().is_empty());
}

#[test]
fn unacknowledged_layout_blocks_the_run() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline();
    let gate = LayoutGate::new(LayoutReport {
        partitions: Vec::new(),
        warnings: vec![LayoutWarning::PartitionCount {
            expected: 3,
            found: 4,
        }],
    });

    let (result, _) = run_collecting(&pipeline, &fx.plan(), &gate);

    assert!(matches!(result, Err(PipelineError::LayoutNotAcknowledged)));
    assert!(fx.hal.commands().is_empty());
    assert!(!pipeline.is_running());

    script_disk(&fx.hal, SECOND_QUERYMAX);
    script_bcdedit(&fx.hal);
    let (result, _) = run_collecting(&pipeline, &fx.plan(), &gate.acknowledged(true));
    assert!(result.unwrap().succeeded());
}

#[test]
fn second_start_while_running_is_a_no_op() {
    let fx = Fixture::new();
    script_disk(&fx.hal, SECOND_QUERYMAX);
    script_bcdedit(&fx.hal);
    let mut settings = fx.settings.clone();
    settings.delays.disk_settle_ms = 300;
    let pipeline = InstallationPipeline::new(Arc::new(fx.hal.clone()), settings);

    let (tx, rx) = status::channel();
    let aggregator = StatusAggregator::spawn(rx, CollectingConsumer::default());

    let first = pipeline.start(fx.plan(), &clean_gate(), tx.clone()).unwrap();
    assert!(!pipeline.can_go_back());
    let second = pipeline.start(fx.plan(), &clean_gate(), tx.clone()).unwrap();
    assert!(matches!(second, StartOutcome::AlreadyRunning));
    assert!(matches!(
        pipeline.run(&fx.plan(), &clean_gate(), &tx),
        Err(PipelineError::AlreadyRunning)
    ));

    let StartOutcome::Started(handle) = first else {
        panic!("first start did not launch a worker");
    };
    let report = handle.join().unwrap();
    drop(tx);
    aggregator.join().unwrap();

    assert!(report.succeeded(), "{:?}", report.error);
    assert!(pipeline.can_go_back());
    assert_eq!(
        fx.hal
            .commands()
            .iter()
            .filter(|c| c.contains("querymax"))
            .count(),
        2
    );
}

const STOCK_LAYOUT: &str = "\
  Partition ###  Type              Size     Offset
  -------------  ----------------  -------  -------
  Partition 1    System             100 MB  1024 KB
  Partition 2    Primary            237 GB   101 MB
  Partition 3    Recovery           530 MB   238 GB
";

/// Short name for each diskpart script, in the order they ran.
fn diskpart_sequence(commands: &[String]) -> Vec<String> {
    commands
        .iter()
        .filter(|c| c.starts_with("diskpart.exe"))
        .map(|c| {
            if let Some(pos) = c.find("shrink desired=") {
                let amount: String = c[pos + "shrink desired=".len()..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                format!("shrink {}", amount)
            } else if c.contains("shrink querymax") {
                "querymax".to_string()
            } else if c.contains("create partition") {
                "create".to_string()
            } else if c.contains("list partition") {
                "list".to_string()
            } else {
                c.clone()
            }
        })
        .collect()
}

#[test]
fn mint_catalog_entry_on_stock_layout() {
    let fx = Fixture::new();
    fx.hal.respond("list partition", FakeResponse::ok(STOCK_LAYOUT));
    fx.hal.respond_once(
        "querymax",
        FakeResponse::ok("The maximum number of reclaimable bytes is:   78 GB (80000 MB)"),
    );
    fx.hal.respond_once("querymax", FakeResponse::ok(SECOND_QUERYMAX));
    fx.hal.respond(
        "desired=",
        FakeResponse::ok("DiskPart successfully shrunk the volume by:  2048 MB"),
    );
    fx.hal.respond(
        "create partition",
        FakeResponse::ok(
            "DiskPart succeeded in creating the specified partition.\r\n\
             100 percent completed\r\n\
             DiskPart successfully formatted the volume.",
        ),
    );
    script_bcdedit(&fx.hal);

    let report = PartitionLayoutValidator::new(&fx.hal, &fx.settings).validate();
    assert_eq!(report.partitions.len(), 3);
    assert!(report.is_clean(), "{:?}", report.warnings);
    let gate = LayoutGate::new(report);
    let before_run = fx.hal.commands().len();

    let mint = DistroEntry {
        name: "Mint".to_string(),
        description: "Linux Mint".to_string(),
        image_url: None,
        iso_url: fx.server.url("/boot.iso"),
        iso_installer: Some(fx.server.url("/mint.iso")),
        iso_installer_file_name: Some("mint.iso".to_string()),
    };
    let mut plan = fx.plan();
    plan.requested_linux_size_gb = 60.0;
    plan.selected_image = SelectedImage::from_distro(&mint);

    let pipeline = fx.pipeline();
    let (report, consumer) = run_collecting(&pipeline, &plan, &gate);
    let report = report.unwrap();

    assert!(report.succeeded(), "{:?}", report.error);
    assert_eq!(report.final_percent, 100);
    assert_eq!(consumer.percents().last(), Some(&100));

    let commands = fx.hal.commands()[before_run..].to_vec();
    assert_eq!(
        diskpart_sequence(&commands),
        vec!["querymax", "shrink 2048", "create", "querymax", "shrink 37488", "list"]
    );
    let create = commands
        .iter()
        .find(|c| c.contains("create partition"))
        .unwrap();
    assert!(create.contains("create partition primary size=2048"));
    assert!(create.contains("format fs=fat32 quick label=LINUXGATE"));
    assert_eq!(report.summary.phase2_mb, Some(37488.0));

    assert_eq!(
        fs::read(fx.staging.join("config.txt")).unwrap(),
        b"SYSTEM_LANG=\"fr_FR.UTF-8\"\n\
          KEYBOARD_LAYOUT=\"fr\"\n\
          KEYBOARD_MODEL=\"pc105\"\n\
          TIMEZONE=\"Europe/Paris\"\n\
          USERNAME=\"alice\"\n\
          PASSWORD=\"pw12\"\n\
          ISO_FILENAME=\"mint.iso\"\n\
          LINUX_SIZE_GB=\"60\""
    );

    let bcdedit: Vec<&String> = commands
        .iter()
        .filter(|c| c.starts_with("bcdedit.exe"))
        .collect();
    assert_eq!(bcdedit.len(), 4);
    assert!(bcdedit[0].contains("/create /d Install Linux /application bootsector"));
    assert!(bcdedit[1].contains(&format!("/set {} device partition=C:", GUID)));
    assert!(bcdedit[2].contains(&format!("/set {} path \\grldr.mbr", GUID)));
    assert_eq!(
        bcdedit[3].as_str(),
        format!("bcdedit.exe /displayorder {} /addlast", GUID)
    );
}

/// Checks, when `Finished` arrives, whether the run is still marked active.
struct RestartOnFinish {
    pipeline: InstallationPipeline,
    running_at_finish: Option<bool>,
    could_go_back: Option<bool>,
}

impl StatusConsumer for RestartOnFinish {
    fn on_progress(&mut self, _percent: u8, _label: &str) {}

    fn on_log(&mut self, _line: &str) {}

    fn on_finished(&mut self, _success: bool) {
        self.running_at_finish = Some(self.pipeline.is_running());
        self.could_go_back = Some(self.pipeline.can_go_back());
    }
}

#[test]
fn run_is_released_before_finished_is_reported() {
    for succeed in [true, false] {
        let fx = Fixture::new();
        script_disk(&fx.hal, SECOND_QUERYMAX);
        if succeed {
            script_bcdedit(&fx.hal);
        } else {
            fx.hal
                .respond("/create", FakeResponse::failed(1, "Access is denied."));
        }
        let pipeline = fx.pipeline();

        let (tx, rx) = status::channel();
        let aggregator = StatusAggregator::spawn(
            rx,
            RestartOnFinish {
                pipeline: pipeline.clone(),
                running_at_finish: None,
                could_go_back: None,
            },
        );
        let StartOutcome::Started(handle) =
            pipeline.start(fx.plan(), &clean_gate(), tx).unwrap()
        else {
            panic!("pipeline was already running");
        };
        let report = handle.join().unwrap();
        let consumer = aggregator.join().unwrap();

        assert_eq!(report.succeeded(), succeed);
        assert_eq!(consumer.running_at_finish, Some(false));
        assert_eq!(consumer.could_go_back, Some(true));
    }
}
