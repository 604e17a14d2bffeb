//! Subcommand implementations. Each one is a thin caller of the workflow crate.

use crate::cli::InstallArgs;
use crate::console::ConsoleStatus;
use anyhow::{bail, Context, Result};
use linuxgate_core::catalog::{self, DistroEntry};
use linuxgate_core::diskpart::PartitionBuilder;
use linuxgate_core::locale;
use linuxgate_core::plan::{self, Account, InstallationPlan, SelectedImage};
use linuxgate_core::planner::{ShrinkPlanner, ShrinkPolicy};
use linuxgate_core::settings::Settings;
use linuxgate_core::sink::LogOnly;
use linuxgate_error::{InstallError, PipelineError};
use linuxgate_hal::ProcessOps;
use linuxgate_workflow::pipeline::DynHal;
use linuxgate_workflow::status::{self, StatusAggregator};
use linuxgate_workflow::{
    InstallationPipeline, LayoutGate, PartitionLayoutValidator, RunReport, StartOutcome,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

pub fn catalog(settings: &Settings, json: bool, out: &mut dyn Write) -> Result<()> {
    let entries = fetch_catalog(settings)?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &entries)?;
        writeln!(out)?;
        return Ok(());
    }
    for entry in &entries {
        let installer = if entry.has_installer() {
            " [full installer image]"
        } else {
            ""
        };
        writeln!(out, "{}{}", entry.name, installer)?;
        writeln!(out, "    {}", entry.description)?;
    }
    Ok(())
}

fn fetch_catalog(settings: &Settings) -> Result<Vec<DistroEntry>> {
    let url = &settings.downloads.catalog_url;
    let timeout = Duration::from_secs(settings.downloads.catalog_timeout_secs);
    catalog::fetch_catalog(url, timeout)
        .with_context(|| format!("could not load the catalog from {}", url))
}

/// Run the layout check and print its findings.
pub fn validate(
    hal: &DynHal,
    settings: &Settings,
    acknowledge: bool,
    out: &mut dyn Write,
) -> Result<LayoutGate> {
    let report = PartitionLayoutValidator::new(hal, settings).validate();
    for p in &report.partitions {
        writeln!(
            out,
            "Partition {} {:<8} {:>9.0} MB at {:>9.0} MB",
            p.index,
            p.kind.as_str(),
            p.size_mb,
            p.offset_mb
        )?;
    }
    if report.is_clean() {
        writeln!(out, "✅ Partition layout looks like a standard Windows install")?;
    } else {
        for warning in &report.warnings {
            writeln!(out, "⚠️  {}", warning)?;
        }
    }
    Ok(LayoutGate::new(report).acknowledged(acknowledge))
}

/// Build the plan from the command line, the catalog entry and the detected
/// Windows timezone.
pub fn build_plan(
    args: &InstallArgs,
    entry: &DistroEntry,
    windows_timezone: Option<&str>,
    size_gb: f64,
) -> InstallationPlan {
    let mut selection = locale::selection_for(&args.lang, windows_timezone);
    if let Some(tz) = &args.timezone {
        selection.timezone = tz.clone();
    }
    if let Some(keyboard) = &args.keyboard {
        selection.keyboard_layout = keyboard.clone();
    }
    InstallationPlan {
        requested_linux_size_gb: size_gb,
        selected_image: SelectedImage::from_distro(entry),
        locale: selection,
        account: Account {
            username: args.username.clone(),
            password: args.password.clone(),
            hostname: args.hostname.clone(),
        },
    }
}

/// Requested size, or a recommendation from what Windows can give up.
fn resolve_size_gb(hal: &DynHal, settings: &Settings, requested: Option<f64>) -> Result<f64> {
    if let Some(size) = requested {
        return Ok(size);
    }
    let builder = PartitionBuilder::new(hal, settings, &LogOnly);
    let planner = ShrinkPlanner::new(&builder, ShrinkPolicy::from_settings(&settings.disk));
    let free_mb = planner.query_max_reclaimable(settings.disk.system_volume)?;
    let size = plan::recommended_linux_size_gb(free_mb / 1024.0).floor();
    log::info!("{:.0} MB reclaimable; recommending {} GB for Linux", free_mb, size);
    Ok(size)
}

pub fn install<W: Write + Send + 'static>(
    hal: Arc<DynHal>,
    settings: Settings,
    args: &InstallArgs,
    out: W,
) -> Result<RunReport> {
    if !args.yes_i_know {
        return Err(InstallError::MissingYesIKnow.into());
    }

    let entries = fetch_catalog(&settings)?;
    let Some(entry) = catalog::find(&entries, &args.distro) else {
        bail!(
            "unknown distribution '{}'; run `linuxgate catalog` to see the choices",
            args.distro
        );
    };
    if entry.iso_url.is_empty() {
        return Err(InstallError::MissingImageUrl.into());
    }

    let windows_timezone = match &args.timezone {
        Some(_) => None,
        None => locale::detect_windows_timezone(
            hal.as_ref(),
            &settings.tools.tzutil,
            settings.tools.process_timeout(),
        ),
    };
    let size_gb = resolve_size_gb(hal.as_ref(), &settings, args.size_gb)?;
    let plan = build_plan(args, entry, windows_timezone.as_deref(), size_gb);
    plan.validate()?;
    log::info!("plan: {:?}", plan);

    let report = PartitionLayoutValidator::new(hal.as_ref(), &settings).validate();
    let gate = LayoutGate::new(report).acknowledged(args.acknowledge_layout);
    if !gate.can_proceed() {
        for warning in &gate.report().warnings {
            log::warn!("{}", warning);
        }
        return Err(PipelineError::LayoutNotAcknowledged.into());
    }

    let pipeline = InstallationPipeline::new(hal, settings);
    let (tx, rx) = status::channel();
    let aggregator = StatusAggregator::spawn(rx, ConsoleStatus::new(out));
    let handle = match pipeline.start(plan, &gate, tx)? {
        StartOutcome::Started(handle) => handle,
        StartOutcome::AlreadyRunning => return Err(PipelineError::AlreadyRunning.into()),
    };
    let report = handle
        .join()
        .map_err(|_| anyhow::anyhow!("installation worker panicked"))?;
    aggregator.join();

    if let Some(err) = &report.error {
        bail!("installation failed: {}", err);
    }
    Ok(report)
}

pub fn reboot(hal: &DynHal, settings: &Settings, yes_i_know: bool) -> Result<()> {
    if !yes_i_know {
        return Err(InstallError::MissingYesIKnow.into());
    }
    log::info!("🔁 restarting");
    hal.command_status(
        &settings.tools.shutdown,
        &["/r", "/t", "0"],
        settings.tools.process_timeout(),
    )
    .context("restart command failed")?;
    Ok(())
}
