//! The pipeline's step table and the body of every step.

use super::context::RunContext;
use crate::stage_runner::{StepDefinition, StepPolicy, StepStatus};
use linuxgate_core::bootcfg::BootConfigurator;
use linuxgate_core::diskpart::free_space_between;
use linuxgate_core::downloader::{format_bytes, DownloadClass};
use linuxgate_core::install_config::InstallConfigFile;
use linuxgate_core::parser;
use linuxgate_core::planner::{Phase2Plan, ShrinkPlanner};
use linuxgate_core::staging::IsoStager;
use linuxgate_error::{InstallError, InstallResult};
use linuxgate_hal::TempFileGuard;
use std::path::{Path, PathBuf};
use std::thread;
use url::Url;

pub(crate) type StepBody = fn(&mut RunContext<'_>) -> InstallResult<StepStatus>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepId {
    ValidateSpace,
    ShrinkPhase1,
    SettleAfterShrink,
    CreateStagingPartition,
    SettleAfterCreate,
    ShrinkPhase2,
    SettleAfterPhase2,
    DownloadBootImage,
    StageIso,
    CleanupBootImage,
    DownloadInstaller,
    WriteConfig,
    DownloadBootloaderFiles,
    ConfigureBootEntry,
    Complete,
}

impl StepId {
    /// Every step, in execution order.
    pub const ALL: [StepId; 15] = [
        StepId::ValidateSpace,
        StepId::ShrinkPhase1,
        StepId::SettleAfterShrink,
        StepId::CreateStagingPartition,
        StepId::SettleAfterCreate,
        StepId::ShrinkPhase2,
        StepId::SettleAfterPhase2,
        StepId::DownloadBootImage,
        StepId::StageIso,
        StepId::CleanupBootImage,
        StepId::DownloadInstaller,
        StepId::WriteConfig,
        StepId::DownloadBootloaderFiles,
        StepId::ConfigureBootEntry,
        StepId::Complete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StepId::ValidateSpace => "validate-space",
            StepId::ShrinkPhase1 => "shrink-phase-1",
            StepId::SettleAfterShrink => "settle",
            StepId::CreateStagingPartition => "create-staging-partition",
            StepId::SettleAfterCreate => "settle",
            StepId::ShrinkPhase2 => "shrink-phase-2",
            StepId::SettleAfterPhase2 => "settle",
            StepId::DownloadBootImage => "download-boot-image",
            StepId::StageIso => "stage-iso",
            StepId::CleanupBootImage => "cleanup-temp-image",
            StepId::DownloadInstaller => "download-installer-image",
            StepId::WriteConfig => "write-config",
            StepId::DownloadBootloaderFiles => "download-bootloader-files",
            StepId::ConfigureBootEntry => "configure-boot-entry",
            StepId::Complete => "done",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepId::ValidateSpace => "Checking available disk space",
            StepId::ShrinkPhase1 => "Shrinking the Windows partition",
            StepId::SettleAfterShrink | StepId::SettleAfterCreate | StepId::SettleAfterPhase2 => {
                "Waiting for the disk to settle"
            }
            StepId::CreateStagingPartition => "Creating the boot partition",
            StepId::ShrinkPhase2 => "Reserving space for Linux",
            StepId::DownloadBootImage => "Downloading the boot image",
            StepId::StageIso => "Copying boot files",
            StepId::CleanupBootImage => "Removing temporary files",
            StepId::DownloadInstaller => "Downloading the installer image",
            StepId::WriteConfig => "Writing the installer configuration",
            StepId::DownloadBootloaderFiles => "Downloading bootloader files",
            StepId::ConfigureBootEntry => "Configuring the boot menu",
            StepId::Complete => "Partitioning complete!",
        }
    }

    pub fn policy(&self) -> StepPolicy {
        match self {
            StepId::ShrinkPhase2
            | StepId::CleanupBootImage
            | StepId::DownloadInstaller
            | StepId::WriteConfig => StepPolicy::BestEffort,
            _ => StepPolicy::Required,
        }
    }

    /// Percentage reported when the step starts.
    pub fn progress_mark(&self) -> Option<u8> {
        match self {
            StepId::ValidateSpace | StepId::ShrinkPhase1 => Some(10),
            StepId::CreateStagingPartition => Some(30),
            StepId::ShrinkPhase2 => Some(45),
            StepId::SettleAfterPhase2 => Some(50),
            StepId::DownloadBootImage => Some(BOOT_IMAGE_PROGRESS.0),
            StepId::StageIso => Some(80),
            StepId::DownloadInstaller => Some(INSTALLER_PROGRESS.0),
            StepId::WriteConfig => Some(95),
            StepId::DownloadBootloaderFiles => Some(96),
            StepId::ConfigureBootEntry => Some(98),
            StepId::Complete => Some(100),
            StepId::SettleAfterShrink | StepId::SettleAfterCreate | StepId::CleanupBootImage => {
                None
            }
        }
    }

    fn body(&self) -> StepBody {
        match self {
            StepId::ValidateSpace => validate_space,
            StepId::ShrinkPhase1 => shrink_phase1,
            StepId::SettleAfterShrink | StepId::SettleAfterCreate => settle,
            StepId::CreateStagingPartition => create_staging_partition,
            StepId::ShrinkPhase2 => shrink_phase2,
            StepId::SettleAfterPhase2 => settle_and_snapshot,
            StepId::DownloadBootImage => download_boot_image,
            StepId::StageIso => stage_iso,
            StepId::CleanupBootImage => cleanup_boot_image,
            StepId::DownloadInstaller => download_installer,
            StepId::WriteConfig => write_config,
            StepId::DownloadBootloaderFiles => download_bootloader_files,
            StepId::ConfigureBootEntry => configure_boot_entry,
            StepId::Complete => complete,
        }
    }
}

/// Start and span of the boot image download on the progress bar.
const BOOT_IMAGE_PROGRESS: (u8, u8) = (55, 25);
const INSTALLER_PROGRESS: (u8, u8) = (85, 10);

pub(crate) fn table<'a>() -> Vec<StepDefinition<'static, StepId, RunContext<'a>, InstallError>> {
    StepId::ALL
        .iter()
        .map(|id| StepDefinition {
            key: *id,
            policy: id.policy(),
            run: Box::new(id.body()),
        })
        .collect()
}

/// Map a download's own 0-100 onto its slice of the overall bar.
fn scaled((start, span): (u8, u8), percent: u8) -> u8 {
    start + (u16::from(percent.min(100)) * u16::from(span) / 100) as u8
}

fn validate_space(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    ctx.plan.validate()?;
    let volume = ctx.settings.disk.system_volume;
    let builder = ctx.builder();
    let planner = ShrinkPlanner::new(&builder, ctx.policy());
    let available = planner.validate_space(volume)?;
    ctx.log(&format!(
        "{:.0} MB can be reclaimed from {}: ({:.0} MB needed)",
        available,
        volume,
        planner.policy().floor_mb()
    ));
    ctx.summary.available_mb = Some(available);
    Ok(StepStatus::Completed)
}

fn shrink_phase1(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let amount = ctx.policy().phase1_amount();
    ctx.builder()
        .shrink(ctx.settings.disk.system_volume, amount)?;
    ctx.summary.phase1_mb = Some(amount);
    Ok(StepStatus::Completed)
}

fn settle(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    thread::sleep(ctx.settings.delays.disk_settle());
    Ok(StepStatus::Completed)
}

fn create_staging_partition(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    ctx.builder().create_staging_partition()?;
    Ok(StepStatus::Completed)
}

fn shrink_phase2(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let volume = ctx.settings.disk.system_volume;
    let requested_gb = ctx.plan.requested_linux_size_gb;
    let builder = ctx.builder();
    let planner = ShrinkPlanner::new(&builder, ctx.policy());
    let remaining = planner.query_max_reclaimable(volume)?;

    match planner.policy().phase2(remaining, requested_gb) {
        Phase2Plan::Skip { remaining_mb } => Ok(StepStatus::Skipped(format!(
            "only {:.0} MB left to reclaim; the Linux installer will finish the resize",
            remaining_mb
        ))),
        Phase2Plan::Shrink {
            amount_mb,
            short_of_request,
        } => {
            if short_of_request {
                ctx.log(&format!(
                    "Warning: {:.0} MB can be reserved now, {:.0} MB were requested",
                    amount_mb,
                    requested_gb * 1024.0
                ));
            }
            builder.shrink(volume, amount_mb)?;
            ctx.summary.phase2_mb = Some(amount_mb);
            Ok(StepStatus::Completed)
        }
    }
}

/// Settle, then log the resulting layout. The snapshot is informational only.
fn settle_and_snapshot(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    thread::sleep(ctx.settings.delays.disk_settle());

    let records = match ctx.builder().list_partitions() {
        Ok(records) => records,
        Err(err) => {
            ctx.log(&format!("Could not read the new partition layout: {}", err));
            return Ok(StepStatus::Completed);
        }
    };
    ctx.log("Partition layout:");
    for r in &records {
        ctx.log(&format!(
            "  Partition {} ({}): offset {:.0} MB, size {:.0} MB",
            r.index,
            r.kind.as_str(),
            r.offset_mb,
            r.size_mb
        ));
    }
    for warning in parser::check_geometry(&records, None) {
        ctx.log(&format!("Warning: {}", warning));
    }
    match free_space_between(&records) {
        Ok(free) => ctx.log(&format!(
            "Unallocated space for Linux: {:.0} MB ({:.0} MB to {:.0} MB)",
            free.size_mb(),
            free.start_mb,
            free.end_mb
        )),
        Err(err) => log::warn!("free space bounds unavailable: {}", err),
    }
    Ok(StepStatus::Completed)
}

fn download_boot_image(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let plan = ctx.plan;
    let url = plan.selected_image.url.trim();
    if url.is_empty() {
        return Err(InstallError::MissingImageUrl);
    }
    let dest = ctx.settings.temp_dir().join(format!(
        "linuxgate_boot_{}.iso",
        uuid::Uuid::new_v4().simple()
    ));
    ctx.boot_image = Some(TempFileGuard::new(&dest));

    let label = StepId::DownloadBootImage.label();
    let artifact = ctx.downloader().download(
        url,
        &dest,
        DownloadClass::Short,
        &mut |p| ctx.progress(scaled(BOOT_IMAGE_PROGRESS, p.percent), label),
    )?;
    ctx.log(&format!(
        "Downloaded {} boot image ({})",
        plan.selected_image.metadata_name,
        format_bytes(artifact.size)
    ));
    ctx.summary.boot_image_bytes = Some(artifact.size);
    Ok(StepStatus::Completed)
}

fn stage_iso(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let image = ctx
        .boot_image
        .as_ref()
        .map(|guard| guard.path().to_path_buf())
        .ok_or_else(|| InstallError::StagingFailed("no boot image was downloaded".to_string()))?;
    let root = ctx.settings.staging_root();
    let report = IsoStager::new(ctx.hal, ctx.settings, ctx.sink()).stage_contents(&image, &root)?;
    ctx.summary.files_staged = Some(report.files_copied);
    Ok(StepStatus::Completed)
}

fn cleanup_boot_image(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let Some(guard) = ctx.boot_image.take() else {
        return Ok(StepStatus::Skipped("no temporary image".to_string()));
    };
    let path = guard.path().display().to_string();
    guard.remove()?;
    ctx.log(&format!("Removed {}", path));
    Ok(StepStatus::Completed)
}

/// Keep only the final path component of a catalog-supplied file name.
fn plain_file_name(name: &str) -> InstallResult<PathBuf> {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| InstallError::Validation(format!("invalid installer file name '{}'", name)))
}

fn download_installer(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let plan = ctx.plan;
    let Some((url, file_name)) = plan.selected_image.installer() else {
        return Ok(StepStatus::Skipped(
            "no installer image declared for this distribution".to_string(),
        ));
    };
    let dest = ctx.settings.paths.system_root.join(plain_file_name(file_name)?);

    let label = StepId::DownloadInstaller.label();
    let artifact = ctx.downloader().download(
        url,
        &dest,
        DownloadClass::Long,
        &mut |p| ctx.progress(scaled(INSTALLER_PROGRESS, p.percent), label),
    )?;
    ctx.log(&format!(
        "Saved installer image to {} ({})",
        artifact.path.display(),
        format_bytes(artifact.size)
    ));
    ctx.summary.installer_path = Some(artifact.path);
    Ok(StepStatus::Completed)
}

fn write_config(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let config = InstallConfigFile::from_plan(ctx.plan);
    let path = config.write_to(&ctx.settings.staging_root())?;
    ctx.log(&format!("Wrote {}:", path.display()));
    for line in config.loggable() {
        ctx.log(&format!("  {}", line));
    }
    ctx.summary.config_path = Some(path);
    Ok(StepStatus::Completed)
}

/// Fetch every bootloader file or none: files already fetched are removed
/// again when a later one fails.
fn download_bootloader_files(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let settings = ctx.settings;
    let base_url = &settings.downloads.bootloader_base_url;
    let base = Url::parse(base_url).map_err(|e| InstallError::DownloadFailed {
        url: base_url.clone(),
        reason: e.to_string(),
    })?;
    let downloader = ctx.downloader();

    let mut fetched = Vec::with_capacity(settings.downloads.bootloader_files.len());
    for name in &settings.downloads.bootloader_files {
        let url = base.join(name).map_err(|e| InstallError::DownloadFailed {
            url: format!("{}{}", base, name),
            reason: e.to_string(),
        })?;
        let dest = settings.paths.system_root.join(plain_file_name(name)?);
        let guard = TempFileGuard::new(&dest);
        downloader.download(url.as_str(), &dest, DownloadClass::Short, &mut |_| {})?;
        ctx.log(&format!("Downloaded {}", dest.display()));
        fetched.push(guard);
    }
    ctx.summary.bootloader_files = fetched.into_iter().map(TempFileGuard::release).collect();
    Ok(StepStatus::Completed)
}

fn configure_boot_entry(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    let entry = BootConfigurator::new(ctx.hal, ctx.settings, ctx.sink()).configure()?;
    ctx.log(&format!("Boot entry {} added to the boot menu", entry.identifier));
    ctx.summary.boot_entry = Some(entry);
    Ok(StepStatus::Completed)
}

fn complete(ctx: &mut RunContext<'_>) -> InstallResult<StepStatus> {
    for line in ctx.summary.lines() {
        ctx.log(&line);
    }
    Ok(StepStatus::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_follows_step_order_and_policies() {
        let names: Vec<&str> = StepId::ALL.iter().map(StepId::name).collect();
        assert_eq!(names[0], "validate-space");
        assert_eq!(names[14], "done");
        let best_effort: Vec<StepId> = StepId::ALL
            .iter()
            .copied()
            .filter(|s| s.policy() == StepPolicy::BestEffort)
            .collect();
        assert_eq!(
            best_effort,
            vec![
                StepId::ShrinkPhase2,
                StepId::CleanupBootImage,
                StepId::DownloadInstaller,
                StepId::WriteConfig
            ]
        );
    }

    #[test]
    fn progress_marks_never_decrease() {
        let marks: Vec<u8> = StepId::ALL.iter().filter_map(StepId::progress_mark).collect();
        assert!(marks.windows(2).all(|w| w[0] <= w[1]), "{:?}", marks);
        assert_eq!(marks.last(), Some(&100));
    }

    #[test]
    fn download_progress_is_scaled_into_its_band() {
        assert_eq!(scaled(BOOT_IMAGE_PROGRESS, 0), 55);
        assert_eq!(scaled(BOOT_IMAGE_PROGRESS, 50), 67);
        assert_eq!(scaled(BOOT_IMAGE_PROGRESS, 100), 80);
        assert_eq!(scaled(INSTALLER_PROGRESS, 100), 95);
        assert_eq!(scaled(INSTALLER_PROGRESS, 250), 95);
    }

    #[test]
    fn installer_file_name_is_reduced_to_its_last_component() {
        assert_eq!(plain_file_name("mint.iso").unwrap(), PathBuf::from("mint.iso"));
        assert_eq!(
            plain_file_name("../../Windows/mint.iso").unwrap(),
            PathBuf::from("mint.iso")
        );
        assert!(plain_file_name("..").is_err());
    }
}
