//! Command-line front end for LinuxGate.

pub mod cli;
pub mod commands;
pub mod console;

use clap::Parser;
use linuxgate_core::logging;
use linuxgate_core::settings::Settings;
use linuxgate_error::PipelineError;
use linuxgate_hal::WindowsHal;
use linuxgate_workflow::pipeline::DynHal;
use std::io;
use std::sync::Arc;

pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    logging::init_with(Some(cli.log_file.clone().unwrap_or_else(logging::default_log_path)));
    log::info!("🚀 LinuxGate {}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(cli.config.as_deref())?;
    let hal: Arc<DynHal> = Arc::new(WindowsHal::new(
        settings.tools.powershell.clone(),
        settings.tools.xcopy.clone(),
        settings.temp_dir(),
    ));

    match cli.command {
        cli::Command::Catalog { json } => {
            commands::catalog(&settings, json, &mut io::stdout().lock())?;
        }
        cli::Command::Validate { acknowledge } => {
            let gate = commands::validate(
                hal.as_ref(),
                &settings,
                acknowledge,
                &mut io::stdout().lock(),
            )?;
            if !gate.can_proceed() {
                return Err(PipelineError::LayoutNotAcknowledged.into());
            }
        }
        cli::Command::Install(args) => {
            commands::install(hal, settings, &args, io::stdout())?;
        }
        cli::Command::Reboot { yes_i_know } => {
            commands::reboot(hal.as_ref(), &settings, yes_i_know)?;
        }
    }
    Ok(())
}
