//! CLI argument parsing for LinuxGate

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "linuxgate", version)]
#[command(about = "🐧 LinuxGate - make room for Linux next to Windows")]
#[command(long_about = "🐧 LinuxGate - make room for Linux next to Windows\n\n\
    Shrinks the Windows partition, creates a small FAT32 boot partition holding the\n\
    chosen distribution's boot image, and adds an \"Install Linux\" entry to the\n\
    Windows boot menu. The Linux installer takes over after a restart.\n\n\
    Must be run from an elevated prompt.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (TOML); built-in defaults when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log file (default: %TEMP%\linuxgate\linuxgate.log)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 📋 List the distributions offered by the catalog
    Catalog {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// 🔍 Check that the system disk has the expected layout
    Validate {
        /// Accept layout warnings (exit successfully anyway)
        #[arg(long)]
        acknowledge: bool,
    },

    /// 💾 Prepare the disk and boot menu for installing Linux
    Install(InstallArgs),

    /// 🔁 Restart the computer now
    Reboot {
        /// Confirm the restart
        #[arg(long)]
        yes_i_know: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct InstallArgs {
    /// Distribution name as listed by `linuxgate catalog`
    #[arg(long)]
    pub distro: String,

    /// Space for Linux in GB (at least 30); recommended from free space when omitted
    #[arg(long)]
    pub size_gb: Option<f64>,

    /// Linux account name (lowercase letters, digits and '-')
    #[arg(long)]
    pub username: String,

    /// Linux host name (lowercase letters, digits and '-')
    #[arg(long)]
    pub hostname: String,

    /// Linux account password
    #[arg(long, env = "LINUXGATE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Language for the installed system: en, fr, es or ja
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// IANA timezone (e.g. Europe/Paris); taken from Windows when omitted
    #[arg(long)]
    pub timezone: Option<String>,

    /// Keyboard layout (e.g. fr); the language's layout when omitted
    #[arg(long)]
    pub keyboard: Option<String>,

    /// Continue even though the layout check reported warnings
    #[arg(long)]
    pub acknowledge_layout: bool,

    /// Confirm destructive operation (required)
    #[arg(long)]
    pub yes_i_know: bool,
}
