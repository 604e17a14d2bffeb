//! LinuxGate core library: everything the installer pipeline does to the
//! disk, the network and the boot store, one component per module.

pub mod bootcfg;
pub mod catalog;
pub mod diskpart;
pub mod downloader;
pub mod install_config;
pub mod locale;
pub mod logging;
pub mod parser;
pub mod plan;
pub mod planner;
pub mod settings;
pub mod sink;
pub mod staging;

pub use linuxgate_error::{InstallError, InstallResult};
pub use sink::LogSink;
