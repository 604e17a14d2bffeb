use std::path::PathBuf;

/// Default log file under the user's temp directory.
pub fn default_log_path() -> PathBuf {
    std::env::temp_dir().join("linuxgate").join("linuxgate.log")
}

/// Initialise `env_logger` once for the process.
///
/// Logs go to `path` when the file can be opened for appending and to stderr
/// otherwise. `RUST_LOG` overrides the default `info` level.
pub fn init_with(path: Option<PathBuf>) {
    use env_logger::Target;
    use std::fs;
    use std::io;

    let target = path
        .and_then(|path| {
            (|| -> io::Result<Target> {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)?;
                Ok(Target::Pipe(Box::new(file)))
            })()
            .ok()
        })
        .unwrap_or(Target::Stderr);

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(target)
        .try_init();
}
