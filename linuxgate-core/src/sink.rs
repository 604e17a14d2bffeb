/// Receiver for human-readable progress lines produced while a component works.
///
/// Components report tool output and decisions through this instead of
/// printing; the pipeline forwards them to its status channel.
pub trait LogSink {
    fn line(&self, message: &str);
}

impl<F: Fn(&str)> LogSink for F {
    fn line(&self, message: &str) {
        self(message)
    }
}

/// Sink that only mirrors lines to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnly;

impl LogSink for LogOnly {
    fn line(&self, message: &str) {
        log::info!("{}", message);
    }
}
