//! Plain-text status output for the command line.

use linuxgate_workflow::StatusConsumer;
use std::io::Write;

/// Prints progress changes and log lines as they arrive.
pub struct ConsoleStatus<W: Write + Send> {
    out: W,
    last: Option<(u8, String)>,
}

impl<W: Write + Send> ConsoleStatus<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> StatusConsumer for ConsoleStatus<W> {
    fn on_progress(&mut self, percent: u8, label: &str) {
        let current = (percent, label.to_string());
        if self.last.as_ref() == Some(&current) {
            return;
        }
        let _ = writeln!(self.out, "[{:>3}%] {}", percent, label);
        self.last = Some(current);
    }

    fn on_log(&mut self, line: &str) {
        let _ = writeln!(self.out, "       {}", line);
    }

    fn on_finished(&mut self, success: bool) {
        let _ = if success {
            writeln!(
                self.out,
                "✅ Ready. Restart and choose \"Install Linux\" to continue."
            )
        } else {
            writeln!(self.out, "❌ Installation stopped. See the log for details.")
        };
        let _ = self.out.flush();
    }
}
