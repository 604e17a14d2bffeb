//! Status channel between the pipeline worker and the front end.
//!
//! Every producer holds a cloned [`StatusSender`]; one aggregator thread owns
//! the receiving end and is the only code that calls the [`StatusConsumer`],
//! so log lines reach it strictly in the order they were sent.

use linuxgate_core::LogSink;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Progress { percent: u8, label: String },
    Log(String),
    Finished { success: bool },
}

/// Receives status on the aggregator thread.
pub trait StatusConsumer: Send {
    fn on_progress(&mut self, percent: u8, label: &str);
    fn on_log(&mut self, line: &str);
    fn on_finished(&mut self, _success: bool) {}
}

#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: Sender<StatusEvent>,
}

impl StatusSender {
    fn send(&self, event: StatusEvent) {
        // A consumer that went away must not stop the installation.
        if self.tx.send(event).is_err() {
            log::debug!("status consumer disconnected");
        }
    }

    pub fn progress(&self, percent: u8, label: &str) {
        log::debug!("progress {}%: {}", percent, label);
        self.send(StatusEvent::Progress {
            percent: percent.min(100),
            label: label.to_string(),
        });
    }

    pub fn log(&self, line: &str) {
        log::info!("{}", line);
        self.send(StatusEvent::Log(line.to_string()));
    }

    pub fn finished(&self, success: bool) {
        self.send(StatusEvent::Finished { success });
    }
}

impl LogSink for StatusSender {
    fn line(&self, message: &str) {
        self.log(message);
    }
}

pub fn channel() -> (StatusSender, Receiver<StatusEvent>) {
    let (tx, rx) = mpsc::channel();
    (StatusSender { tx }, rx)
}

/// Handle to the aggregator thread; joining hands the consumer back.
pub struct StatusAggregator<C> {
    handle: JoinHandle<C>,
}

impl<C: StatusConsumer + 'static> StatusAggregator<C> {
    /// Drain `rx` into `consumer` until every sender is dropped.
    pub fn spawn(rx: Receiver<StatusEvent>, mut consumer: C) -> Self {
        let handle = thread::spawn(move || {
            for event in rx {
                match event {
                    StatusEvent::Progress { percent, label } => {
                        consumer.on_progress(percent, &label)
                    }
                    StatusEvent::Log(line) => consumer.on_log(&line),
                    StatusEvent::Finished { success } => consumer.on_finished(success),
                }
            }
            consumer
        });
        Self { handle }
    }

    /// Wait for the channel to close. `None` if the consumer panicked.
    pub fn join(self) -> Option<C> {
        self.handle.join().ok()
    }
}

/// Consumer that keeps every event, for tests and scripted callers.
#[derive(Debug, Default, Clone)]
pub struct CollectingConsumer {
    pub events: Vec<StatusEvent>,
}

impl CollectingConsumer {
    pub fn percents(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Progress { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Log(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl StatusConsumer for CollectingConsumer {
    fn on_progress(&mut self, percent: u8, label: &str) {
        self.events.push(StatusEvent::Progress {
            percent,
            label: label.to_string(),
        });
    }

    fn on_log(&mut self, line: &str) {
        self.events.push(StatusEvent::Log(line.to_string()));
    }

    fn on_finished(&mut self, success: bool) {
        self.events.push(StatusEvent::Finished { success });
    }
}
