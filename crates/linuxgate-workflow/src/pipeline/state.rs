use linuxgate_error::PipelineError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

/// Live state of the one pipeline run a process may have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub current_step_index: usize,
    pub percent: u8,
    pub is_running: bool,
    pub last_error: Option<String>,
}

pub(crate) type SharedState = Arc<Mutex<PipelineState>>;

pub(crate) fn lock(state: &Mutex<PipelineState>) -> MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds `is_running` for as long as it lives.
pub(crate) struct RunGuard {
    state: SharedState,
}

impl RunGuard {
    pub(crate) fn acquire(state: &SharedState) -> Result<Self, PipelineError> {
        let mut current = lock(state);
        if current.is_running {
            return Err(PipelineError::AlreadyRunning);
        }
        *current = PipelineState {
            is_running: true,
            ..PipelineState::default()
        };
        drop(current);
        Ok(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut current = lock(&self.state);
        if thread::panicking() {
            current.percent = 0;
            current
                .last_error
                .get_or_insert_with(|| "installation worker panicked".to_string());
        }
        current.is_running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let state = SharedState::default();
        let guard = RunGuard::acquire(&state).unwrap();
        assert!(lock(&state).is_running);
        assert!(matches!(
            RunGuard::acquire(&state),
            Err(PipelineError::AlreadyRunning)
        ));
        drop(guard);
        assert!(!lock(&state).is_running);
        assert!(RunGuard::acquire(&state).is_ok());
    }

    #[test]
    fn acquire_resets_previous_run() {
        let state = SharedState::default();
        {
            let mut s = lock(&state);
            s.percent = 100;
            s.current_step_index = 7;
            s.last_error = Some("previous failure".into());
        }
        let _guard = RunGuard::acquire(&state).unwrap();
        let s = lock(&state);
        assert_eq!(s.current_step_index, 0);
        assert_eq!(s.percent, 0);
        assert_eq!(s.last_error, None);
    }

    #[test]
    fn panic_while_running_clears_the_flag() {
        let state = SharedState::default();
        let worker_state = Arc::clone(&state);
        let result = thread::spawn(move || {
            let _guard = RunGuard::acquire(&worker_state).unwrap();
            lock(&worker_state).percent = 40;
            panic!("step blew up");
        })
        .join();

        assert!(result.is_err());
        let s = lock(&state);
        assert!(!s.is_running);
        assert_eq!(s.percent, 0);
        assert!(s.last_error.is_some());
    }
}
