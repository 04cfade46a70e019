use crate::error::{DiagError, Result};
use crate::runtime::AbortHandle;
use std::io::Write;
use std::process;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Aborts the job unless dropped before the deadline.
///
/// A supervisor thread waits on a channel with a timeout. Dropping the guard
/// closes the channel, which wakes the supervisor and lets it exit quietly.
pub struct Watchdog {
    disarm: Option<Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm the default action: report on stderr, abort the whole job, exit 1.
    /// `None` arms nothing.
    pub fn arm(
        timeout: Option<Duration>,
        program: &str,
        rank: i32,
        abort: AbortHandle,
    ) -> Result<Self> {
        let Some(timeout) = timeout else {
            return Ok(Self::disarmed());
        };

        let program = program.to_string();
        Self::with_action(timeout, move || {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(
                stderr,
                "{}: watchdog expired after {} secs (rank {})",
                program,
                timeout.as_secs(),
                rank
            );
            let _ = stderr.flush();
            abort(1);
            process::exit(1);
        })
    }

    /// Run `action` on the supervisor thread if `timeout` elapses first
    pub fn with_action<F>(timeout: Duration, action: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let supervisor = thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || match rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::error!(timeout_secs = timeout.as_secs(), "watchdog expired");
                    action();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::trace!("watchdog disarmed");
                }
            })
            .map_err(DiagError::Watchdog)?;

        tracing::debug!(timeout_secs = timeout.as_secs(), "watchdog armed");
        Ok(Self {
            disarm: Some(tx),
            supervisor: Some(supervisor),
        })
    }

    fn disarmed() -> Self {
        Self {
            disarm: None,
            supervisor: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.supervisor.is_some()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        drop(self.disarm.take());
        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_fires_after_timeout() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let dog = Watchdog::with_action(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        assert!(dog.is_armed());

        thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_disarms() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let dog = Watchdog::with_action(Duration::from_secs(60), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        // Returns promptly: the supervisor wakes on disconnect
        drop(dog);
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_zero_timeout_arms_nothing() {
        let abort: AbortHandle = Arc::new(|_code: i32| panic!("must not abort"));
        let dog = Watchdog::arm(None, "papi-try", 0, abort).unwrap();
        assert!(!dog.is_armed());
    }
}
