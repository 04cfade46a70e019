use super::{CounterBackend, CounterError, CounterOp, EventCode};
use crate::error::{DiagError, Result};
use crate::types::CounterSample;
use std::fmt;

/// Where a counting session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Configured,
    Running,
    Reset,
    Sampled,
    Shutdown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Configured => "configured",
            SessionState::Running => "running",
            SessionState::Reset => "reset",
            SessionState::Sampled => "sampled",
            SessionState::Shutdown => "shut down",
        };
        f.write_str(name)
    }
}

/// A set of named events being counted on the current thread.
///
/// Moves strictly forward through
/// `Configured -> Running -> Reset -> Sampled -> Shutdown`. Whatever state
/// the session is left in, dropping it shuts the backend down.
pub struct CounterSession<B: CounterBackend> {
    backend: B,
    events: Vec<String>,
    state: SessionState,
}

impl<B: CounterBackend> CounterSession<B> {
    /// Initialize the backend and register every named event as one set.
    ///
    /// Fails on the first name that does not resolve; nothing is skipped.
    pub fn configure(mut backend: B, events: &[String]) -> Result<Self> {
        backend
            .library_init()
            .map_err(|e| DiagError::counter(CounterOp::LibraryInit, e))?;
        backend
            .thread_init()
            .map_err(|e| DiagError::counter(CounterOp::ThreadInit, e))?;

        let codes = events
            .iter()
            .enumerate()
            .map(|(index, name)| {
                backend.resolve(name).map_err(|source| {
                    tracing::info!(
                        known = ?super::events::known_names().collect::<Vec<_>>(),
                        "event names also accept raw codes as r<hex>"
                    );
                    DiagError::UnknownEvent {
                        index,
                        name: name.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<EventCode>>>()?;

        backend
            .create_event_set()
            .map_err(|e| DiagError::counter(CounterOp::CreateEventSet, e))?;
        backend
            .add_events(&codes)
            .map_err(|e| DiagError::counter(CounterOp::AddEvents, e))?;

        tracing::debug!(events = ?events, "event set configured");

        Ok(Self {
            backend,
            events: events.to_vec(),
            state: SessionState::Configured,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start(&mut self) -> Result<()> {
        self.require_state(CounterOp::Start, &[SessionState::Configured])?;
        self.backend
            .start()
            .map_err(|e| DiagError::counter(CounterOp::Start, e))?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// Zero every counter. The session keeps counting.
    pub fn reset(&mut self) -> Result<()> {
        self.require_state(CounterOp::Reset, &[SessionState::Running, SessionState::Reset])?;
        self.backend
            .reset()
            .map_err(|e| DiagError::counter(CounterOp::Reset, e))?;
        self.state = SessionState::Reset;
        Ok(())
    }

    /// Read one value per configured event, in the order they were requested
    pub fn sample(&mut self) -> Result<Vec<CounterSample>> {
        self.require_state(
            CounterOp::Read,
            &[SessionState::Running, SessionState::Reset, SessionState::Sampled],
        )?;
        let values = self
            .backend
            .read()
            .map_err(|e| DiagError::counter(CounterOp::Read, e))?;

        if values.len() != self.events.len() {
            return Err(DiagError::counter(
                CounterOp::Read,
                CounterError::os(
                    format!("expected {} values, got {}", self.events.len(), values.len()),
                    std::io::Error::from(std::io::ErrorKind::InvalidData),
                ),
            ));
        }

        self.state = SessionState::Sampled;
        Ok(self
            .events
            .iter()
            .zip(values)
            .map(|(event, value)| CounterSample {
                event: event.clone(),
                value,
            })
            .collect())
    }

    /// Release the session
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Shutdown {
            return Ok(());
        }
        self.state = SessionState::Shutdown;
        self.backend
            .shutdown()
            .map_err(|e| DiagError::counter(CounterOp::Shutdown, e))
    }

    fn require_state(&self, op: CounterOp, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DiagError::counter(
                op,
                CounterError::InvalidState {
                    expected: allowed[0],
                    found: self.state,
                },
            ))
        }
    }
}

impl<B: CounterBackend> Drop for CounterSession<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("{}", e);
        }
    }
}
