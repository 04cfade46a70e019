use std::fmt;
use thiserror::Error;

pub mod events;
mod session;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

pub use events::{EventCode, EventKind};
pub use session::{CounterSession, SessionState};

#[cfg(target_os = "linux")]
pub use linux::PerfBackend as PlatformBackend;
#[cfg(not(target_os = "linux"))]
pub use unsupported::UnsupportedBackend as PlatformBackend;

/// Subsystem calls, named the way they show up in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOp {
    LibraryInit,
    ThreadInit,
    CreateEventSet,
    AddEvents,
    Start,
    Reset,
    Read,
    Shutdown,
}

impl fmt::Display for CounterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CounterOp::LibraryInit => "library init",
            CounterOp::ThreadInit => "thread init",
            CounterOp::CreateEventSet => "create event set",
            CounterOp::AddEvents => "add events",
            CounterOp::Start => "start",
            CounterOp::Reset => "reset",
            CounterOp::Read => "read",
            CounterOp::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("performance counters are not supported: {0}")]
    NotSupported(String),

    #[error("no such event")]
    NoSuchEvent,

    #[error("hardware cannot count {requested} events at once{}", capacity_note(.capacity))]
    CapacityExceeded {
        requested: usize,
        capacity: Option<usize>,
    },

    #[error("event set is {found}, expected {expected}")]
    InvalidState {
        expected: SessionState,
        found: SessionState,
    },

    #[error("called from a thread that did not register with the counter library")]
    WrongThread,

    #[error("{context}: {source}")]
    Os {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn capacity_note(capacity: &Option<usize>) -> String {
    match capacity {
        Some(max) => format!(" (at most {max} fit)"),
        None => String::new(),
    }
}

impl CounterError {
    pub fn os(context: impl Into<String>, source: std::io::Error) -> Self {
        CounterError::Os {
            context: context.into(),
            source,
        }
    }
}

/// One call per operation of a hardware performance-counter library.
///
/// The session drives these in a fixed order; an implementation only has to
/// perform the call, never to police the order.
pub trait CounterBackend {
    fn library_init(&mut self) -> Result<(), CounterError>;

    /// Register the calling thread as the only one that will use the session
    fn thread_init(&mut self) -> Result<(), CounterError>;

    /// Map an event name to something the backend can count
    fn resolve(&self, name: &str) -> Result<EventCode, CounterError> {
        events::lookup(name).ok_or(CounterError::NoSuchEvent)
    }

    fn create_event_set(&mut self) -> Result<(), CounterError>;

    /// Add every code to the event set in one go. Either all of them are
    /// counted together or the call fails.
    fn add_events(&mut self, codes: &[EventCode]) -> Result<(), CounterError>;

    fn start(&mut self) -> Result<(), CounterError>;

    /// Zero every counter without stopping them
    fn reset(&mut self) -> Result<(), CounterError>;

    /// Current values, in the order the codes were added
    fn read(&mut self) -> Result<Vec<i64>, CounterError>;

    fn shutdown(&mut self) -> Result<(), CounterError>;
}

impl<B: CounterBackend + ?Sized> CounterBackend for &mut B {
    fn library_init(&mut self) -> Result<(), CounterError> {
        (**self).library_init()
    }

    fn thread_init(&mut self) -> Result<(), CounterError> {
        (**self).thread_init()
    }

    fn resolve(&self, name: &str) -> Result<EventCode, CounterError> {
        (**self).resolve(name)
    }

    fn create_event_set(&mut self) -> Result<(), CounterError> {
        (**self).create_event_set()
    }

    fn add_events(&mut self, codes: &[EventCode]) -> Result<(), CounterError> {
        (**self).add_events(codes)
    }

    fn start(&mut self) -> Result<(), CounterError> {
        (**self).start()
    }

    fn reset(&mut self) -> Result<(), CounterError> {
        (**self).reset()
    }

    fn read(&mut self) -> Result<Vec<i64>, CounterError> {
        (**self).read()
    }

    fn shutdown(&mut self) -> Result<(), CounterError> {
        (**self).shutdown()
    }
}

/// Create the counter backend for this platform
pub fn create_backend() -> PlatformBackend {
    PlatformBackend::new()
}
