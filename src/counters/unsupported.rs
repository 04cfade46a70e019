use super::{CounterBackend, CounterError, EventCode};

/// Stand-in for platforms without a counter interface; initialization
/// always fails, so a run ends with a clear message instead of zeros.
#[derive(Debug, Default)]
pub struct UnsupportedBackend;

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self
    }

    fn unsupported() -> CounterError {
        CounterError::NotSupported(format!("not supported on this platform ({})", std::env::consts::OS))
    }
}

impl CounterBackend for UnsupportedBackend {
    fn library_init(&mut self) -> Result<(), CounterError> {
        Err(Self::unsupported())
    }

    fn thread_init(&mut self) -> Result<(), CounterError> {
        Err(Self::unsupported())
    }

    fn create_event_set(&mut self) -> Result<(), CounterError> {
        Err(Self::unsupported())
    }

    fn add_events(&mut self, _codes: &[EventCode]) -> Result<(), CounterError> {
        Err(Self::unsupported())
    }

    fn start(&mut self) -> Result<(), CounterError> {
        Err(Self::unsupported())
    }

    fn reset(&mut self) -> Result<(), CounterError> {
        Err(Self::unsupported())
    }

    fn read(&mut self) -> Result<Vec<i64>, CounterError> {
        Err(Self::unsupported())
    }

    fn shutdown(&mut self) -> Result<(), CounterError> {
        Ok(())
    }
}
