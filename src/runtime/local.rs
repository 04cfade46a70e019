use super::{AbortHandle, Runtime};
use crate::error::Result;
use std::sync::Arc;

/// A job made of exactly one participant.
///
/// Used when the binary is built without the `mpi` feature; barrier and
/// finalize have nothing to synchronize with.
#[derive(Debug, Default)]
pub struct LocalRuntime {
    finalized: bool,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize() -> Result<Self> {
        tracing::debug!("running as a single local participant");
        Ok(Self::new())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Runtime for LocalRuntime {
    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn barrier(&self) {}

    fn abort_handle(&self) -> AbortHandle {
        // Nobody else to take down; the caller exits the process itself
        Arc::new(|_code: i32| {})
    }

    fn finalize(&mut self) {
        self.finalized = true;
    }
}
