use super::{AbortHandle, Runtime};
use crate::error::{DiagError, Result};
use ::mpi::environment::{Threading, Universe};
use ::mpi::traits::*;
use std::sync::Arc;

/// Participant of an MPI job.
///
/// Owns the `Universe`; dropping it in `finalize` is what calls
/// `MPI_Finalize`.
pub struct MpiRuntime {
    universe: Option<Universe>,
    rank: i32,
    size: i32,
    threading: Threading,
}

impl MpiRuntime {
    pub fn initialize() -> Result<Self> {
        // The watchdog calls MPI_Abort from its own thread
        let (universe, threading) = ::mpi::initialize_with_threading(Threading::Multiple)
            .ok_or_else(|| DiagError::RuntimeInit("MPI_Init failed.  MPI is required.".into()))?;

        let world = universe.world();
        let rank = world.rank();
        let size = world.size();
        if !abort_is_thread_safe(threading) {
            tracing::warn!(
                rank,
                ?threading,
                "MPI lacks MPI_THREAD_MULTIPLE, watchdog will exit without MPI_Abort"
            );
        }
        tracing::debug!(rank, size, ?threading, "MPI initialized");

        Ok(Self {
            universe: Some(universe),
            rank,
            size,
            threading,
        })
    }
}

impl Runtime for MpiRuntime {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn barrier(&self) {
        if let Some(universe) = &self.universe {
            universe.world().barrier();
        }
    }

    fn abort_handle(&self) -> AbortHandle {
        if !abort_is_thread_safe(self.threading) {
            // The caller's process exit is left for the launcher to notice
            return Arc::new(|_code: i32| {});
        }
        Arc::new(|code: i32| unsafe {
            // MPI_Abort on the world communicator takes every rank down,
            // not just the one whose watchdog fired.
            ::mpi::ffi::MPI_Abort(::mpi::ffi::RSMPI_COMM_WORLD, code);
        })
    }

    fn finalize(&mut self) {
        if let Some(universe) = self.universe.take() {
            tracing::debug!(rank = self.rank, "finalizing MPI");
            drop(universe);
        }
    }
}

/// Only `MPI_THREAD_MULTIPLE` allows an MPI call from the watchdog thread
/// while the main thread may be inside a barrier
fn abort_is_thread_safe(threading: Threading) -> bool {
    threading == Threading::Multiple
}
