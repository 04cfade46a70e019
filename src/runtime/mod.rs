use crate::error::Result;
use std::sync::Arc;

mod local;
#[cfg(feature = "mpi")]
mod cluster;

pub use local::LocalRuntime;
#[cfg(feature = "mpi")]
pub use cluster::MpiRuntime;

#[cfg(not(feature = "mpi"))]
pub use local::LocalRuntime as PlatformRuntime;
#[cfg(feature = "mpi")]
pub use cluster::MpiRuntime as PlatformRuntime;

/// Callback that tears down the whole distributed job with the given status.
///
/// Must be callable from any thread, since the watchdog fires off the main
/// thread.
pub type AbortHandle = Arc<dyn Fn(i32) + Send + Sync>;

/// The distributed-process runtime every participant belongs to
pub trait Runtime {
    /// Zero-based identity of this participant
    fn rank(&self) -> i32;

    /// Number of cooperating participants
    fn size(&self) -> i32;

    /// Block until every participant has arrived
    fn barrier(&self);

    fn abort_handle(&self) -> AbortHandle;

    /// Release the runtime. Calling it more than once is a no-op.
    fn finalize(&mut self);
}

/// Bring up the runtime this binary was built for
pub fn initialize() -> Result<PlatformRuntime> {
    PlatformRuntime::initialize()
}
