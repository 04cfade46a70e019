use crate::counters::{CounterError, CounterOp};
use crate::runtime::Runtime;
use std::io::Write;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, DiagError>;

/// Every condition that ends a run early.
///
/// All of them terminate the job with status 1; the variants only decide
/// what gets printed and by whom.
#[derive(Error, Debug)]
pub enum DiagError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    RuntimeInit(String),

    #[error("counter {op}: {source}")]
    Counter {
        op: CounterOp,
        #[source]
        source: CounterError,
    },

    #[error("unable to resolve event {index} ({name}): {source}")]
    UnknownEvent {
        index: usize,
        name: String,
        #[source]
        source: CounterError,
    },

    #[error("unable to arm watchdog: {0}")]
    Watchdog(#[source] std::io::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl DiagError {
    pub fn counter(op: CounterOp, source: CounterError) -> Self {
        DiagError::Counter { op, source }
    }

    /// Usage errors are only printed by rank 0 so an N-rank job does not
    /// repeat the same message N times.
    pub fn root_only(&self) -> bool {
        matches!(self, DiagError::Usage(_))
    }

    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Report a fatal error, tear down the runtime and hand back the exit status.
///
/// This is the single place where a run is abandoned. The caller is expected
/// to pass the returned code to `std::process::exit`.
pub fn complain<R>(program: &str, err: &DiagError, runtime: &mut R, stderr: &mut dyn Write) -> i32
where
    R: Runtime + ?Sized,
{
    if !err.root_only() || runtime.rank() == 0 {
        let _ = writeln!(stderr, "{}: {}", program, err);
        let _ = stderr.flush();
    }
    tracing::debug!(rank = runtime.rank(), error = ?err, "aborting run");

    runtime.finalize();
    err.exit_code()
}
