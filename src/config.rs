use crate::cli::Cli;
use crate::error::{DiagError, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Upper bound on events per run; longer lists are rejected, not truncated
pub const MAX_EVENTS: usize = 16;

/// Size of the workload buffer (1 MiB)
pub const BUFFER_SIZE: usize = 1 << 20;

pub const DEFAULT_EVENTS: [&str; 4] = ["PAPI_TOT_INS", "PAPI_L1_DCM", "PAPI_L3_TCM", "PAPI_TLB_DM"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// What the command line asked for
#[derive(Debug)]
pub enum Invocation {
    Run(Cli),
    /// `--help` or `--version`; the rendered text to print
    Info(String),
}

/// Settings for one run, fixed before any measuring starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub program: String,
    pub world_size: i32,
    pub rank: i32,
    pub timeout_secs: u64,
    pub events: Vec<String>,
    pub buffer_size: usize,
    pub output: OutputFormat,
}

impl RunConfig {
    /// Validate parsed options against the runtime's view of this process
    pub fn resolve(program: &str, cli: Cli, rank: i32, world_size: i32) -> Result<Self> {
        if world_size < 1 {
            return Err(DiagError::RuntimeInit(format!("bad MPI size {}", world_size)));
        }
        if rank < 0 || rank >= world_size {
            return Err(DiagError::RuntimeInit(format!(
                "bad MPI rank {} for size {}",
                rank, world_size
            )));
        }

        let timeout_secs = u64::try_from(cli.timeout).map_err(|_| usage_error("bad timeout"))?;

        let events = if cli.events.is_empty() {
            DEFAULT_EVENTS.iter().map(|e| e.to_string()).collect()
        } else if cli.events.len() > MAX_EVENTS {
            return Err(usage_error(&format!(
                "too many events: {} given, at most {} supported",
                cli.events.len(),
                MAX_EVENTS
            )));
        } else {
            cli.events
        };

        Ok(Self {
            program: program.to_string(),
            world_size,
            rank,
            timeout_secs,
            events,
            buffer_size: BUFFER_SIZE,
            output: if cli.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
        })
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// `None` when the watchdog is disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Parse the command line. Parse failures become usage errors so they exit
/// with status 1 like every other failure.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Invocation::Run(cli)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Ok(Invocation::Info(e.render().to_string()))
        }
        Err(e) => Err(DiagError::Usage(e.render().to_string().trim_end().to_string())),
    }
}

fn usage_error(msg: &str) -> DiagError {
    let usage = Cli::command().render_usage().to_string();
    DiagError::Usage(format!("{}\n{}", msg, usage.trim_end()))
}
