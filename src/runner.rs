use crate::config::{self, Invocation, OutputFormat, RunConfig};
use crate::counters::{CounterBackend, CounterSession};
use crate::error::Result;
use crate::reporter;
use crate::runtime::Runtime;
use crate::types::{DiagnosticReport, RunState};
use crate::watchdog::Watchdog;
use crate::workload;
use colored_json::ColorMode;
use rand::Rng;
use std::io::Write;

pub const DEFAULT_PROGRAM: &str = "papi-try";

/// Name to prefix messages with: `argv[0]`, or the binary name if absent
pub fn program_name(args: &[String]) -> &str {
    args.first().map_or(DEFAULT_PROGRAM, String::as_str)
}

/// Measure one pass of the workload on the calling thread.
///
/// Counters are zeroed right before the workload and read right after it.
/// An allocation failure does not stop the pass: the counters are still
/// sampled and the session is still shut down.
pub fn run_diagnostic<B, R, O, E>(
    config: &RunConfig,
    backend: B,
    rng: &mut R,
    out: &mut O,
    err: &mut E,
) -> Result<DiagnosticReport>
where
    B: CounterBackend,
    R: Rng + ?Sized,
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    let mut state = RunState::new();

    let mut session = CounterSession::configure(backend, &config.events)?;
    session.start()?;
    session.reset()?;

    let outcome = workload::run(config.buffer_size, rng, out, err)?;
    if !outcome.is_completed() {
        tracing::warn!(rank = config.rank, "workload did not run, counters cover setup only");
    }

    state.counters = session.sample()?;
    session.shutdown()?;

    Ok(state.into_report(config.rank, config.world_size, config.buffer_size, outcome))
}

/// Run the whole tool for one participant.
///
/// On success the runtime has been through its barrier and is finalized.
/// On error nothing has been synchronized; the caller hands the error to
/// `error::complain`, which finalizes.
pub fn execute<RT, B, R>(
    args: &[String],
    runtime: &mut RT,
    backend: B,
    rng: &mut R,
    out: &mut dyn Write,
    err: &mut dyn Write,
    color: ColorMode,
) -> Result<()>
where
    RT: Runtime + ?Sized,
    B: CounterBackend,
    R: Rng + ?Sized,
{
    let program = program_name(args);

    let cli = match config::parse_args(args)? {
        Invocation::Run(cli) => cli,
        Invocation::Info(text) => {
            if runtime.rank() == 0 {
                write!(out, "{}", text)?;
                out.flush()?;
            }
            runtime.barrier();
            runtime.finalize();
            return Ok(());
        }
    };
    let config = RunConfig::resolve(program, cli, runtime.rank(), runtime.size())?;

    if config.is_root() {
        reporter::print_banner(&config, out)?;
        out.flush()?;
    }

    let watchdog = Watchdog::arm(
        config.timeout(),
        &config.program,
        config.rank,
        runtime.abort_handle(),
    )?;

    let report = run_diagnostic(&config, backend, rng, out, err)?;
    match config.output {
        OutputFormat::Text => reporter::write_report(&report.counters, out)?,
        OutputFormat::Json => reporter::write_json(&report, out, color)?,
    }
    out.flush()?;

    // A participant stuck in the barrier still trips the watchdog
    runtime.barrier();
    drop(watchdog);

    tracing::debug!(rank = config.rank, "run complete");
    runtime.finalize();
    Ok(())
}
