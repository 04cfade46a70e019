use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "papi-try")]
#[command(about = "Check hardware performance counters and memory on every rank of a job", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Watchdog timeout in seconds (0 disables the watchdog)
    #[arg(short, long, default_value_t = 120, allow_negative_numbers = true)]
    pub timeout: i64,

    /// Print the per-rank report as JSON
    #[arg(long)]
    pub json: bool,

    /// Hardware events to count, e.g. PAPI_TOT_INS or cache-misses
    #[arg(value_name = "EVENT")]
    pub events: Vec<String>,
}
