use colored_json::{ColorMode, Output};
use papi_try::{counters, error, logging, runner, runtime};
use std::io;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let program = runner::program_name(&args).to_string();

    logging::init();

    // The runtime comes first so every later failure can tear it down
    let mut runtime = match runtime::initialize() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", program, e);
            process::exit(e.exit_code());
        }
    };

    let backend = counters::create_backend();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr();

    let result = runner::execute(
        &args,
        &mut runtime,
        backend,
        &mut rand::rng(),
        &mut stdout,
        &mut stderr,
        ColorMode::Auto(Output::StdOut),
    );

    if let Err(e) = result {
        drop(stdout);
        let code = error::complain(&program, &e, &mut runtime, &mut io::stderr());
        process::exit(code);
    }
}
