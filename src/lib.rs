pub mod cli;
pub mod config;
pub mod counters;
pub mod error;
pub mod logging;
pub mod reporter;
pub mod runner;
pub mod runtime;
pub mod types;
pub mod watchdog;
pub mod workload;
