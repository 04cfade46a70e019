use crate::config::RunConfig;
use crate::types::{CounterSample, DiagnosticReport};
use colored_json::ColorMode;
use std::io::{self, Write};

/// Print the resolved options. Only rank 0 calls this.
pub fn print_banner<W: Write + ?Sized>(config: &RunConfig, out: &mut W) -> io::Result<()> {
    writeln!(out, "== Program options:")?;
    for (i, event) in config.events.iter().enumerate() {
        // Pad the label so the `=` signs line up with the fixed rows below
        let label = format!("event[{}]", i);
        writeln!(out, " > {:<10} = {}", label, event)?;
    }
    writeln!(out, " > MPI_rank   = {}", config.rank)?;
    writeln!(out, " > MPI_size   = {}", config.world_size)?;
    writeln!(out, " > timeout    = {} secs", config.timeout_secs)?;
    writeln!(out)?;
    Ok(())
}

/// Print `name: value` for every event, framed by blank lines
pub fn write_report<W: Write + ?Sized>(counters: &[CounterSample], out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    for sample in counters {
        writeln!(out, "{}: {}", sample.event, sample.value)?;
    }
    writeln!(out)?;
    Ok(())
}

/// Print the whole report as pretty JSON
pub fn write_json<W: Write + ?Sized>(
    report: &DiagnosticReport,
    out: &mut W,
    color: ColorMode,
) -> io::Result<()> {
    let json = colored_json::to_colored_json(report, color)?;
    writeln!(out, "{}", json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::types::{RunState, WorkloadOutcome};

    fn config(events: &[&str], rank: i32, size: i32, timeout_secs: u64) -> RunConfig {
        RunConfig {
            program: "papi-try".into(),
            world_size: size,
            rank,
            timeout_secs,
            events: events.iter().map(|e| e.to_string()).collect(),
            buffer_size: 1 << 20,
            output: OutputFormat::Text,
        }
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_banner_layout() {
        let cfg = config(&["PAPI_TOT_INS", "PAPI_L1_DCM"], 0, 4, 30);
        let text = render(|out| print_banner(&cfg, out));
        assert_eq!(
            text,
            "== Program options:\n \
             > event[0]   = PAPI_TOT_INS\n \
             > event[1]   = PAPI_L1_DCM\n \
             > MPI_rank   = 0\n \
             > MPI_size   = 4\n \
             > timeout    = 30 secs\n\n"
        );
    }

    #[test]
    fn test_banner_lists_events_in_order() {
        for n in 1..=16 {
            let names: Vec<String> = (0..n).map(|i| format!("r{:x}", 0x100 + i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let cfg = config(&refs, 0, 1, 120);
            let text = render(|out| print_banner(&cfg, out));

            let listed: Vec<&str> = text
                .lines()
                .filter(|l| l.starts_with(" > event["))
                .map(|l| l.rsplit(" = ").next().unwrap())
                .collect();
            assert_eq!(listed, refs);
        }
    }

    #[test]
    fn test_report_lines() {
        let samples = vec![
            CounterSample {
                event: "PAPI_TOT_INS".into(),
                value: 1234,
            },
            CounterSample {
                event: "PAPI_L1_DCM".into(),
                value: -1,
            },
        ];
        let text = render(|out| write_report(&samples, out));
        assert_eq!(text, "\nPAPI_TOT_INS: 1234\nPAPI_L1_DCM: -1\n\n");
    }

    #[test]
    fn test_empty_report() {
        let text = render(|out| write_report(&[], out));
        assert_eq!(text, "\n\n");
    }

    #[test]
    fn test_json_without_color_parses() {
        let mut state = RunState::new();
        state.counters.push(CounterSample {
            event: "cycles".into(),
            value: 42,
        });
        let report = state.into_report(
            0,
            1,
            1 << 20,
            WorkloadOutcome::Completed {
                bytes: 1 << 20,
                increments: 1 << 20,
            },
        );

        let text = render(|out| write_json(&report, out, ColorMode::Off));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["counters"][0]["event"], "cycles");
        assert_eq!(value["counters"][0]["value"], 42);
        assert_eq!(value["workload"]["status"], "completed");
    }
}
