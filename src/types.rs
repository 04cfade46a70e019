use chrono::{DateTime, Utc};
use serde::Serialize;

/// Value of one event at the end of the measured interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterSample {
    pub event: String,
    pub value: i64,
}

/// How the memory workload went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkloadOutcome {
    Completed { bytes: usize, increments: usize },
    AllocationFailed { requested_bytes: usize, error: String },
}

impl WorkloadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkloadOutcome::Completed { .. })
    }
}

/// Everything one rank measured
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub rank: i32,
    pub world_size: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub buffer_size_bytes: usize,
    pub workload: WorkloadOutcome,
    pub counters: Vec<CounterSample>,
}

/// Accumulated state while a rank is measuring
#[derive(Debug)]
pub struct RunState {
    pub start_time: DateTime<Utc>,
    pub counters: Vec<CounterSample>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            counters: Vec::new(),
        }
    }

    pub fn into_report(
        self,
        rank: i32,
        world_size: i32,
        buffer_size_bytes: usize,
        workload: WorkloadOutcome,
    ) -> DiagnosticReport {
        let end_time = Utc::now();
        let duration_seconds = (end_time - self.start_time).num_milliseconds() as f64 / 1000.0;

        DiagnosticReport {
            rank,
            world_size,
            start_time: self.start_time,
            end_time,
            duration_seconds,
            buffer_size_bytes,
            workload,
            counters: self.counters,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_report_keeps_counter_order() {
        let mut state = RunState::new();
        state.counters = vec![
            CounterSample {
                event: "b".into(),
                value: 2,
            },
            CounterSample {
                event: "a".into(),
                value: 1,
            },
        ];

        let workload = WorkloadOutcome::Completed {
            bytes: 16,
            increments: 16,
        };
        let report = state.into_report(3, 4, 16, workload);
        assert_eq!(report.rank, 3);
        assert_eq!(report.world_size, 4);
        assert_eq!(report.counters[0].event, "b");
        assert_eq!(report.counters[1].event, "a");
        assert!(report.duration_seconds >= 0.0);
        assert!(report.end_time >= report.start_time);
    }

    #[test]
    fn test_workload_outcome_json_shape() {
        let outcome = WorkloadOutcome::AllocationFailed {
            requested_bytes: 1 << 20,
            error: "out of memory".into(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "allocation_failed");
        assert_eq!(value["requested_bytes"], 1 << 20);
        assert!(!outcome.is_completed());
    }
}
