use crate::types::WorkloadOutcome;
use rand::Rng;
use std::collections::TryReserveError;
use std::hint::black_box;
use std::io::{self, Write};

const BYTES_IN_MIB: usize = 1 << 20;

/// Allocate `size` bytes and bump `size` randomly chosen bytes by one.
///
/// The access pattern is uniform over the whole buffer, so once the buffer
/// outgrows the caches nearly every increment misses. Running out of memory
/// is reported on `err` and returned as an outcome, never as an error.
pub fn run<R, O, E>(size: usize, rng: &mut R, out: &mut O, err: &mut E) -> io::Result<WorkloadOutcome>
where
    R: Rng + ?Sized,
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    match touch_random_bytes(size, rng) {
        Ok(increments) => {
            writeln!(out, "{} MiB: OK", size / BYTES_IN_MIB)?;
            Ok(WorkloadOutcome::Completed {
                bytes: size,
                increments,
            })
        }
        Err(e) => {
            writeln!(err, "Cannot alloc memory, {} MiB: {}", size / BYTES_IN_MIB, e)?;
            tracing::debug!(size, error = %e, "workload allocation failed");
            Ok(WorkloadOutcome::AllocationFailed {
                requested_bytes: size,
                error: e.to_string(),
            })
        }
    }
}

/// Returns the number of increments performed
fn touch_random_bytes<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<usize, TryReserveError> {
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(size)?;
    buf.resize(size, 0);

    let increments = increment_random(&mut buf, rng);
    // Keep the stores from being optimized away
    black_box(&buf);

    Ok(increments)
}

fn increment_random<R: Rng + ?Sized>(buf: &mut [u8], rng: &mut R) -> usize {
    let len = buf.len();
    if len == 0 {
        return 0;
    }
    for _ in 0..len {
        let idx = rng.random_range(0..len);
        buf[idx] = buf[idx].wrapping_add(1);
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn run_sized(size: usize, seed: u64) -> (WorkloadOutcome, String, String) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = run(size, &mut rng, &mut out, &mut err).unwrap();
        (
            outcome,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_one_mib() {
        let (outcome, out, err) = run_sized(1 << 20, 7);
        assert_eq!(
            outcome,
            WorkloadOutcome::Completed {
                bytes: 1 << 20,
                increments: 1 << 20
            }
        );
        assert_eq!(out, "1 MiB: OK\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_zero_size() {
        let (outcome, out, _) = run_sized(0, 1);
        assert_eq!(
            outcome,
            WorkloadOutcome::Completed {
                bytes: 0,
                increments: 0
            }
        );
        assert_eq!(out, "0 MiB: OK\n");
    }

    #[test]
    fn test_increments_sum_to_size() {
        // No byte gets anywhere near 256 hits at this size, so nothing wraps
        let mut buf = vec![0u8; 4096];
        let n = increment_random(&mut buf, &mut StdRng::seed_from_u64(42));
        let total: usize = buf.iter().map(|&b| b as usize).sum();
        assert_eq!(n, 4096);
        assert_eq!(total, 4096);
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        let (outcome, out, err) = run_sized(usize::MAX, 3);
        assert!(!outcome.is_completed());
        match outcome {
            WorkloadOutcome::AllocationFailed { requested_bytes, .. } => {
                assert_eq!(requested_bytes, usize::MAX)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(out.is_empty());
        assert!(err.starts_with("Cannot alloc memory, "));
    }

    #[test]
    fn test_seeded_runs_agree() {
        let (first, out_a, _) = run_sized(1 << 16, 99);
        let (second, out_b, _) = run_sized(1 << 16, 99);
        assert_eq!(first, second);
        assert_eq!(out_a, out_b);
    }
}
