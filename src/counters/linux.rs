use super::{CounterBackend, CounterError, EventCode, EventKind};
use anyhow::{Context, Result};
use libc::{c_int, c_uint};
use perf_event_open_sys::bindings::{
    perf_event_attr, perf_event_ioc_flags_PERF_IOC_FLAG_GROUP,
    perf_event_read_format_PERF_FORMAT_GROUP, perf_event_read_format_PERF_FORMAT_TOTAL_TIME_ENABLED,
    perf_event_read_format_PERF_FORMAT_TOTAL_TIME_RUNNING, perf_type_id_PERF_TYPE_HARDWARE,
    perf_type_id_PERF_TYPE_HW_CACHE, perf_type_id_PERF_TYPE_RAW, perf_type_id_PERF_TYPE_SOFTWARE,
    PERF_FLAG_FD_CLOEXEC,
};
use perf_event_open_sys::{ioctls, perf_event_open};
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd};
use std::thread::{self, ThreadId};

const PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";

/// Busy work run between enable and disable while probing a group
const PROBE_SPINS: u64 = 100_000;

/// Counter backend built on `perf_event_open(2)`.
///
/// All events of the set form one perf group led by the first event, so they
/// are scheduled onto the PMU together and read with a single `read(2)`.
/// Counting is restricted to user space on the registering thread.
pub struct PerfBackend {
    initialized: bool,
    owner: Option<ThreadId>,
    /// Group leader first
    group: Option<Vec<File>>,
}

/// One `read(2)` of a group opened with `PERF_FORMAT_GROUP` and both
/// time fields
#[derive(Debug)]
struct GroupReading {
    time_enabled: u64,
    time_running: u64,
    values: Vec<u64>,
}

impl GroupReading {
    /// The kernel enabled the group but never got it onto the PMU
    fn never_scheduled(&self) -> bool {
        self.time_enabled > 0 && self.time_running == 0
    }
}

impl PerfBackend {
    pub fn new() -> Self {
        Self {
            initialized: false,
            owner: None,
            group: None,
        }
    }

    fn check_thread(&self) -> Result<(), CounterError> {
        match self.owner {
            Some(owner) if owner == thread::current().id() => Ok(()),
            _ => Err(CounterError::WrongThread),
        }
    }

    fn leader(&self) -> Result<&File, CounterError> {
        self.group
            .as_ref()
            .and_then(|group| group.first())
            .ok_or_else(|| CounterError::os("event set", io::Error::from(io::ErrorKind::NotFound)))
    }
}

impl Default for PerfBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterBackend for PerfBackend {
    fn library_init(&mut self) -> Result<(), CounterError> {
        let paranoid = read_paranoid_level().map_err(|e| CounterError::NotSupported(format!("{e:#}")))?;
        // Level 3 and above (a Debian/Android patch) refuse unprivileged users
        // outright; anything lower still allows user-space self-monitoring.
        let privileged = unsafe { libc::geteuid() } == 0;
        if paranoid > 2 && !privileged {
            tracing::warn!(paranoid, "perf_event_paranoid is restrictive, opening events may fail");
        } else {
            tracing::debug!(paranoid, "perf events available");
        }
        self.initialized = true;
        Ok(())
    }

    fn thread_init(&mut self) -> Result<(), CounterError> {
        if !self.initialized {
            return Err(CounterError::NotSupported("library not initialized".into()));
        }
        self.owner = Some(thread::current().id());
        Ok(())
    }

    fn create_event_set(&mut self) -> Result<(), CounterError> {
        self.check_thread()?;
        self.group = Some(Vec::new());
        Ok(())
    }

    fn add_events(&mut self, codes: &[EventCode]) -> Result<(), CounterError> {
        self.check_thread()?;
        if codes.is_empty() {
            return Ok(());
        }

        let group = open_group(codes)?;
        let reading = probe(&group)?;
        if reading.never_scheduled() {
            let capacity = schedulable_prefix(codes);
            tracing::debug!(requested = codes.len(), ?capacity, "event group does not fit the PMU");
            return Err(CounterError::CapacityExceeded {
                requested: codes.len(),
                capacity,
            });
        }

        self.group = Some(group);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CounterError> {
        self.check_thread()?;
        let leader = self.leader()?;
        group_ioctl(leader, ioctls::RESET, "reset")?;
        group_ioctl(leader, ioctls::ENABLE, "enable")
    }

    fn reset(&mut self) -> Result<(), CounterError> {
        self.check_thread()?;
        group_ioctl(self.leader()?, ioctls::RESET, "reset")
    }

    fn read(&mut self) -> Result<Vec<i64>, CounterError> {
        self.check_thread()?;
        let count = self.group.as_ref().map_or(0, Vec::len);
        if count == 0 {
            return Ok(Vec::new());
        }

        let reading = read_group(self.leader()?, count)?;
        if reading.never_scheduled() {
            return Err(CounterError::CapacityExceeded {
                requested: count,
                capacity: None,
            });
        }
        if reading.time_running < reading.time_enabled {
            tracing::warn!(
                enabled = reading.time_enabled,
                running = reading.time_running,
                "event group was multiplexed, values are partial"
            );
        }

        Ok(reading.values.into_iter().map(|v| v as i64).collect())
    }

    fn shutdown(&mut self) -> Result<(), CounterError> {
        let result = match self.group.as_ref().and_then(|group| group.first()) {
            Some(leader) => group_ioctl(leader, ioctls::DISABLE, "disable"),
            None => Ok(()),
        };
        // Closing the descriptors releases the PMU
        self.group = None;
        self.owner = None;
        self.initialized = false;
        result
    }
}

fn read_paranoid_level() -> Result<i32> {
    let content = fs::read_to_string(PARANOID_PATH)
        .context(format!("Failed to read {}", PARANOID_PATH))?;
    content
        .trim()
        .parse::<i32>()
        .context(format!("Failed to parse {}", PARANOID_PATH))
}

fn perf_type(kind: EventKind) -> u32 {
    match kind {
        EventKind::Hardware => perf_type_id_PERF_TYPE_HARDWARE,
        EventKind::Software => perf_type_id_PERF_TYPE_SOFTWARE,
        EventKind::HwCache => perf_type_id_PERF_TYPE_HW_CACHE,
        EventKind::Raw => perf_type_id_PERF_TYPE_RAW,
    }
}

fn open_event(code: &EventCode, group_fd: c_int) -> Result<File, CounterError> {
    let mut attrs = perf_event_attr {
        size: std::mem::size_of::<perf_event_attr>() as u32,
        type_: perf_type(code.kind),
        config: code.config,
        read_format: u64::from(
            perf_event_read_format_PERF_FORMAT_GROUP
                | perf_event_read_format_PERF_FORMAT_TOTAL_TIME_ENABLED
                | perf_event_read_format_PERF_FORMAT_TOTAL_TIME_RUNNING,
        ),
        ..perf_event_attr::default()
    };
    // Only the leader starts disabled; members follow it
    attrs.set_disabled(u64::from(group_fd == -1));
    attrs.set_exclude_kernel(1);
    attrs.set_exclude_hv(1);

    // pid 0 / cpu -1: the calling thread, on whichever CPU it runs
    let fd = unsafe { perf_event_open(&mut attrs, 0, -1, group_fd, PERF_FLAG_FD_CLOEXEC.into()) };
    if fd < 0 {
        return Err(CounterError::os(
            format!("perf_event_open({:?} {:#x})", code.kind, code.config),
            io::Error::last_os_error(),
        ));
    }
    Ok(unsafe { File::from_raw_fd(fd) })
}

fn open_group(codes: &[EventCode]) -> Result<Vec<File>, CounterError> {
    let mut group: Vec<File> = Vec::with_capacity(codes.len());
    for (index, code) in codes.iter().enumerate() {
        let leader_fd = group.first().map_or(-1, |leader| leader.as_raw_fd());
        match open_event(code, leader_fd) {
            Ok(fd) => group.push(fd),
            Err(err) if index > 0 && rejected_by_group(&err) => {
                // The kernel validates the whole group when a member joins
                let opens_alone = open_event(code, -1).is_ok();
                return Err(member_failure(err, index, codes.len(), opens_alone));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(group)
}

/// EINVAL or ENOSPC from joining a group, the errors x86 and ARM PMU
/// drivers return when the group no longer fits the counters
fn rejected_by_group(err: &CounterError) -> bool {
    match err {
        CounterError::Os { source, .. } => {
            matches!(source.raw_os_error(), Some(libc::EINVAL) | Some(libc::ENOSPC))
        }
        _ => false,
    }
}

/// An event that opens on its own but not as member `index` means the first
/// `index` events are all the hardware can count together
fn member_failure(err: CounterError, index: usize, requested: usize, opens_alone: bool) -> CounterError {
    if opens_alone {
        tracing::debug!(index, requested, "group rejected at open, PMU full");
        CounterError::CapacityExceeded {
            requested,
            capacity: Some(index),
        }
    } else {
        err
    }
}

fn group_ioctl(
    leader: &File,
    op: unsafe fn(c_int, c_uint) -> c_int,
    what: &str,
) -> Result<(), CounterError> {
    let rv = unsafe { op(leader.as_raw_fd(), perf_event_ioc_flags_PERF_IOC_FLAG_GROUP) };
    if rv < 0 {
        return Err(CounterError::os(
            format!("ioctl({})", what),
            io::Error::last_os_error(),
        ));
    }
    Ok(())
}

fn read_group(leader: &File, count: usize) -> Result<GroupReading, CounterError> {
    // nr, time_enabled, time_running, then one value per member
    let mut buf = vec![0u8; (3 + count) * 8];
    let n = (&*leader)
        .read(&mut buf)
        .map_err(|e| CounterError::os("read(event group)", e))?;
    if n != buf.len() {
        return Err(CounterError::os(
            format!("read(event group): short read of {} bytes", n),
            io::Error::from(io::ErrorKind::UnexpectedEof),
        ));
    }

    let words: Vec<u64> = buf
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_ne_bytes(word)
        })
        .collect();

    Ok(GroupReading {
        time_enabled: words[1],
        time_running: words[2],
        values: words[3..3 + count.min(words[0] as usize)].to_vec(),
    })
}

/// Run the group briefly and report what the kernel made of it
fn probe(group: &[File]) -> Result<GroupReading, CounterError> {
    let leader = &group[0];
    group_ioctl(leader, ioctls::ENABLE, "enable")?;
    for i in 0..PROBE_SPINS {
        std::hint::black_box(i);
    }
    group_ioctl(leader, ioctls::DISABLE, "disable")?;
    read_group(leader, group.len())
}

/// Largest leading run of `codes` that the PMU schedules as one group
fn schedulable_prefix(codes: &[EventCode]) -> Option<usize> {
    (1..codes.len()).rev().find(|&len| {
        open_group(&codes[..len])
            .and_then(|group| probe(&group))
            .map(|reading| !reading.never_scheduled())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_require_registered_thread() {
        let mut backend = PerfBackend::new();
        assert!(matches!(backend.create_event_set(), Err(CounterError::WrongThread)));
    }

    #[test]
    fn test_thread_init_requires_library_init() {
        let mut backend = PerfBackend::new();
        assert!(backend.thread_init().is_err());
    }

    #[test]
    fn test_other_thread_is_rejected() {
        let mut backend = PerfBackend::new();
        backend.initialized = true;
        backend.thread_init().unwrap();

        let owner = backend.owner;
        let result = thread::spawn(move || {
            let other = PerfBackend {
                initialized: true,
                owner,
                group: None,
            };
            other.check_thread().is_err()
        })
        .join()
        .unwrap();
        assert!(result);
        assert!(backend.check_thread().is_ok());
    }

    fn open_error(errno: i32) -> CounterError {
        CounterError::os("perf_event_open(Hardware 0x4)", io::Error::from_raw_os_error(errno))
    }

    #[test]
    fn test_group_rejection_errnos() {
        assert!(rejected_by_group(&open_error(libc::EINVAL)));
        assert!(rejected_by_group(&open_error(libc::ENOSPC)));
        assert!(!rejected_by_group(&open_error(libc::ENOENT)));
        assert!(!rejected_by_group(&open_error(libc::EACCES)));
        assert!(!rejected_by_group(&CounterError::WrongThread));
    }

    #[test]
    fn test_full_group_reports_ceiling() {
        let err = member_failure(open_error(libc::EINVAL), 4, 6, true);
        assert!(matches!(
            err,
            CounterError::CapacityExceeded {
                requested: 6,
                capacity: Some(4)
            }
        ));
        assert_eq!(err.to_string(), "hardware cannot count 6 events at once (at most 4 fit)");
    }

    #[test]
    fn test_unsupported_member_keeps_os_error() {
        let err = member_failure(open_error(libc::EINVAL), 2, 3, false);
        match err {
            CounterError::Os { source, .. } => assert_eq!(source.raw_os_error(), Some(libc::EINVAL)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shutdown_without_group() {
        let mut backend = PerfBackend::new();
        assert!(backend.shutdown().is_ok());
    }

    #[test]
    fn test_software_event_counts() {
        // Software events need no PMU, so this works in most VMs; skip where
        // perf is locked down entirely.
        let mut backend = PerfBackend::new();
        if backend.library_init().is_err() {
            return;
        }
        backend.thread_init().unwrap();
        backend.create_event_set().unwrap();
        let task_clock = crate::counters::events::lookup("task-clock").unwrap();
        if backend.add_events(&[task_clock]).is_err() {
            return;
        }
        backend.start().unwrap();
        let mut sum = 0u64;
        for i in 0..1_000_000u64 {
            sum = std::hint::black_box(sum.wrapping_add(i));
        }
        let values = backend.read().unwrap();
        assert_eq!(values.len(), 1);
        assert!(values[0] > 0);
        backend.shutdown().unwrap();
    }
}
