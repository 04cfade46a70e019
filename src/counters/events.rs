//! Event-name resolution.
//!
//! Names come in three spellings: PAPI preset names (`PAPI_TOT_INS`), the
//! aliases the Linux `perf` tool prints (`instructions`, `dTLB-load-misses`),
//! and raw hardware codes written `r<hex>` (`r01c2`). All of them resolve to
//! an [`EventCode`], which is what a backend actually programs.

use regex::Regex;
use std::sync::LazyLock;

/// Which counter space an event lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Generalized hardware events (cycles, instructions, ...)
    Hardware,
    /// Kernel-provided counters (page faults, context switches, ...)
    Software,
    /// Cache events, `config` packs `cache | op << 8 | result << 16`
    HwCache,
    /// Model-specific encoding passed through untouched
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode {
    pub kind: EventKind,
    pub config: u64,
}

impl EventCode {
    pub const fn new(kind: EventKind, config: u64) -> Self {
        Self { kind, config }
    }
}

// Values follow the kernel's perf_event ABI (include/uapi/linux/perf_event.h)
mod hw {
    pub const CPU_CYCLES: u64 = 0;
    pub const INSTRUCTIONS: u64 = 1;
    pub const CACHE_REFERENCES: u64 = 2;
    pub const CACHE_MISSES: u64 = 3;
    pub const BRANCH_INSTRUCTIONS: u64 = 4;
    pub const BRANCH_MISSES: u64 = 5;
    pub const STALLED_CYCLES_FRONTEND: u64 = 7;
    pub const STALLED_CYCLES_BACKEND: u64 = 8;
    pub const REF_CPU_CYCLES: u64 = 9;
}

mod sw {
    pub const CPU_CLOCK: u64 = 0;
    pub const TASK_CLOCK: u64 = 1;
    pub const PAGE_FAULTS: u64 = 2;
    pub const CONTEXT_SWITCHES: u64 = 3;
    pub const PAGE_FAULTS_MIN: u64 = 5;
    pub const PAGE_FAULTS_MAJ: u64 = 6;
}

mod cache {
    pub const L1D: u64 = 0;
    pub const L1I: u64 = 1;
    pub const LL: u64 = 2;
    pub const DTLB: u64 = 3;
    pub const ITLB: u64 = 4;

    pub const OP_READ: u64 = 0;
    pub const RESULT_MISS: u64 = 1;
}

const fn read_miss(cache: u64) -> u64 {
    cache | (cache::OP_READ << 8) | (cache::RESULT_MISS << 16)
}

const fn hardware(config: u64) -> EventCode {
    EventCode::new(EventKind::Hardware, config)
}

const fn software(config: u64) -> EventCode {
    EventCode::new(EventKind::Software, config)
}

const fn hw_cache(config: u64) -> EventCode {
    EventCode::new(EventKind::HwCache, config)
}

const NAMED_EVENTS: &[(&str, EventCode)] = &[
    // PAPI presets
    ("PAPI_TOT_INS", hardware(hw::INSTRUCTIONS)),
    ("PAPI_TOT_CYC", hardware(hw::CPU_CYCLES)),
    ("PAPI_REF_CYC", hardware(hw::REF_CPU_CYCLES)),
    ("PAPI_BR_INS", hardware(hw::BRANCH_INSTRUCTIONS)),
    ("PAPI_BR_MSP", hardware(hw::BRANCH_MISSES)),
    ("PAPI_L1_DCM", hw_cache(read_miss(cache::L1D))),
    ("PAPI_L1_ICM", hw_cache(read_miss(cache::L1I))),
    ("PAPI_L3_TCA", hardware(hw::CACHE_REFERENCES)),
    ("PAPI_L3_TCM", hardware(hw::CACHE_MISSES)),
    ("PAPI_TLB_DM", hw_cache(read_miss(cache::DTLB))),
    ("PAPI_TLB_IM", hw_cache(read_miss(cache::ITLB))),
    ("PAPI_STL_ICY", hardware(hw::STALLED_CYCLES_FRONTEND)),
    ("PAPI_RES_STL", hardware(hw::STALLED_CYCLES_BACKEND)),
    // perf tool aliases
    ("instructions", hardware(hw::INSTRUCTIONS)),
    ("cycles", hardware(hw::CPU_CYCLES)),
    ("ref-cycles", hardware(hw::REF_CPU_CYCLES)),
    ("branches", hardware(hw::BRANCH_INSTRUCTIONS)),
    ("branch-misses", hardware(hw::BRANCH_MISSES)),
    ("cache-references", hardware(hw::CACHE_REFERENCES)),
    ("cache-misses", hardware(hw::CACHE_MISSES)),
    ("L1-dcache-load-misses", hw_cache(read_miss(cache::L1D))),
    ("L1-icache-load-misses", hw_cache(read_miss(cache::L1I))),
    ("LLC-load-misses", hw_cache(read_miss(cache::LL))),
    ("dTLB-load-misses", hw_cache(read_miss(cache::DTLB))),
    ("iTLB-load-misses", hw_cache(read_miss(cache::ITLB))),
    ("page-faults", software(sw::PAGE_FAULTS)),
    ("minor-faults", software(sw::PAGE_FAULTS_MIN)),
    ("major-faults", software(sw::PAGE_FAULTS_MAJ)),
    ("context-switches", software(sw::CONTEXT_SWITCHES)),
    ("cpu-clock", software(sw::CPU_CLOCK)),
    ("task-clock", software(sw::TASK_CLOCK)),
];

static RAW_EVENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^r([0-9a-fA-F]{1,16})$").expect("raw event pattern is valid"));

/// Resolve an event name, or `None` if nothing by that name exists
pub fn lookup(name: &str) -> Option<EventCode> {
    if let Some((_, code)) = NAMED_EVENTS.iter().find(|(known, _)| *known == name) {
        return Some(*code);
    }

    let hex = RAW_EVENT.captures(name)?.get(1)?.as_str();
    let config = u64::from_str_radix(hex, 16).ok()?;
    Some(EventCode::new(EventKind::Raw, config))
}

/// Every symbolic name `lookup` understands, in table order
pub fn known_names() -> impl Iterator<Item = &'static str> {
    NAMED_EVENTS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_papi_presets() {
        assert_eq!(lookup("PAPI_TOT_INS"), Some(hardware(hw::INSTRUCTIONS)));
        assert_eq!(lookup("PAPI_L3_TCM"), Some(hardware(hw::CACHE_MISSES)));
        assert_eq!(lookup("PAPI_L1_DCM"), Some(EventCode::new(EventKind::HwCache, 0x10000)));
        assert_eq!(lookup("PAPI_TLB_DM"), Some(EventCode::new(EventKind::HwCache, 0x10003)));
    }

    #[test]
    fn test_perf_aliases_match_presets() {
        assert_eq!(lookup("instructions"), lookup("PAPI_TOT_INS"));
        assert_eq!(lookup("dTLB-load-misses"), lookup("PAPI_TLB_DM"));
        assert_eq!(lookup("page-faults"), Some(software(sw::PAGE_FAULTS)));
    }

    #[test]
    fn test_raw_codes() {
        assert_eq!(lookup("r01c2"), Some(EventCode::new(EventKind::Raw, 0x01c2)));
        assert_eq!(lookup("rFFFF"), Some(EventCode::new(EventKind::Raw, 0xffff)));
        assert_eq!(lookup("r"), None);
        assert_eq!(lookup("r12345678901234567"), None);
        assert_eq!(lookup("rxyz"), None);
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(lookup(""), None);
        assert_eq!(lookup("PAPI_NOT_REAL"), None);
        // Names are case-sensitive, like PAPI's
        assert_eq!(lookup("papi_tot_ins"), None);
    }

    #[test]
    fn test_known_names_are_unique() {
        let mut names: Vec<_> = known_names().collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
