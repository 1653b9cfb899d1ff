//! Resident memory probe reported in heartbeats.

#[cfg(target_os = "linux")]
const PROC_STATUS: &str = "/proc/self/status";

/// Resident set size of the current process in KiB, or 0 when unknown.
#[must_use]
pub fn resident_set_kib() -> u64 {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string(PROC_STATUS)
            .ok()
            .and_then(|status| parse_vm_rss(&status))
            .unwrap_or(0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

#[cfg(any(target_os = "linux", test))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        line.strip_prefix("VmRSS:")
            .and_then(|value| value.split_whitespace().next())
            .and_then(|token| token.parse::<u64>().ok())
    })
}
