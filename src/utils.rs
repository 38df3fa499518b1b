//! Clock and /proc helpers.

use std::fs;

/// Reads `clock_id` in nanoseconds, or 0 if the clock is unavailable.
pub fn get_clock_value(clock_id: libc::c_int) -> u64 {
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    if unsafe { libc::clock_gettime(clock_id, &mut ts) } != 0 {
        return 0;
    }
    (ts.tv_sec as u64 * 1_000_000_000) + ts.tv_nsec as u64
}

/// Capture timestamps are CLOCK_MONOTONIC, like the producers'.
pub fn monotonic_timestamp_ns() -> u64 {
    get_clock_value(libc::CLOCK_MONOTONIC)
}

pub fn unix_timestamp_ns() -> u64 {
    get_clock_value(libc::CLOCK_REALTIME)
}

/// Executable of a running process, empty if it cannot be read (e.g. it exited).
pub fn process_executable_path(pid: u32) -> String {
    fs::read_link(format!("/proc/{pid}/exe"))
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Short process name from /proc/<pid>/comm.
pub fn process_name(pid: u32) -> String {
    fs::read_to_string(format!("/proc/{pid}/comm"))
        .map(|comm| comm.trim_end().to_string())
        .unwrap_or_default()
}
