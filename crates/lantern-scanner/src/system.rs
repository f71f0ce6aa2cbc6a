//! CPU and memory gauges for the progress monitor.
//!
//! Gauges are sampled on demand. CPU usage is the busy share of CPU time
//! since the previous sample, so the first reading covers the time since
//! boot.
//!
//! # Platform Support
//!
//! - **Linux**: Parses `/proc/stat` and `/proc/meminfo`
//! - **Other platforms**: Both gauges read 0

use parking_lot::Mutex;

/// Cumulative CPU times from `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

/// Samples system-wide CPU and memory usage.
#[derive(Debug, Default)]
pub struct SystemMonitor {
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl SystemMonitor {
    /// Create a monitor with no previous CPU sample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU usage in percent (0-100) since the previous call.
    pub fn cpu_usage(&self) -> f64 {
        let Some(current) = read_cpu_times() else {
            return 0.0;
        };

        let previous = self.last_cpu.lock().replace(current).unwrap_or_default();
        cpu_percent(previous, current)
    }

    /// Memory usage in percent (0-100).
    #[must_use]
    pub fn memory_usage(&self) -> f64 {
        read_meminfo().map_or(0.0, |content| memory_percent(&content))
    }
}

fn cpu_percent(previous: CpuTimes, current: CpuTimes) -> f64 {
    let total = current.total.saturating_sub(previous.total);
    if total == 0 {
        return 0.0;
    }
    let idle = current.idle.saturating_sub(previous.idle);
    #[allow(clippy::cast_precision_loss)]
    let busy = total.saturating_sub(idle) as f64 / total as f64;
    busy * 100.0
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Format: `cpu  user nice system idle iowait irq softirq steal ...`
fn parse_cpu_line(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();

    if fields.len() < 4 {
        return None;
    }

    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: fields.iter().sum(),
    })
}

fn memory_percent(meminfo: &str) -> f64 {
    let mut total = None;
    let mut available = None;

    for line in meminfo.lines() {
        // Format: "MemTotal:       16384000 kB"
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next().and_then(|v| v.parse::<u64>().ok())) {
            (Some("MemTotal:"), Some(kb)) => total = Some(kb),
            (Some("MemAvailable:"), Some(kb)) => available = Some(kb),
            _ => {}
        }
    }

    match (total, available) {
        (Some(total), Some(available)) if total > 0 => {
            #[allow(clippy::cast_precision_loss)]
            let used = total.saturating_sub(available) as f64 / total as f64;
            used * 100.0
        }
        _ => 0.0,
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_times() -> Option<CpuTimes> {
    std::fs::read_to_string("/proc/stat")
        .ok()
        .and_then(|content| parse_cpu_line(&content))
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_times() -> Option<CpuTimes> {
    None
}

#[cfg(target_os = "linux")]
fn read_meminfo() -> Option<String> {
    std::fs::read_to_string("/proc/meminfo").ok()
}

#[cfg(not(target_os = "linux"))]
fn read_meminfo() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_line() {
        let stat = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";
        let times = parse_cpu_line(stat).expect("parse cpu line");
        assert_eq!(times.idle, 850);
        assert_eq!(times.total, 1000);
    }

    #[test]
    fn test_parse_cpu_line_malformed() {
        assert_eq!(parse_cpu_line("intr 1 2 3"), None);
        assert_eq!(parse_cpu_line("cpu  1 2"), None);
    }

    #[test]
    fn test_cpu_percent_delta() {
        let previous = CpuTimes { idle: 800, total: 1000 };
        let current = CpuTimes { idle: 850, total: 1200 };
        // 200 ticks elapsed, 50 idle
        assert!((cpu_percent(previous, current) - 75.0).abs() < f64::EPSILON);
        assert!(cpu_percent(current, current).abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_percent() {
        let meminfo = "MemTotal:       1000 kB\nMemFree:         100 kB\nMemAvailable:    250 kB\n";
        assert!((memory_percent(meminfo) - 75.0).abs() < f64::EPSILON);
        assert!(memory_percent("MemFree: 1 kB").abs() < f64::EPSILON);
    }

    #[test]
    fn test_gauges_in_range() {
        let monitor = SystemMonitor::new();
        let cpu = monitor.cpu_usage();
        let memory = monitor.memory_usage();
        assert!((0.0..=100.0).contains(&cpu));
        assert!((0.0..=100.0).contains(&memory));
    }
}
