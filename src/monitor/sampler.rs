//! Process memory and CPU sampling.

#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;

#[cfg_attr(test, automock)]
pub trait SystemSampler: Send + Sync + 'static {
    /// Resident memory of this process in MB.
    fn memory_mb(&self) -> f64;

    /// CPU used by this process since the previous call, as a percentage of
    /// one core.
    fn cpu_percent(&self) -> f64;
}

/// Samples the current process from `/proc` on Linux. Other platforms
/// report 0 for every resource.
#[derive(Debug, Default)]
pub struct ProcessSampler {
    last_cpu: Mutex<Option<(std::time::Instant, f64)>>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SystemSampler for ProcessSampler {
    fn memory_mb(&self) -> f64 {
        process::resident_memory_bytes()
            .map(|bytes| bytes as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    fn cpu_percent(&self) -> f64 {
        let Some(cpu_secs) = process::cpu_seconds() else {
            return 0.0;
        };
        let now = std::time::Instant::now();
        let previous = self.last_cpu.lock().replace((now, cpu_secs));

        match previous {
            Some((at, prev_secs)) => {
                let wall = now.duration_since(at).as_secs_f64();
                if wall <= 0.0 {
                    return 0.0;
                }
                ((cpu_secs - prev_secs) / wall * 100.0).max(0.0)
            }
            None => 0.0,
        }
    }
}

mod process {
    #[cfg(target_os = "linux")]
    use std::fs;

    pub(super) fn resident_memory_bytes() -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            let data = fs::read_to_string("/proc/self/statm").ok()?;
            let resident: u64 = data.split_whitespace().nth(1)?.parse().ok()?;
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if page_size <= 0 {
                return None;
            }
            Some(resident * page_size as u64)
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    /// User plus system CPU time consumed so far.
    pub(super) fn cpu_seconds() -> Option<f64> {
        #[cfg(target_os = "linux")]
        {
            let data = fs::read_to_string("/proc/self/stat").ok()?;
            parse_cpu_ticks(&data).and_then(|ticks| {
                let clk_tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
                (clk_tck > 0).then(|| ticks as f64 / clk_tck as f64)
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    /// `utime + stime` from a `/proc/<pid>/stat` line. The command name may
    /// contain spaces, so fields are counted from the closing parenthesis.
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    pub(crate) fn parse_cpu_ticks(stat: &str) -> Option<u64> {
        let rest = &stat[stat.rfind(')')? + 1..];
        let mut fields = rest.split_whitespace().skip(11);
        let utime: u64 = fields.next()?.parse().ok()?;
        let stime: u64 = fields.next()?.parse().ok()?;
        Some(utime + stime)
    }
}

#[cfg(test)]
pub(crate) use process::parse_cpu_ticks;
