//! Progress tracking for transfers

use std::time::{Duration, Instant};

/// Default interval between two progress reports
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(200);

/// Progress information for a transfer
#[derive(Debug, Clone)]
pub struct Progress {
    /// Total size in bytes (0 when the server did not say)
    pub total_size: u64,
    /// Number of bytes received so far
    pub downloaded_size: u64,
    /// Progress as a percentage (0.0 to 100.0), 0 when total is unknown
    pub percent: f64,
    /// Current speed in bytes per second
    pub speed: Option<f64>,
    /// Time when the transfer started
    pub start_time: Instant,
}

impl Progress {
    /// Create a new progress tracker
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            downloaded_size: 0,
            percent: 0.0,
            speed: None,
            start_time: Instant::now(),
        }
    }

    /// Update progress with the new received size
    pub fn update(&mut self, downloaded_size: u64) {
        self.downloaded_size = downloaded_size;
        self.percent = if self.total_size > 0 {
            (downloaded_size as f64 / self.total_size as f64) * 100.0
        } else {
            0.0
        };

        let elapsed = self.start_time.elapsed();
        if elapsed.as_millis() > 0 {
            self.speed = Some(downloaded_size as f64 / elapsed.as_secs_f64());
        }
    }

    /// Whether the total size is known
    pub fn has_total(&self) -> bool {
        self.total_size > 0
    }

    /// One-line summary: `42.00% (3.50 MB)` or `3.50 MB` when total is unknown
    pub fn summary(&self) -> String {
        let mb = self.downloaded_size as f64 / 1024.0 / 1024.0;
        if self.has_total() {
            format!("{:6.2}% ({:.2} MB)", self.percent, mb)
        } else {
            format!("{:.2} MB", mb)
        }
    }
}

/// Rate limiter for progress reports, independent of chunk boundaries
#[derive(Debug)]
pub struct ReportThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ReportThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true when enough time has passed since the last report
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

impl Default for ReportThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.ln() / THRESHOLD.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
