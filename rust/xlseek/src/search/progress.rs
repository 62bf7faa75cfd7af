use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use std::collections::VecDeque;
use std::time::{
    Duration,
    Instant,
};
use tracing::info;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})";
const ETA_SAMPLES: usize = 10;

/// `"NN% processed (read of total)"`, or a plain count when the total is
/// not known.
pub fn progress_line(read: u64, total: u64) -> String {
    if total == 0 {
        return format!("{read} scans processed");
    }
    let pct = (read.min(total) * 100) / total;
    format!("{pct}% processed ({read} of {total})")
}

/// Recent `(time, count)` samples, used to estimate the time left.
#[derive(Debug, Clone, Default)]
pub struct ProgressSamples {
    samples: VecDeque<(Instant, u64)>,
}

impl ProgressSamples {
    pub fn record(&mut self, at: Instant, count: u64) {
        if self.samples.len() == ETA_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back((at, count));
    }

    /// Items per second over the retained samples.
    pub fn rate(&self) -> Option<f64> {
        let (t0, c0) = self.samples.front()?;
        let (t1, c1) = self.samples.back()?;
        let secs = t1.saturating_duration_since(*t0).as_secs_f64();
        if secs <= 0.0 || c1 <= c0 {
            return None;
        }
        Some((c1 - c0) as f64 / secs)
    }

    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.rate()?;
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }
}

/// Logs progress on a fixed cadence and optionally drives a progress bar.
#[derive(Debug)]
pub struct ProgressReporter {
    cadence: Duration,
    last_report: Option<Instant>,
    samples: ProgressSamples,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(cadence: Duration) -> Self {
        Self {
            cadence,
            last_report: None,
            samples: ProgressSamples::default(),
            bar: None,
        }
    }

    pub fn with_bar(mut self) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            bar.set_style(style);
        }
        self.bar = Some(bar);
        self
    }

    pub fn update(&mut self, read: u64, total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(total.max(read));
            bar.set_position(read);
        }
        let now = Instant::now();
        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) >= self.cadence);
        if !due {
            return;
        }
        self.last_report = Some(now);
        self.samples.record(now, read);
        let eta = self.samples.eta(total.saturating_sub(read));
        match eta {
            Some(eta) if total > read => {
                info!("{} eta {}s", progress_line(read, total), eta.as_secs())
            }
            _ => info!("{}", progress_line(read, total)),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line() {
        assert_eq!(progress_line(25, 100), "25% processed (25 of 100)");
        assert_eq!(progress_line(7, 0), "7 scans processed");
        assert_eq!(progress_line(120, 100), "100% processed (120 of 100)");
    }

    #[test]
    fn test_eta_from_recent_samples() {
        let t0 = Instant::now();
        let mut samples = ProgressSamples::default();
        assert!(samples.eta(10).is_none());
        // Early slow samples fall out of the window.
        samples.record(t0, 0);
        for i in 1..=10u64 {
            samples.record(t0 + Duration::from_secs(100 + i), 100 + i * 10);
        }
        assert_eq!(samples.rate(), Some(10.0));
        assert_eq!(samples.eta(50), Some(Duration::from_secs(5)));
    }
}
