//! Rate and volume counters for status reporting.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Sliding-window sum of increments
#[derive(Debug, Clone)]
pub struct RateCounter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn incr_at(&mut self, value: u64, now: Instant) {
        self.prune(now);
        self.samples.push_back((now, value));
    }

    /// Sum of the increments recorded within the last window
    pub fn rate_at(&mut self, now: Instant) -> u64 {
        self.prune(now);
        self.samples.iter().map(|(_, value)| value).sum()
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.samples.front() {
            if now.saturating_duration_since(*at) < self.window {
                break;
            }
            self.samples.pop_front();
        }
    }
}

/// Lifetime total plus a windowed rate
#[derive(Debug, Clone)]
pub struct Counter {
    total: u64,
    rate: RateCounter,
    unit: &'static str,
    time_unit: &'static str,
}

impl Counter {
    pub fn new(window: Duration, unit: &'static str, time_unit: &'static str) -> Self {
        Self {
            total: 0,
            rate: RateCounter::new(window),
            unit,
            time_unit,
        }
    }

    /// Add `value`; zero and negative increments are ignored
    pub fn inc_by(&mut self, value: i64) {
        self.inc_by_at(value, Instant::now());
    }

    pub fn inc_by_at(&mut self, value: i64, now: Instant) {
        if value <= 0 {
            return;
        }
        self.rate.incr_at(value as u64, now);
        self.total += value as u64;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn rate(&mut self) -> u64 {
        self.rate.rate_at(Instant::now())
    }

    /// Lifetime total with its per-minute average over `elapsed`
    pub fn overall(&self, elapsed: Duration) -> String {
        let minutes = elapsed.as_secs_f64() / 60.0;
        let mut rate = self.total as f64;
        if minutes > 1.0 {
            rate /= minutes;
        }

        format!(
            "{} {}/min ({} {} total)",
            rate as u64, self.unit, self.total, self.unit
        )
    }

    /// Current rate and total, e.g. `12 block/s (340 total)`
    pub fn status(&mut self) -> String {
        let rate = self.rate();
        format!("{} {}/{} ({} total)", rate, self.unit, self.time_unit, self.total)
    }
}

/// Counters owned by the session controller
#[derive(Debug, Clone)]
pub struct SessionStats {
    started_at: Instant,
    time_to_first_block: Option<Duration>,
    status_reports: u64,
    pub blocks: Counter,
    pub bytes: Counter,
    pub reconnects: Counter,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            time_to_first_block: None,
            status_reports: 0,
            blocks: Counter::new(Duration::from_secs(1), "block", "s"),
            bytes: Counter::new(Duration::from_secs(1), "byte", "s"),
            reconnects: Counter::new(Duration::from_secs(60), "restart", "m"),
        }
    }

    /// Account for one successfully processed message
    pub fn record_block(&mut self, wire_size: usize) {
        if self.time_to_first_block.is_none() {
            self.time_to_first_block = Some(self.started_at.elapsed());
        }
        self.blocks.inc_by(1);
        self.bytes.inc_by(i64::try_from(wire_size).unwrap_or(i64::MAX));
    }

    pub fn record_reconnect(&mut self) {
        self.reconnects.inc_by(1);
    }

    pub fn record_status_report(&mut self) {
        self.status_reports += 1;
    }

    /// Number of periodic status lines emitted so far
    pub fn status_reports(&self) -> u64 {
        self.status_reports
    }

    pub fn time_to_first_block(&self) -> Option<Duration> {
        self.time_to_first_block
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn summary(&self) -> SessionSummary {
        let elapsed = self.elapsed();
        SessionSummary {
            duration: elapsed,
            time_to_first_block: self.time_to_first_block,
            reconnect_count: self.reconnects.total(),
            blocks_received: self.blocks.total(),
            bytes_received: self.bytes.total(),
            reconnects: self.reconnects.overall(elapsed),
            blocks: self.blocks.overall(elapsed),
            bytes: self.bytes.overall(elapsed),
        }
    }
}

/// Completion report of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub duration: Duration,
    pub time_to_first_block: Option<Duration>,
    pub reconnect_count: u64,
    pub blocks_received: u64,
    pub bytes_received: u64,
    pub reconnects: String,
    pub blocks: String,
    pub bytes: String,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Completed streaming")?;
        writeln!(f, "Duration: {:?}", self.duration)?;
        match self.time_to_first_block {
            Some(latency) => writeln!(f, "Time to first block: {:?}", latency)?,
            None => writeln!(f, "Time to first block: -")?,
        }
        if self.reconnect_count > 0 {
            writeln!(f, "Restart count: {}", self.reconnects)?;
        }
        writeln!(f)?;
        writeln!(f, "Block received: {}", self.blocks)?;
        write!(f, "Bytes received: {}", self.bytes)
    }
}
