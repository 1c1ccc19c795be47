use std::time::{Duration, Instant};

/// Frame pacing for the capture loop.
///
/// Keeps a running average of the acquire→publish time and derives how long
/// to wait so that one frame is produced every `1000 / frame_rate` ms.
/// The average is a plain pairwise mean: the first sample seeds it and each
/// later sample is averaged with the previous value.
#[derive(Debug, Clone, Default)]
pub struct Pacer {
    average_ms: Option<f64>,
    last_budget_ms: Option<f64>,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one measured cycle time (ms) into the running average.
    pub fn record_ms(&mut self, elapsed_ms: f64) -> f64 {
        let average = match self.average_ms {
            None => elapsed_ms,
            Some(previous) => (elapsed_ms + previous) / 2.0,
        };
        self.average_ms = Some(average);
        average
    }

    /// Record `elapsed` and return the wait needed to hold `frame_rate`.
    ///
    /// Zero when capture is already behind schedule.
    pub fn next_wait(&mut self, elapsed: Duration, frame_rate: u32) -> Duration {
        let average = self.record_ms(elapsed.as_secs_f64() * 1000.0);
        let budget = Self::sleep_budget_ms(average, frame_rate);
        self.last_budget_ms = Some(budget);
        budget_to_wait(budget)
    }

    /// `(1000 - average * rate) / rate`, in milliseconds. May be negative.
    pub fn sleep_budget_ms(average_ms: f64, frame_rate: u32) -> f64 {
        let rate = f64::from(frame_rate.max(1));
        (1000.0 - average_ms * rate) / rate
    }

    pub fn average_ms(&self) -> Option<f64> {
        self.average_ms
    }

    pub fn last_budget_ms(&self) -> Option<f64> {
        self.last_budget_ms
    }

    pub fn reset(&mut self) {
        self.average_ms = None;
        self.last_budget_ms = None;
    }
}

/// Whole microseconds of a millisecond budget; non-positive budgets mean no wait.
pub fn budget_to_wait(budget_ms: f64) -> Duration {
    let micros = (budget_ms * 1000.0) as i64;
    if micros <= 0 {
        Duration::ZERO
    } else {
        Duration::from_micros(micros as u64)
    }
}

/// Busy-wait on the monotonic clock for `duration`.
///
/// Spins without yielding to the scheduler.
pub fn precise_wait(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let start = Instant::now();
    while start.elapsed() <= duration {
        std::hint::spin_loop();
    }
}
