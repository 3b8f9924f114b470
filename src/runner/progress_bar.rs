//! Per-source timing and the optional batch progress bar.
//!
//! Components
//! -----------------
//! * [`IterTimer`] – Tracks per-source durations and a smoothed **exponential moving
//!   average** (EMA), used for the progress message and the final log line.
//! * [`fmt_dur`] – Human-readable [`Duration`] formatter (`"42ms"`, `"3.14s"`,
//!   `"2m05s"`).
//! * [`BatchProgress`] – Wraps an `indicatif` progress bar when the `progress` feature
//!   is enabled; without it only the timer is kept.
//!
//! The EMA update rule is `ema ← α·dt + (1–α)·ema` with `α ∈ (0,1]`; the first sample
//! initialises the average.
use std::time::{Duration, Instant};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

pub(crate) struct IterTimer {
    last: Instant,
    ema_ns: f64,
    alpha: f64,
    count: u64,
}

impl IterTimer {
    pub(crate) fn new(alpha: f64) -> Self {
        Self {
            last: Instant::now(),
            ema_ns: 0.0,
            alpha,
            count: 0,
        }
    }

    /// Close the current iteration and return its duration.
    #[inline]
    pub(crate) fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.count += 1;

        let dt_ns = dt.as_nanos() as f64;
        self.ema_ns = if self.count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * self.ema_ns
        };

        dt
    }

    #[inline]
    pub(crate) fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.ema_ns as u64)
        }
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

pub(crate) fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else if d.as_millis() < 1_000 {
        format!("{}ms", d.as_millis())
    } else if d.as_secs() < 60 {
        format!("{:.2}s", d.as_secs_f32())
    } else {
        let secs = d.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// Progress state of one batch.
pub(crate) struct BatchProgress {
    timer: IterTimer,
    #[cfg(feature = "progress")]
    bar: ProgressBar,
}

impl BatchProgress {
    pub(crate) fn new(total: usize) -> Self {
        #[cfg(feature = "progress")]
        let bar = {
            let bar = ProgressBar::new((total as u64).max(1));
            // a malformed template falls back to the default style
            if let Ok(style) = ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) | ETA {eta_precise} | {msg}",
            ) {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(200));
            bar
        };
        #[cfg(not(feature = "progress"))]
        let _ = total;

        BatchProgress {
            timer: IterTimer::new(0.2),
            #[cfg(feature = "progress")]
            bar,
        }
    }

    /// Announce the source about to be processed.
    pub(crate) fn start(&self, source_id: &str) {
        #[cfg(feature = "progress")]
        self.bar.set_message(format!(
            "{source_id} | avg: {}",
            fmt_dur(self.timer.avg())
        ));
        #[cfg(not(feature = "progress"))]
        let _ = source_id;
    }

    /// Record the end of the current source; returns its duration.
    pub(crate) fn finish_one(&mut self) -> Duration {
        let dt = self.timer.tick();
        #[cfg(feature = "progress")]
        self.bar.inc(1);
        dt
    }

    pub(crate) fn average(&self) -> Duration {
        self.timer.avg()
    }

    pub(crate) fn processed(&self) -> u64 {
        self.timer.count()
    }

    pub(crate) fn finish(&self, interrupted: bool) {
        #[cfg(feature = "progress")]
        {
            if interrupted {
                self.bar.set_message("Interrupted");
            }
            self.bar.disable_steady_tick();
            self.bar.finish_and_clear();
        }
        #[cfg(not(feature = "progress"))]
        let _ = interrupted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_dur_scales() {
        assert_eq!(fmt_dur(Duration::from_micros(253)), "253µs");
        assert_eq!(fmt_dur(Duration::from_millis(42)), "42ms");
        assert_eq!(fmt_dur(Duration::from_millis(3140)), "3.14s");
        assert_eq!(fmt_dur(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn test_timer_average() {
        let mut timer = IterTimer::new(0.5);
        assert_eq!(timer.avg(), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        let first = timer.tick();
        assert_eq!(timer.avg().as_nanos(), first.as_nanos());
        timer.tick();
        assert!(timer.avg() < first);
        assert_eq!(timer.count(), 2);
    }
}
