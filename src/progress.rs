//! Progress reporting for loading and exporting.
//!
//! Export progress is reported per phase (0-100 within the phase). Callers
//! that want one bar can use [`ExportProgress::overall`], which weights the
//! phases. Noisy phases go through a [`Throttle`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::lock;

/// Default minimum gap between throttled progress events.
pub const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportPhase {
    Preparing,
    Converting,
    Archiving,
}

impl ExportPhase {
    /// (start, width) of this phase on the overall 0-100 scale.
    fn span(self) -> (f32, f32) {
        match self {
            ExportPhase::Preparing => (0.0, 10.0),
            ExportPhase::Converting => (10.0, 70.0),
            ExportPhase::Archiving => (80.0, 20.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// 0.0 to 100.0 within `phase`.
    pub percent: f32,
}

impl ExportProgress {
    pub fn new(phase: ExportPhase, done: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            (done as f32 / total as f32 * 100.0).min(100.0)
        };
        Self { phase, percent }
    }

    /// Position on a single 0-100 bar spanning all phases.
    pub fn overall(&self) -> f32 {
        let (start, width) = self.phase.span();
        start + width * self.percent / 100.0
    }
}

pub type ExportProgressCallback = dyn Fn(ExportProgress) + Send + Sync;

/// Per-file stage of a load. Stages only move forward within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStage {
    Reading,
    Decrypting,
    Parsing,
    Indexing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadProgress {
    /// Zero-based index of the file being processed.
    pub file_index: usize,
    pub file_count: usize,
    pub name: String,
    pub stage: LoadStage,
    /// Assets indexed so far across the whole call; never decreases.
    pub total_asset_num: usize,
}

pub type LoadProgressCallback = dyn Fn(LoadProgress) + Send + Sync;

/// Rate limiter for progress events. The first call always passes.
pub struct Throttle {
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: Mutex::new(None),
        }
    }

    /// Returns true (and records the emission) if at least `interval` has
    /// passed since the last accepted event.
    pub fn ready(&self) -> bool {
        let now = Instant::now();
        let mut last = lock(&self.last_emit);
        match *last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_EMIT_INTERVAL)
    }
}

/// Shared done/total counter for one phase.
pub struct StepCounter {
    done: AtomicUsize,
    total: usize,
}

impl StepCounter {
    pub fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
        }
    }

    /// Records one finished step and returns the new progress for `phase`.
    pub fn step(&self, phase: ExportPhase) -> ExportProgress {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        ExportProgress::new(phase, done, self.total)
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_throttle_drops_bursts() {
        let throttle = Throttle::new(Duration::from_millis(50));
        assert!(throttle.ready());
        assert!(!throttle.ready());
        assert!(!throttle.ready());
        thread::sleep(Duration::from_millis(60));
        assert!(throttle.ready());
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let throttle = Throttle::new(Duration::ZERO);
        assert!((0..10).all(|_| throttle.ready()));
    }

    #[test]
    fn test_phase_percent() {
        assert_eq!(ExportProgress::new(ExportPhase::Converting, 1, 4).percent, 25.0);
        assert_eq!(ExportProgress::new(ExportPhase::Converting, 0, 0).percent, 100.0);
        assert_eq!(ExportProgress::new(ExportPhase::Converting, 9, 4).percent, 100.0);
    }

    #[test]
    fn test_overall_is_monotonic_across_phases() {
        let samples = [
            ExportProgress::new(ExportPhase::Preparing, 0, 1),
            ExportProgress::new(ExportPhase::Preparing, 1, 1),
            ExportProgress::new(ExportPhase::Converting, 1, 2),
            ExportProgress::new(ExportPhase::Converting, 2, 2),
            ExportProgress::new(ExportPhase::Archiving, 1, 3),
            ExportProgress::new(ExportPhase::Archiving, 3, 3),
        ];
        let overall: Vec<f32> = samples.iter().map(ExportProgress::overall).collect();
        assert!(overall.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(overall[0], 0.0);
        assert_eq!(*overall.last().unwrap(), 100.0);
    }

    #[test]
    fn test_step_counter_across_threads() {
        let counter = StepCounter::new(400);
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        counter.step(ExportPhase::Converting);
                    }
                });
            }
        });
        assert_eq!(counter.done(), 400);
        assert_eq!(counter.step(ExportPhase::Converting).percent, 100.0);
    }
}
