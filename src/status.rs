use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::converter::CellGrid;
use crate::FPS_WINDOW;

/// Rolling frame rate over the last [`FPS_WINDOW`] inter-frame intervals
#[derive(Debug)]
pub struct FpsMeter {
    last_frame: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            last_frame: None,
            intervals: VecDeque::with_capacity(FPS_WINDOW),
        }
    }

    /// Record that a frame was produced at `now`
    pub fn tick(&mut self, now: Instant) {
        if let Some(previous) = self.last_frame.replace(now) {
            if self.intervals.len() == FPS_WINDOW {
                self.intervals.pop_front();
            }
            self.intervals.push_back(now.saturating_duration_since(previous));
        }
    }

    /// Frames per second, or `None` before two frames were seen
    pub fn fps(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        let total: Duration = self.intervals.iter().sum();
        let mean_ms = total.as_secs_f64() * 1000.0 / self.intervals.len() as f64;
        if mean_ms <= 0.0 {
            return None;
        }
        Some(1000.0 / mean_ms)
    }

    /// Forget the history, e.g. after a pause
    pub fn reset(&mut self) {
        self.last_frame = None;
        self.intervals.clear();
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Lag worth showing: decode and render always cost something, so only a
/// frame that is more than one frame interval late counts as behind
pub fn visible_lag(lag: Duration, frame_interval: Duration) -> Duration {
    if lag > frame_interval {
        lag
    } else {
        Duration::ZERO
    }
}

/// Status line: resolution, frame rate and, when behind, the lag
pub fn compose(grid: &CellGrid, fps: Option<f64>, lag: Duration) -> String {
    let mut text = format!("Res: {}x{}", grid.width, grid.visual_height());
    match fps {
        Some(fps) => text.push_str(&format!("|fps: {}", fps as u64)),
        None => text.push_str("|fps: -"),
    }
    if lag >= Duration::from_millis(1) {
        text.push_str(&format!("|lag: {}ms", lag.as_millis()));
    }
    text
}
