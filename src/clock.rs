use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use log::debug;

const NOT_PAUSED: i64 = i64::MIN;

/// Nanoseconds in `step`, saturating at `i64::MAX`
fn step_nanos(step: Duration) -> i64 {
    i64::try_from(step.as_nanos()).unwrap_or(i64::MAX)
}

/// Virtual playback clock.
///
/// Virtual time is `now - origin`. Moving the origin forward rewinds the
/// content, moving it backward fast-forwards it. The origin and the pause
/// instant are kept as signed nanosecond offsets from a fixed base instant so
/// they can live in atomics and be read from any thread.
///
/// Writers: the input thread (seek, pause, restart), the pacer's loop restart
/// and the audio thread, which pauses and resumes around the audio open.
/// The pacer only resets the origin at end of stream.
#[derive(Debug)]
pub struct PlaybackClock {
    base: Instant,
    origin_ns: AtomicI64,
    paused_at_ns: AtomicI64,
}

impl PlaybackClock {
    /// Create a clock whose virtual time starts at zero now
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock whose virtual time is zero at `start`
    pub fn starting_at(start: Instant) -> Self {
        Self {
            base: start,
            origin_ns: AtomicI64::new(0),
            paused_at_ns: AtomicI64::new(NOT_PAUSED),
        }
    }

    fn offset_of(&self, instant: Instant) -> i64 {
        instant.saturating_duration_since(self.base).as_nanos() as i64
    }

    /// The instant virtual time is measured against: `now`, or the moment
    /// playback was paused.
    fn reference_ns(&self, now: Instant) -> i64 {
        match self.paused_at_ns.load(Ordering::Acquire) {
            NOT_PAUSED => self.offset_of(now),
            paused_at => paused_at,
        }
    }

    /// Virtual time elapsed at `now`. Frozen while paused, never negative.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let origin = self.origin_ns.load(Ordering::Acquire);
        let elapsed = self.reference_ns(now).saturating_sub(origin).max(0);
        Duration::from_nanos(elapsed as u64)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    /// Virtual time in whole milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed().as_millis() as i64
    }

    /// Index of the source frame that should be on screen at `now`
    pub fn frame_index_at(&self, now: Instant, fps: f64) -> i64 {
        (self.elapsed_at(now).as_secs_f64() * fps).floor() as i64
    }

    /// Skip back in the content. The origin never moves past the reference
    /// instant, so virtual time bottoms out at zero.
    pub fn rewind(&self, step: Duration, now: Instant) {
        let reference = self.reference_ns(now);
        let origin = self.origin_ns.load(Ordering::Acquire);
        let shifted = origin.saturating_add(step_nanos(step)).min(reference);
        self.origin_ns.store(shifted, Ordering::Release);
        debug!("clock: rewind {:?}, virtual time now {:?}", step, self.elapsed_at(now));
    }

    /// Skip forward in the content
    pub fn fast_forward(&self, step: Duration) {
        let step_ns = step_nanos(step);
        let _ = self.origin_ns.fetch_update(Ordering::AcqRel, Ordering::Acquire, |origin| {
            Some(origin.saturating_sub(step_ns))
        });
        debug!("clock: fast forward {:?}", step);
    }

    /// Re-anchor virtual time zero at `now` (or at the pause instant)
    pub fn reset(&self, now: Instant) {
        let reference = self.reference_ns(now);
        self.origin_ns.store(reference, Ordering::Release);
    }

    /// Freeze virtual time. Pausing twice keeps the first instant.
    pub fn pause(&self, now: Instant) {
        let at = self.offset_of(now);
        let _ = self.paused_at_ns.compare_exchange(
            NOT_PAUSED,
            at,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Unfreeze virtual time, absorbing the paused span into the origin
    pub fn resume(&self, now: Instant) {
        let paused_at = self.paused_at_ns.load(Ordering::Acquire);
        if paused_at == NOT_PAUSED {
            return;
        }
        let paused_for = self.offset_of(now).saturating_sub(paused_at).max(0);
        self.origin_ns.fetch_add(paused_for, Ordering::AcqRel);
        self.paused_at_ns.store(NOT_PAUSED, Ordering::Release);
        debug!("clock: resumed after {}ms", paused_for / 1_000_000);
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at_ns.load(Ordering::Acquire) != NOT_PAUSED
    }

    /// Origin as a signed offset in nanoseconds from the clock's base instant
    pub fn origin_nanos(&self) -> i64 {
        self.origin_ns.load(Ordering::Acquire)
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
