use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::PlaybackClock;
use crate::config::PlayerConfig;
use crate::handoff::FrameSlots;

/// Playback control flags shared by every thread.
///
/// Each flag is an independent atomic boolean. The input thread owns the
/// toggles; the pacer additionally consumes `restart` and `force_redraw`
/// (swap to false) and raises `stop` / `restart` at end of stream. The audio
/// thread also writes `paused` while it holds playback during the audio open,
/// and gives it back afterwards unless the user paused in the meantime.
/// Readers may observe a toggle one poll late.
#[derive(Debug)]
pub struct ControlState {
    stop: AtomicBool,
    paused: AtomicBool,
    restart: AtomicBool,
    force_redraw: AtomicBool,
    center: AtomicBool,
    status_text: AtomicBool,
    loop_enabled: AtomicBool,
}

impl ControlState {
    pub fn new(center: bool, status_text: bool, loop_enabled: bool) -> Self {
        Self {
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            restart: AtomicBool::new(false),
            force_redraw: AtomicBool::new(false),
            center: AtomicBool::new(center),
            status_text: AtomicBool::new(status_text),
            loop_enabled: AtomicBool::new(loop_enabled),
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::Release);
    }

    /// Consume a pending restart request
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::AcqRel)
    }

    pub fn restart_pending(&self) -> bool {
        self.restart.load(Ordering::Acquire)
    }

    pub fn request_redraw(&self) {
        self.force_redraw.store(true, Ordering::Release);
    }

    /// Consume a pending full-redraw request
    pub fn take_redraw(&self) -> bool {
        self.force_redraw.swap(false, Ordering::AcqRel)
    }

    pub fn toggle_center(&self) -> bool {
        !self.center.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn center_enabled(&self) -> bool {
        self.center.load(Ordering::Acquire)
    }

    pub fn toggle_status_text(&self) -> bool {
        !self.status_text.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn status_text_enabled(&self) -> bool {
        self.status_text.load(Ordering::Acquire)
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled.load(Ordering::Acquire)
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(true, false, false)
    }
}

/// Everything the worker threads share, handed to each entry point as an
/// `Arc`.
///
/// - `clock`: written by the input thread, the pacer's loop restart and the
///   audio thread's pause and resume around the audio open
/// - `control`: see [`ControlState`]
/// - `slots`: payload and `published` written by the pacer, `acknowledged`
///   by the terminal writer
#[derive(Debug)]
pub struct SharedPlaybackContext {
    pub clock: PlaybackClock,
    pub control: ControlState,
    pub slots: FrameSlots,
}

impl SharedPlaybackContext {
    pub fn new(control: ControlState) -> Arc<Self> {
        Arc::new(Self {
            clock: PlaybackClock::new(),
            control,
            slots: FrameSlots::new(),
        })
    }

    pub fn from_config(config: &PlayerConfig) -> Arc<Self> {
        Self::new(ControlState::new(
            config.center,
            config.show_status,
            config.loop_playback,
        ))
    }
}
