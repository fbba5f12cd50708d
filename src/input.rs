use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{debug, info};

use crate::control::SharedPlaybackContext;

/// How long one read waits before re-checking for shutdown
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Player controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    /// `c`: toggle centering
    ToggleCenter,
    /// `j`: skip back
    SkipBackward,
    /// `k`: pause / resume
    TogglePause,
    /// `l`: skip forward
    SkipForward,
    /// `q`: quit
    Quit,
    /// `r`: restart from the beginning
    Restart,
    /// `s`: toggle the status overlay
    ToggleStatus,
}

impl KeyCommand {
    pub fn from_char(key: char) -> Option<Self> {
        match key {
            'c' => Some(Self::ToggleCenter),
            'j' => Some(Self::SkipBackward),
            'k' => Some(Self::TogglePause),
            'l' => Some(Self::SkipForward),
            'q' => Some(Self::Quit),
            'r' => Some(Self::Restart),
            's' => Some(Self::ToggleStatus),
            _ => None,
        }
    }

    /// Raw mode swallows SIGINT, so Ctrl+C arrives here and means quit
    pub fn from_key_event(key: &KeyEvent) -> Option<Self> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Self::Quit)
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                Self::from_char(c)
            }
            _ => None,
        }
    }
}

/// Apply `command` to the shared state at `now`. Returns false once the
/// player should quit.
pub fn apply(
    command: KeyCommand,
    ctx: &SharedPlaybackContext,
    seek_step: Duration,
    now: Instant,
) -> bool {
    let control = &ctx.control;
    let clock = &ctx.clock;
    match command {
        KeyCommand::ToggleCenter => {
            let centered = control.toggle_center();
            control.request_redraw();
            debug!("Centering {}", if centered { "enabled" } else { "disabled" });
        }
        KeyCommand::SkipBackward => clock.rewind(seek_step, now),
        KeyCommand::TogglePause => {
            if control.is_paused() {
                clock.resume(now);
                control.set_paused(false);
                info!("Playback resumed");
            } else {
                clock.pause(now);
                control.set_paused(true);
                info!("Playback paused");
            }
        }
        KeyCommand::SkipForward => clock.fast_forward(seek_step),
        KeyCommand::Quit => {
            info!("Quit requested by user");
            control.request_stop();
            return false;
        }
        KeyCommand::Restart => {
            info!("Restarting video from beginning");
            clock.reset(now);
            control.request_restart();
        }
        KeyCommand::ToggleStatus => {
            control.toggle_status_text();
        }
    }
    true
}

/// Input thread body: read keystrokes until quit or a global stop.
///
/// Reads time out every 50ms so the thread notices shutdown and can be
/// joined.
pub fn run_input(ctx: Arc<SharedPlaybackContext>, seek_step: Duration) -> io::Result<()> {
    while !ctx.control.stop_requested() {
        if !event::poll(READ_TIMEOUT)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                if let Some(command) = KeyCommand::from_key_event(&key) {
                    if !apply(command, &ctx, seek_step, Instant::now()) {
                        break;
                    }
                }
            }
            Event::Resize(columns, rows) => {
                debug!("Terminal resized to {}x{}", columns, rows);
                ctx.control.request_redraw();
            }
            _ => {}
        }
    }
    debug!("input: stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlState;

    const STEP: Duration = Duration::from_secs(5);

    fn context() -> Arc<SharedPlaybackContext> {
        SharedPlaybackContext::new(ControlState::default())
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyCommand::from_char('c'), Some(KeyCommand::ToggleCenter));
        assert_eq!(KeyCommand::from_char('j'), Some(KeyCommand::SkipBackward));
        assert_eq!(KeyCommand::from_char('k'), Some(KeyCommand::TogglePause));
        assert_eq!(KeyCommand::from_char('l'), Some(KeyCommand::SkipForward));
        assert_eq!(KeyCommand::from_char('q'), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_char('r'), Some(KeyCommand::Restart));
        assert_eq!(KeyCommand::from_char('s'), Some(KeyCommand::ToggleStatus));
        assert_eq!(KeyCommand::from_char('x'), None);
        assert_eq!(KeyCommand::from_char('K'), None);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(KeyCommand::from_key_event(&key), Some(KeyCommand::Quit));
        let plain = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(KeyCommand::from_key_event(&plain), Some(KeyCommand::ToggleCenter));
    }

    #[test]
    fn test_center_toggle_forces_redraw() {
        let ctx = context();
        assert!(apply(KeyCommand::ToggleCenter, &ctx, STEP, Instant::now()));
        assert!(!ctx.control.center_enabled());
        assert!(ctx.control.take_redraw());
    }

    #[test]
    fn test_pause_resume_freezes_virtual_time() {
        let ctx = context();
        let paused = Instant::now() + Duration::from_secs(2);
        let before = ctx.clock.frame_index_at(paused, 25.0);

        apply(KeyCommand::TogglePause, &ctx, STEP, paused);
        assert!(ctx.control.is_paused());

        let resumed = paused + Duration::from_millis(3_700);
        apply(KeyCommand::TogglePause, &ctx, STEP, resumed);
        assert!(!ctx.control.is_paused());
        assert_eq!(ctx.clock.frame_index_at(resumed, 25.0), before);
    }

    #[test]
    fn test_restart_resets_clock_and_flags() {
        let ctx = context();
        let now = Instant::now() + Duration::from_secs(9);
        apply(KeyCommand::Restart, &ctx, STEP, now);
        assert!(ctx.control.take_restart());
        assert_eq!(ctx.clock.elapsed_at(now), Duration::ZERO);
    }

    #[test]
    fn test_quit_stops_everything() {
        let ctx = context();
        assert!(!apply(KeyCommand::Quit, &ctx, STEP, Instant::now()));
        assert!(ctx.control.stop_requested());
    }

    #[test]
    fn test_skip_keys_move_the_clock() {
        let ctx = context();
        let now = Instant::now() + Duration::from_secs(12);
        let start = ctx.clock.elapsed_at(now);

        apply(KeyCommand::SkipForward, &ctx, STEP, now);
        assert_eq!(ctx.clock.elapsed_at(now), start + STEP);
        apply(KeyCommand::SkipBackward, &ctx, STEP, now);
        assert_eq!(ctx.clock.elapsed_at(now), start);
    }
}
