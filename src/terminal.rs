//! Terminal plumbing around the player: geometry queries, the raw-mode
//! session, and the one cleanup path every exit goes through.

use std::fs;
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::ResetColor,
    terminal::{self, Clear, ClearType},
};
use log::{debug, error, warn};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::converter::Geometry;
use crate::PlayerError;

/// Set while the screen is owned by the player and needs restoring
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Scratch directory to delete on the way out, since `process::exit` skips
/// destructors
static SCRATCH_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Where the pacer learns the current terminal size
pub trait TerminalGeometry {
    fn query(&self) -> io::Result<Geometry>;
}

/// Geometry of the controlling terminal, including pixel size when the
/// terminal reports it
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosstermGeometry;

impl TerminalGeometry for CrosstermGeometry {
    fn query(&self) -> io::Result<Geometry> {
        match terminal::window_size() {
            Ok(size) => {
                Ok(Geometry::new(size.columns, size.rows).with_pixels(size.width, size.height))
            }
            Err(e) => {
                debug!("window_size unavailable ({}), falling back to size()", e);
                let (columns, rows) = terminal::size()?;
                Ok(Geometry::new(columns, rows))
            }
        }
    }
}

/// A fixed geometry, for output that is not a terminal
impl TerminalGeometry for Geometry {
    fn query(&self) -> io::Result<Geometry> {
        Ok(*self)
    }
}

/// Raw, cursor-hidden terminal for the duration of playback
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    /// Take over the terminal. `raw` disables line buffering and echo so the
    /// input thread sees single keystrokes.
    pub fn enter(raw: bool) -> io::Result<Self> {
        if raw {
            terminal::enable_raw_mode()?;
        }
        SESSION_ACTIVE.store(true, Ordering::SeqCst);
        if let Err(e) = execute!(stdout(), Hide, Clear(ClearType::All)) {
            restore();
            return Err(e);
        }
        debug!("Terminal initialized for playback (raw: {})", raw);
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore();
    }
}

/// Have [`restore`] delete `path` recursively, whichever way the process ends
pub fn register_scratch_dir(path: PathBuf) {
    let mut slot = SCRATCH_DIR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(path);
}

fn remove_scratch_dir() {
    let path = SCRATCH_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(path) = path {
        match fs::remove_dir_all(&path) {
            Ok(()) => debug!("Removed scratch directory {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
        }
    }
}

/// Put the terminal back (colors reset, screen cleared, cursor shown, raw
/// mode off) and delete the registered scratch directory. Safe to call any
/// number of times from any thread.
pub fn restore() {
    remove_scratch_dir();
    if !SESSION_ACTIVE.swap(false, Ordering::SeqCst) {
        return;
    }
    let mut out = stdout();
    let _ = execute!(
        out,
        ResetColor,
        Clear(ClearType::Purge),
        Clear(ClearType::All),
        MoveTo(0, 0),
        Show
    );
    let _ = terminal::disable_raw_mode();
    debug!("Terminal restored to normal state");
}

/// Restore the terminal, report `message` and exit with status 1
pub fn fatal(message: &str) -> ! {
    restore();
    error!("{}", message);
    eprintln!("{}", message);
    std::process::exit(1)
}

/// Like [`fatal`], for a setup error. Interrupted audio extraction exits
/// without a message.
pub fn fatal_error(err: &PlayerError) -> ! {
    restore();
    error!("{}", err);
    if !err.is_interrupted_extraction() {
        eprintln!("{}", err);
    }
    std::process::exit(err.exit_code())
}

/// Restore the terminal and exit on SIGINT, SIGTERM or SIGHUP
pub fn install_signal_handlers() -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                warn!("Received signal {}, exiting", signal);
                restore();
                std::process::exit(128 + signal);
            }
        })?;
    Ok(())
}
