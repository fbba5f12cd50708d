//! Term Player - a true-color terminal video player
//!
//! Decoded video frames are resampled to one terminal cell per pixel, diffed
//! against what is already on screen and streamed as background-color escape
//! sequences. A virtual playback clock keeps the picture, the audio track and
//! wall-clock time in step while the user pauses, seeks and loops.

pub mod audio;
pub mod cli;
pub mod clock;
pub mod config;
pub mod control;
pub mod converter;
pub mod decoder;
pub mod handoff;
pub mod input;
pub mod pacer;
pub mod renderer;
pub mod status;
pub mod terminal;

pub use audio::{AudioSink, AudioStatus, RodioSink};
pub use cli::Cli;
pub use clock::PlaybackClock;
pub use config::{ConfigFile, PlayerConfig};
pub use control::{ControlState, SharedPlaybackContext};
pub use converter::{cell_dimensions, CellGrid, FrameConverter, Geometry};
pub use decoder::{FrameSource, VideoDecoder};
pub use handoff::{ConsumerCursor, FrameSlots, ProducerCursor};
pub use input::KeyCommand;
pub use pacer::Pacer;
pub use renderer::{DiffRenderer, RenderOptions, Rgb};
pub use status::FpsMeter;
pub use terminal::TerminalGeometry;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

/// Seconds skipped by the `j` / `l` keys unless configured otherwise
pub const DEFAULT_SEEK_STEP_SECS: f64 = 5.0;

/// Allowed divergence between the audio sink and the virtual clock
pub const AUDIO_DRIFT_TOLERANCE_MS: i64 = 1000;

/// Number of inter-frame intervals averaged for the status line FPS
pub const FPS_WINDOW: usize = 20;

/// Error types used throughout the application
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("Error opening video stream or file: {path}: {reason}")]
    VideoOpen { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed config file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Error opening audio file: {path} (gave up after {attempts} attempts)")]
    AudioOpen { path: String, attempts: u32 },

    #[error("Audio extraction failed: ffmpeg returned {}", describe_status(.code))]
    AudioExtraction { code: Option<i32> },
}

impl PlayerError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// ffmpeg exits with 255 when it was interrupted; that case is fatal but
    /// not worth reporting a status code for.
    pub fn is_interrupted_extraction(&self) -> bool {
        matches!(self, PlayerError::AudioExtraction { code: Some(255) })
    }
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "no status (killed by signal)".to_string(),
    }
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Utility functions
pub mod utils {
    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds.max(0.0) as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        cell_dimensions, AudioSink, AudioStatus, CellGrid, Cli, ConfigFile, ConsumerCursor,
        ControlState, DiffRenderer, FpsMeter, FrameConverter, FrameSlots, FrameSource, Geometry,
        KeyCommand, Pacer, PlaybackClock, PlayerConfig, PlayerError, ProducerCursor,
        RenderOptions, Rgb, SharedPlaybackContext, TerminalGeometry,
    };
}
