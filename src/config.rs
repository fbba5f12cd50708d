use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::renderer::RenderOptions;
use crate::{PlayerError, Result, DEFAULT_SEEK_STEP_SECS};

/// Longest accepted seek step: one day
const MAX_SEEK_STEP_SECS: f64 = 86_400.0;

// ---------------------------------------------------------------------------
// ConfigFile: deserialized from JSON, every field optional
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub color_threshold: Option<u32>,
    pub skip_threshold: Option<u32>,
    pub loop_playback: Option<bool>,
    pub play_audio: Option<bool>,
    pub center: Option<bool>,
    pub show_status: Option<bool>,
    pub seek_step_secs: Option<f64>,
    pub audio_open_retries: Option<u32>,
    pub audio_retry_interval_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// PlayerConfig: resolved, all fields concrete
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub color_threshold: u32,
    pub skip_threshold: u32,
    pub loop_playback: bool,
    pub play_audio: bool,
    pub center: bool,
    pub show_status: bool,
    pub seek_step: Duration,
    pub audio_open_retries: u32,
    pub audio_retry_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            color_threshold: 0,
            skip_threshold: 0,
            loop_playback: false,
            play_audio: true,
            center: true,
            show_status: false,
            seek_step: Duration::from_secs_f64(DEFAULT_SEEK_STEP_SECS),
            audio_open_retries: 10,
            audio_retry_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl PlayerConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            color_threshold: self.color_threshold,
            skip_threshold: self.skip_threshold,
        }
    }
}

impl ConfigFile {
    /// Read a JSON config file. A missing or malformed file is an error:
    /// the path was asked for explicitly.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("config: reading {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            PlayerError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = serde_json::from_str(&text)?;
        info!("config: loaded from {}", path.display());
        Ok(file)
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merge(&mut self, other: ConfigFile) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(
                    if let Some(v) = other.$field {
                        debug!("config: override {}={:?}", stringify!($field), v);
                        self.$field = Some(v);
                    }
                )*
            };
        }
        take!(
            color_threshold,
            skip_threshold,
            loop_playback,
            play_audio,
            center,
            show_status,
            seek_step_secs,
            audio_open_retries,
            audio_retry_interval_ms,
            poll_interval_ms
        );
    }

    /// Apply defaults to missing fields and validate the result
    pub fn resolve(self) -> Result<PlayerConfig> {
        let defaults = PlayerConfig::default();

        let seek_step_secs = self.seek_step_secs.unwrap_or(DEFAULT_SEEK_STEP_SECS);
        if !seek_step_secs.is_finite() || seek_step_secs <= 0.0 {
            return Err(PlayerError::InvalidConfig(format!(
                "seek_step_secs must be greater than 0, got {}",
                seek_step_secs
            )));
        }
        if seek_step_secs > MAX_SEEK_STEP_SECS {
            return Err(PlayerError::InvalidConfig(format!(
                "seek_step_secs must be at most {}, got {}",
                MAX_SEEK_STEP_SECS, seek_step_secs
            )));
        }
        let poll_interval_ms = self.poll_interval_ms.unwrap_or(1);
        if poll_interval_ms == 0 {
            return Err(PlayerError::InvalidConfig(
                "poll_interval_ms must be at least 1".into(),
            ));
        }
        let audio_retry_interval_ms = self.audio_retry_interval_ms.unwrap_or(100);
        if audio_retry_interval_ms == 0 {
            return Err(PlayerError::InvalidConfig(
                "audio_retry_interval_ms must be at least 1".into(),
            ));
        }

        let config = PlayerConfig {
            color_threshold: self.color_threshold.unwrap_or(defaults.color_threshold),
            skip_threshold: self.skip_threshold.unwrap_or(defaults.skip_threshold),
            loop_playback: self.loop_playback.unwrap_or(defaults.loop_playback),
            play_audio: self.play_audio.unwrap_or(defaults.play_audio),
            center: self.center.unwrap_or(defaults.center),
            show_status: self.show_status.unwrap_or(defaults.show_status),
            seek_step: Duration::from_secs_f64(seek_step_secs),
            audio_open_retries: self.audio_open_retries.unwrap_or(defaults.audio_open_retries),
            audio_retry_interval: Duration::from_millis(audio_retry_interval_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
        };
        info!(
            "config: resolved color_threshold={}, skip_threshold={}, loop={}, audio={}, \
             center={}, status={}, seek_step={:.2}s, audio_retries={}x{}ms, poll={}ms",
            config.color_threshold,
            config.skip_threshold,
            config.loop_playback,
            config.play_audio,
            config.center,
            config.show_status,
            config.seek_step.as_secs_f64(),
            config.audio_open_retries,
            config.audio_retry_interval.as_millis(),
            config.poll_interval.as_millis(),
        );
        Ok(config)
    }
}
