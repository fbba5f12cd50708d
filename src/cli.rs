use std::path::PathBuf;
use clap::Parser;

use crate::config::ConfigFile;

const CONTROLS: &str = "\
Player controls:
  c  toggle centering
  j  skip back
  k  pause / resume
  l  skip forward
  q  quit (Ctrl+C also works)
  r  restart from the beginning
  s  toggle the status overlay";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = CONTROLS)]
pub struct Cli {
    /// Path to the video file to play
    #[arg(required = true)]
    pub file_path: PathBuf,

    /// Play without sound
    #[arg(short = 'a', long)]
    pub no_audio: bool,

    /// Minimum color distance before a cell's background is re-emitted
    #[arg(short = 't', long, value_name = "N")]
    pub color_threshold: Option<u32>,

    /// Color distance below which a cell is left as it is on screen
    #[arg(short = 's', long, value_name = "N")]
    pub skip_threshold: Option<u32>,

    /// Loop the video playback
    #[arg(short = 'l', long = "loop")]
    pub loop_playback: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Start with the status overlay shown
    #[arg(long)]
    pub status: bool,

    /// Start left-aligned instead of centered
    #[arg(long)]
    pub no_center: bool,

    /// JSON config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write log output to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Flags given on the command line, as config overrides. Unset switches
    /// leave the file's values alone.
    pub fn overrides(&self) -> ConfigFile {
        ConfigFile {
            color_threshold: self.color_threshold,
            skip_threshold: self.skip_threshold,
            loop_playback: self.loop_playback.then_some(true),
            play_audio: self.no_audio.then_some(false),
            center: self.no_center.then_some(false),
            show_status: self.status.then_some(true),
            ..ConfigFile::default()
        }
    }

    /// Log level requested on the command line
    pub fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        }
    }
}
