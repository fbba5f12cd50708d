//! Sound track: extraction to a WAV file with the ffmpeg CLI, and a sync
//! loop that keeps an audio sink on the virtual playback clock.

use std::cell::Cell;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use log::{debug, info, warn};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::clock::PlaybackClock;
use crate::control::SharedPlaybackContext;
use crate::{PlayerError, AUDIO_DRIFT_TOLERANCE_MS};

/// Upper bound on offset corrections in a single sync cycle
const MAX_CORRECTIONS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStatus {
    Playing,
    Paused,
    Stopped,
}

/// Something that plays the extracted sound track
pub trait AudioSink {
    fn play(&mut self) -> anyhow::Result<()>;
    fn pause(&mut self);
    fn status(&self) -> AudioStatus;
    /// Current playback position in milliseconds
    fn offset_ms(&self) -> i64;
    fn set_offset_ms(&mut self, offset_ms: i64) -> anyhow::Result<()>;
}

/// rodio output for a WAV file on disk
pub struct RodioSink {
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    sink: Sink,
    path: PathBuf,
    /// Last position seen while the track was queued
    position: Cell<Duration>,
    /// Track length, from the decoder or from where playback ran out
    length: Cell<Option<Duration>>,
}

/// Whether queueing the track again at `offset` would play anything
fn resumable(offset: Duration, length: Option<Duration>) -> bool {
    length.map_or(true, |length| offset < length)
}

impl RodioSink {
    /// Open the default output device with `path` queued, paused
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let source = Self::decode(path)?;
        let length = source.total_duration();
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| anyhow!("no audio output device: {}", e))?;
        let sink = Sink::try_new(&handle).map_err(|e| anyhow!("cannot create audio sink: {}", e))?;
        sink.pause();
        sink.append(source);
        info!("Audio opened from {} ({:?})", path.display(), length);
        Ok(Self {
            _stream: stream,
            _handle: handle,
            sink,
            path: path.to_path_buf(),
            position: Cell::new(Duration::ZERO),
            length: Cell::new(length),
        })
    }

    fn decode(path: &Path) -> anyhow::Result<Decoder<BufReader<File>>> {
        let file = File::open(path)?;
        Decoder::new(BufReader::new(file))
            .map_err(|e| anyhow!("cannot decode {}: {}", path.display(), e))
    }

    /// Current position. Once the sink has run dry the position is pinned at
    /// the end of the track, or wherever a later seek put it.
    fn observe(&self) -> Duration {
        if !self.sink.empty() {
            self.position.set(self.sink.get_pos());
        } else {
            let end = self.length.get().unwrap_or_else(|| self.position.get());
            self.length.set(Some(end));
            self.position.set(self.position.get().max(end));
        }
        self.position.get()
    }

    /// Queue the track again at `offset` after the sink ran dry. Past the
    /// end only the position is recorded, so nothing is decoded.
    fn requeue(&mut self, offset: Duration) -> anyhow::Result<()> {
        self.position.set(offset);
        if !resumable(offset, self.length.get()) {
            return Ok(());
        }
        debug!("Audio requeued at {:?}", offset);
        self.sink.append(Self::decode(&self.path)?);
        if !offset.is_zero() {
            if let Err(e) = self.sink.try_seek(offset) {
                debug!("Audio resume seek failed: {}", e);
            }
        }
        Ok(())
    }
}

impl AudioSink for RodioSink {
    fn play(&mut self) -> anyhow::Result<()> {
        let position = self.observe();
        if self.sink.empty() {
            self.requeue(position)?;
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn status(&self) -> AudioStatus {
        if self.sink.empty() {
            AudioStatus::Stopped
        } else if self.sink.is_paused() {
            AudioStatus::Paused
        } else {
            AudioStatus::Playing
        }
    }

    fn offset_ms(&self) -> i64 {
        self.observe().as_millis() as i64
    }

    fn set_offset_ms(&mut self, offset_ms: i64) -> anyhow::Result<()> {
        let offset = Duration::from_millis(offset_ms.max(0) as u64);
        if self.sink.empty() {
            return self.requeue(offset);
        }
        self.position.set(offset);
        self.sink
            .try_seek(offset)
            .map_err(|e| anyhow!("audio seek to {}ms failed: {}", offset_ms, e))
    }
}

/// Run ffmpeg to pull the sound track of `video` into `target` as WAV.
///
/// ffmpeg writes to `<target>.part` and the file is renamed once complete,
/// so an open of `target` only ever sees a whole file.
pub fn extract_audio(video: &Path, target: &Path, verbose: bool) -> crate::Result<()> {
    let partial = target.with_extension("wav.part");
    let mut command = Command::new("ffmpeg");
    command
        .arg("-nostdin")
        .arg("-y")
        .arg("-i")
        .arg(video)
        .args(["-vn", "-f", "wav"])
        .arg(&partial)
        .stdin(Stdio::null());
    if !verbose {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }
    debug!("Extracting audio: {:?}", command);

    let status = command.status()?;
    if !status.success() {
        return Err(PlayerError::AudioExtraction { code: status.code() });
    }
    fs::rename(&partial, target)?;
    info!("Audio extracted to {}", target.display());
    Ok(())
}

/// Open the audio file once `extracted` is set, retrying up to `retries`
/// times after that.
///
/// Playback is held paused for the whole wait, extraction included, so the
/// picture does not run ahead of the sound. Returns `Ok(None)` if a stop
/// arrives first.
pub fn open_with_retries<S, F>(
    path: &Path,
    extracted: &AtomicBool,
    retries: u32,
    interval: Duration,
    ctx: &SharedPlaybackContext,
    mut open: F,
) -> crate::Result<Option<S>>
where
    F: FnMut(&Path) -> anyhow::Result<S>,
{
    let hold = !ctx.control.is_paused();
    if hold {
        ctx.clock.pause(Instant::now());
        ctx.control.set_paused(true);
    }

    let mut attempts = 0;
    let result = loop {
        if ctx.control.stop_requested() {
            break Ok(None);
        }
        if !extracted.load(Ordering::Acquire) {
            thread::sleep(interval);
            continue;
        }
        attempts += 1;
        match open(path) {
            Ok(sink) => break Ok(Some(sink)),
            Err(e) if attempts > retries => {
                warn!("Giving up on audio after {} attempts: {}", attempts, e);
                break Err(PlayerError::AudioOpen {
                    path: path.display().to_string(),
                    attempts,
                });
            }
            Err(e) => {
                debug!("Audio not ready (attempt {}): {}", attempts, e);
                thread::sleep(interval);
            }
        }
    };

    if hold && ctx.control.is_paused() {
        ctx.clock.resume(Instant::now());
        ctx.control.set_paused(false);
    }
    result
}

/// Force the sink back onto the clock while they are more than the
/// tolerance apart. Returns the number of corrections made.
fn correct_drift<S: AudioSink>(sink: &mut S, clock: &PlaybackClock) -> u32 {
    let mut corrections = 0;
    loop {
        let target = clock.elapsed_ms();
        let drift = sink.offset_ms() - target;
        if drift.abs() <= AUDIO_DRIFT_TOLERANCE_MS {
            break;
        }
        if corrections == MAX_CORRECTIONS {
            warn!("Audio still {}ms off after {} corrections", drift, corrections);
            break;
        }
        corrections += 1;
        if let Err(e) = sink.set_offset_ms(target) {
            debug!("{}", e);
            break;
        }
    }
    if corrections > 0 {
        debug!("Audio resynced to {}ms", clock.elapsed_ms());
    }
    corrections
}

/// One sync cycle: mirror the pause state, restart a stopped sink and
/// correct drift
pub fn sync_step<S: AudioSink>(sink: &mut S, ctx: &SharedPlaybackContext) -> anyhow::Result<u32> {
    let paused = ctx.control.is_paused();
    match sink.status() {
        AudioStatus::Stopped if !paused => sink.play()?,
        AudioStatus::Playing if paused => sink.pause(),
        AudioStatus::Paused if !paused => sink.play()?,
        _ => {}
    }
    Ok(correct_drift(sink, &ctx.clock))
}

/// Audio thread body after the sink is open
pub fn run_sync<S: AudioSink>(sink: &mut S, ctx: &SharedPlaybackContext, poll_interval: Duration) {
    while !ctx.control.stop_requested() {
        if let Err(e) = sync_step(sink, ctx) {
            warn!("Audio playback error: {}", e);
        }
        thread::sleep(poll_interval);
    }
    sink.pause();
    debug!("audio: stopped");
}
