use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;
use anyhow::{Result, anyhow};
use log::{debug, info, trace};

use crate::PlayerError;

/// Frame rate assumed when the container does not carry one
const FALLBACK_FPS: f64 = 25.0;

/// Sequential source of decoded frames.
///
/// The pacer is the only user: it reads forward one frame at a time and jumps
/// with [`FrameSource::seek`] when it drifts too far. `Ok(None)` from
/// [`FrameSource::next_frame`] means the stream is over; an empty frame is
/// treated the same way by the caller. Releasing the source is `Drop`.
pub trait FrameSource {
    /// Decode the next frame in presentation order
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Position the source so that the next decoded frame is `frame_index`
    fn seek(&mut self, frame_index: u64) -> Result<()>;

    /// Frames per second of the source
    fn fps(&self) -> f64;

    /// Frame width and height in pixels
    fn dimensions(&self) -> (u32, u32);
}

/// ffmpeg-backed video decoder producing RGB frames
pub struct VideoDecoder {
    input_context: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    time_base: f64,
    fps: f64,
    duration: f64,
    next_index: u64,
    eof_sent: bool,
    /// Frame decoded while seeking that is due next
    pending: Option<RgbImage>,
}

impl VideoDecoder {
    /// Open `path` and prepare a decoder for its best video stream
    pub fn open(path: &Path) -> std::result::Result<Self, PlayerError> {
        Self::new(path).map_err(|e| PlayerError::VideoOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn new(path: &Path) -> Result<Self> {
        if let Err(e) = ffmpeg::init() {
            debug!("FFmpeg init error: {:?}", e);
        }
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Quiet);

        debug!("Attempting to open video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path)
            .map_err(|e| anyhow!("Failed to open '{}': {}", path.display(), e))?;

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in '{}'", path.display()))?;
        let stream_index = stream.index();

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| anyhow!("Failed to create codec context: {}", e))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| anyhow!("Failed to create video decoder: {}", e))?;

        let rate = stream.avg_frame_rate();
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            FALLBACK_FPS
        };

        let time_base = f64::from(stream.time_base());
        let duration = if stream.duration() != ffmpeg::ffi::AV_NOPTS_VALUE {
            stream.duration() as f64 * time_base
        } else {
            0.0
        };

        info!(
            "Opened video stream {} of '{}': {}x{}, {:.2} FPS, {:.2}s",
            stream_index,
            path.display(),
            decoder.width(),
            decoder.height(),
            fps,
            duration
        );

        Ok(Self {
            input_context,
            stream_index,
            decoder,
            scaler: None,
            time_base,
            fps,
            duration,
            next_index: 0,
            eof_sent: false,
            pending: None,
        })
    }

    /// Video duration in seconds, 0 when unknown
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Decode one raw frame and report its index
    fn decode_raw(&mut self) -> Result<Option<(u64, ffmpeg::frame::Video)>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let index = self.index_of(&decoded);
                    self.next_index = index + 1;
                    return Ok(Some((index, decoded)));
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::ffi::EAGAIN => {}
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(anyhow!("Failed to receive frame from decoder: {}", e)),
            }

            if self.eof_sent {
                return Ok(None);
            }

            let packet = self
                .input_context
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match packet {
                Some((index, packet)) if index == self.stream_index => {
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| anyhow!("Failed to send packet to decoder: {}", e))?;
                }
                Some(_) => {}
                None => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| anyhow!("Failed to send EOF to decoder: {}", e))?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn index_of(&self, frame: &ffmpeg::frame::Video) -> u64 {
        match frame.timestamp() {
            Some(pts) if pts != ffmpeg::ffi::AV_NOPTS_VALUE && pts >= 0 => {
                (pts as f64 * self.time_base * self.fps).round() as u64
            }
            _ => self.next_index,
        }
    }

    /// Convert a decoded frame to packed RGB, honouring the line stride
    fn to_rgb(&mut self, frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
        let width = frame.width();
        let height = frame.height();

        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| s.input().width != width || s.input().height != height);
        if stale {
            self.scaler = Some(
                ffmpeg::software::scaling::Context::get(
                    frame.format(),
                    width,
                    height,
                    ffmpeg::format::Pixel::RGB24,
                    width,
                    height,
                    ffmpeg::software::scaling::Flags::BILINEAR,
                )
                .map_err(|e| anyhow!("Failed to create scaling context: {}", e))?,
            );
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some(ref mut scaler) = self.scaler {
            scaler
                .run(frame, &mut rgb_frame)
                .map_err(|e| anyhow!("Failed to scale frame: {}", e))?;
        }

        let stride = rgb_frame.stride(0);
        let row_bytes = width as usize * 3;
        let data = rgb_frame.data(0);
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("Decoded frame has an unexpected size"))
    }
}

impl FrameSource for VideoDecoder {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        match self.decode_raw()? {
            Some((index, frame)) => {
                trace!("Decoded frame {}", index);
                self.to_rgb(&frame).map(Some)
            }
            None => Ok(None),
        }
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        let seconds = frame_index as f64 / self.fps;
        let timestamp = (seconds * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;

        self.input_context
            .seek(timestamp, ..timestamp)
            .map_err(|e| anyhow!("Failed to seek to {:.2}s: {}", seconds, e))?;
        self.decoder.flush();
        self.eof_sent = false;
        self.pending = None;
        self.next_index = frame_index;

        // land on the requested frame: the demuxer stops at the preceding keyframe
        while let Some((index, frame)) = self.decode_raw()? {
            if index >= frame_index {
                self.pending = Some(self.to_rgb(&frame)?);
                break;
            }
        }

        debug!("Seeked to frame {} ({:.2}s)", frame_index, seconds);
        Ok(())
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }
}
