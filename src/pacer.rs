//! Frame pacing: keeps the decoded position on the virtual clock and feeds
//! rendered frames into the handoff slots.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use image::RgbImage;
use log::{debug, info, trace, warn};

use crate::config::PlayerConfig;
use crate::control::SharedPlaybackContext;
use crate::converter::{FrameConverter, Geometry};
use crate::decoder::FrameSource;
use crate::handoff::ProducerCursor;
use crate::renderer::{DiffRenderer, RenderRequest};
use crate::status::{self, FpsMeter};
use crate::terminal::TerminalGeometry;

/// Longest single sleep while waiting for a frame to fall due
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Why the pacer returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerExit {
    /// The source ran out with looping off
    EndOfStream,
    /// Someone else requested a stop
    Stopped,
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Finished(PacerExit),
}

pub struct Pacer<S, G> {
    source: S,
    geometry: G,
    ctx: Arc<SharedPlaybackContext>,
    converter: FrameConverter,
    renderer: DiffRenderer,
    producer: ProducerCursor,
    meter: FpsMeter,
    fps: f64,
    /// Index of the next frame the source will decode
    current: i64,
    frame: String,
    last_geometry: Geometry,
    poll_interval: Duration,
}

impl<S: FrameSource, G: TerminalGeometry> Pacer<S, G> {
    pub fn new(
        source: S,
        geometry: G,
        ctx: Arc<SharedPlaybackContext>,
        config: &PlayerConfig,
    ) -> Self {
        let fps = source.fps();
        Self {
            source,
            geometry,
            ctx,
            converter: FrameConverter::new(),
            renderer: DiffRenderer::new(config.render_options()),
            producer: ProducerCursor::new(config.poll_interval),
            meter: FpsMeter::new(),
            fps,
            current: 0,
            frame: String::new(),
            last_geometry: Geometry::new(80, 24),
            poll_interval: config.poll_interval,
        }
    }

    /// Play until the stream ends (looping off) or a stop is requested
    pub fn run(&mut self) -> anyhow::Result<PacerExit> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(anyhow!("source reports an unusable frame rate: {}", self.fps));
        }
        let (width, height) = self.source.dimensions();
        info!("pacer: starting {}x{} at {:.2} fps", width, height, self.fps);

        loop {
            if let Step::Finished(exit) = self.step()? {
                info!("pacer: finished ({:?}) at frame {}", exit, self.current);
                return Ok(exit);
            }
        }
    }

    fn step(&mut self) -> anyhow::Result<Step> {
        let control = &self.ctx.control;
        if control.stop_requested() {
            return Ok(Step::Finished(PacerExit::Stopped));
        }
        if control.is_paused() {
            self.meter.reset();
            thread::sleep(self.poll_interval);
            return Ok(Step::Continue);
        }

        let restart = control.take_restart();
        let target = self.ctx.clock.frame_index_at(Instant::now(), self.fps);
        let drift = target - self.current;

        if restart || drift.unsigned_abs() as f64 >= self.fps {
            debug!(
                "pacer: seeking from frame {} to {} (restart: {})",
                self.current, target, restart
            );
            if let Err(e) = self.source.seek(target as u64) {
                warn!("pacer: seek to frame {} failed: {}", target, e);
                // looping again would only retry the same seek
                return Ok(self.end_of_stream(!restart));
            }
            self.current = target;
            self.meter.reset();
            return Ok(Step::Continue);
        }

        if drift > 0 {
            trace!("pacer: {} frames behind, decoding through", drift);
            while self.current < target {
                if self.decode()?.is_none() {
                    return Ok(self.end_of_stream(true));
                }
                self.current += 1;
            }
        } else if drift < 0 && !self.wait_until_due() {
            return Ok(Step::Continue);
        }

        match self.decode()? {
            Some(image) => {
                let index = self.current;
                self.current += 1;
                self.present(&image, index)
            }
            None => Ok(self.end_of_stream(true)),
        }
    }

    /// Next frame, with decode errors and empty frames read as end of stream
    fn decode(&mut self) -> anyhow::Result<Option<RgbImage>> {
        match self.source.next_frame() {
            Ok(Some(image)) if image.width() > 0 && image.height() > 0 => Ok(Some(image)),
            Ok(Some(_)) => {
                debug!("pacer: empty frame at {}", self.current);
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("pacer: decoding frame {} failed: {}", self.current, e);
                Ok(None)
            }
        }
    }

    /// Sleep until frame `current` is due. False if interrupted by a stop,
    /// pause or restart.
    fn wait_until_due(&self) -> bool {
        let due = Duration::from_secs_f64(self.current as f64 / self.fps);
        let control = &self.ctx.control;
        loop {
            if control.stop_requested() || control.is_paused() || control.restart_pending() {
                return false;
            }
            let elapsed = self.ctx.clock.elapsed();
            if elapsed >= due {
                return true;
            }
            thread::sleep((due - elapsed).min(SLEEP_SLICE));
        }
    }

    fn end_of_stream(&self, allow_loop: bool) -> Step {
        let control = &self.ctx.control;
        if allow_loop && control.loop_enabled() {
            info!("pacer: end of stream at frame {}, looping", self.current);
            self.ctx.clock.reset(Instant::now());
            control.request_restart();
            Step::Continue
        } else {
            info!("pacer: end of stream at frame {}", self.current);
            control.request_stop();
            Step::Finished(PacerExit::EndOfStream)
        }
    }

    fn present(&mut self, image: &RgbImage, index: i64) -> anyhow::Result<Step> {
        let terminal = match self.geometry.query() {
            Ok(geometry) => {
                self.last_geometry = geometry;
                geometry
            }
            Err(e) => {
                trace!("pacer: terminal size unavailable: {}", e);
                self.last_geometry
            }
        };
        let grid = self.converter.convert_frame(image, &terminal.drawable());

        let now = Instant::now();
        self.meter.tick(now);
        let control = &self.ctx.control;
        let status = if control.status_text_enabled() {
            let shown_at = Duration::from_secs_f64(index as f64 / self.fps);
            let lag = self.ctx.clock.elapsed_at(now).saturating_sub(shown_at);
            let lag = status::visible_lag(lag, Duration::from_secs_f64(1.0 / self.fps));
            status::compose(&grid, self.meter.fps(), lag)
        } else {
            String::new()
        };

        let request = RenderRequest {
            grid: &grid,
            terminal,
            center: control.center_enabled(),
            status: &status,
            clear: control.take_redraw(),
        };
        self.renderer
            .render(&request, &mut self.frame)
            .map_err(|_| anyhow!("failed to format frame {}", index))?;

        if !self.producer.submit(&self.ctx.slots, &self.ctx.control, &mut self.frame) {
            return Ok(Step::Finished(PacerExit::Stopped));
        }
        Ok(Step::Continue)
    }
}
