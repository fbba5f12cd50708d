use term_player::prelude::*;
use term_player::handoff::run_writer;
use term_player::pacer::PacerExit;
use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use assert_cmd::Command;
use predicates::prelude::*;
use proptest::prelude::*;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("term-player").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Player controls"))
        .stdout(predicate::str::contains("--skip-threshold"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("term-player").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_missing_file() {
    let mut cmd = Command::cargo_bin("term-player").unwrap();
    cmd.arg("nonexistent.mp4").arg("--no-audio");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Error opening video stream or file"));
}

#[test]
fn test_cli_malformed_config() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, "{{ not json").unwrap();

    let mut cmd = Command::cargo_bin("term-player").unwrap();
    cmd.arg("--config").arg(config.path()).arg("nonexistent.mp4");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Malformed config file"));
}

#[test]
fn test_cli_usage_error() {
    let mut cmd = Command::cargo_bin("term-player").unwrap();
    cmd.arg("--color-threshold").arg("lots").arg("video.mp4");
    cmd.assert().code(2);
}

/// Solid frames counting up, with every seek recorded
struct CountingSource {
    frames: u64,
    fps: f64,
    next: u64,
    seeks: Arc<Mutex<Vec<u64>>>,
    decoded: Arc<Mutex<u64>>,
}

impl CountingSource {
    fn new(frames: u64, fps: f64) -> Self {
        Self {
            frames,
            fps,
            next: 0,
            seeks: Arc::default(),
            decoded: Arc::default(),
        }
    }
}

impl FrameSource for CountingSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<image::RgbImage>> {
        if self.next >= self.frames {
            return Ok(None);
        }
        let shade = (self.next * 60 % 256) as u8;
        self.next += 1;
        *self.decoded.lock().unwrap() += 1;
        Ok(Some(image::RgbImage::from_pixel(32, 18, image::Rgb([shade, shade, 0]))))
    }

    fn seek(&mut self, frame_index: u64) -> anyhow::Result<()> {
        self.seeks.lock().unwrap().push(frame_index);
        self.next = frame_index;
        Ok(())
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (32, 18)
    }
}

fn spawn_playback(
    source: CountingSource,
    config: PlayerConfig,
) -> (
    Arc<SharedPlaybackContext>,
    thread::JoinHandle<anyhow::Result<PacerExit>>,
    thread::JoinHandle<Vec<u8>>,
) {
    let ctx = SharedPlaybackContext::from_config(&config);
    let writer_ctx = Arc::clone(&ctx);
    let writer = thread::spawn(move || {
        let mut out = Vec::new();
        let poll = Duration::from_millis(1);
        run_writer(&writer_ctx.slots, &writer_ctx.control, &mut out, poll).unwrap();
        out
    });
    let pacer_ctx = Arc::clone(&ctx);
    let pacer = thread::spawn(move || {
        Pacer::new(source, Geometry::new(64, 20), pacer_ctx, &config).run()
    });
    (ctx, pacer, writer)
}

mod playback_tests {
    use super::*;

    #[test]
    fn test_plays_once_and_stops() {
        let source = CountingSource::new(4, 50.0);
        let decoded = Arc::clone(&source.decoded);
        let (ctx, pacer, writer) = spawn_playback(source, PlayerConfig::default());

        assert_eq!(pacer.join().unwrap().unwrap(), PacerExit::EndOfStream);
        assert!(ctx.control.stop_requested());
        let output = writer.join().unwrap();
        assert_eq!(*decoded.lock().unwrap(), 4);
        // the first frame clears the screen
        assert!(String::from_utf8_lossy(&output).starts_with("\x1b[0m\x1b[3J\x1b[2J"));
    }

    #[test]
    fn test_loop_reanchors_clock() {
        let source = CountingSource::new(2, 20.0);
        let seeks = Arc::clone(&source.seeks);
        let config = PlayerConfig {
            loop_playback: true,
            ..PlayerConfig::default()
        };
        let (ctx, pacer, writer) = spawn_playback(source, config);
        let start = ctx.clock.origin_nanos();

        // origin as seen right after each wrap back to frame 0
        let mut origins = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(3);
        while origins.len() < 2 && Instant::now() < deadline {
            if seeks.lock().unwrap().len() > origins.len() {
                origins.push(ctx.clock.origin_nanos());
            }
            thread::sleep(Duration::from_millis(2));
        }
        ctx.control.request_stop();
        assert_eq!(pacer.join().unwrap().unwrap(), PacerExit::Stopped);
        writer.join().unwrap();

        assert!(origins.len() >= 2, "only {} wraps seen", origins.len());
        let seeks = seeks.lock().unwrap();
        assert!(seeks.iter().all(|&frame| frame == 0), "seeks: {:?}", seeks);
        // two frames at 20 fps: each pass restarts the timeline no earlier than 100ms in
        let mut previous = start;
        for origin in origins {
            let jump = origin - previous;
            assert!(jump >= 95_000_000, "origin moved {}ns", jump);
            previous = origin;
        }
    }

    #[test]
    fn test_pause_holds_the_picture() {
        let source = CountingSource::new(10_000, 100.0);
        let decoded = Arc::clone(&source.decoded);
        let (ctx, pacer, writer) = spawn_playback(source, PlayerConfig::default());

        thread::sleep(Duration::from_millis(50));
        ctx.clock.pause(Instant::now());
        ctx.control.set_paused(true);
        thread::sleep(Duration::from_millis(30));
        let frozen_at = *decoded.lock().unwrap();
        let virtual_time = ctx.clock.elapsed();

        thread::sleep(Duration::from_millis(150));
        assert_eq!(*decoded.lock().unwrap(), frozen_at);
        assert_eq!(ctx.clock.elapsed(), virtual_time);

        ctx.clock.resume(Instant::now());
        ctx.control.set_paused(false);
        ctx.control.request_stop();
        pacer.join().unwrap().unwrap();
        writer.join().unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cell_grid_fits_terminal(
        image_width in 1u32..4096,
        image_height in 1u32..4096,
        columns in 1u16..400,
        rows in 1u16..200,
        pixels in proptest::option::of((1u16..4000, 1u16..4000)),
    ) {
        let mut geometry = Geometry::new(columns, rows);
        if let Some((w, h)) = pixels {
            geometry = geometry.with_pixels(w, h);
        }
        let (cell_width, cell_height) = cell_dimensions(image_width, image_height, &geometry);
        prop_assert!(cell_width >= 1 && cell_width <= columns);
        prop_assert!(cell_height >= 1 && cell_height <= rows);
    }

    #[test]
    fn cell_grid_keeps_aspect_ratio(
        image_width in 16u32..4096,
        image_height in 16u32..4096,
        columns in 8u16..400,
        rows in 8u16..200,
        pixels in proptest::option::of((100u16..4000, 100u16..4000)),
    ) {
        let mut geometry = Geometry::new(columns, rows);
        if let Some((w, h)) = pixels {
            geometry = geometry.with_pixels(w, h);
        }
        let (cell_width, cell_height) = cell_dimensions(image_width, image_height, &geometry);
        // a side forced up to one cell has lost the ratio
        prop_assume!(cell_width >= 2 && cell_height >= 2);

        let cw = cell_width as f64;
        let ch = cell_height as f64;
        let visual = cw / (ch * geometry.aspect_ratio_scale());
        let ratio = visual / (image_width as f64 / image_height as f64);
        // each side is off by at most half a cell
        let low = (cw / (cw + 0.5)) / (ch / (ch - 0.5));
        let high = (cw / (cw - 0.5)) / (ch / (ch + 0.5));
        prop_assert!(
            ratio >= low - 1e-9 && ratio <= high + 1e-9,
            "{}x{} -> {}x{}: ratio {} outside [{}, {}]",
            image_width, image_height, cell_width, cell_height, ratio, low, high
        );
    }

    #[test]
    fn pause_resume_preserves_virtual_time(
        start_ms in 0u64..60_000,
        paused_ms in 0u64..60_000,
    ) {
        let base = Instant::now();
        let clock = PlaybackClock::starting_at(base);
        let paused = base + Duration::from_millis(start_ms);
        let before = clock.elapsed_at(paused);

        clock.pause(paused);
        let resumed = paused + Duration::from_millis(paused_ms);
        prop_assert_eq!(clock.elapsed_at(resumed), before);
        clock.resume(resumed);
        prop_assert_eq!(clock.elapsed_at(resumed), before);
    }

    #[test]
    fn seeks_never_go_negative(
        now_ms in 0u64..30_000,
        steps in proptest::collection::vec((any::<bool>(), 1u64..20_000), 1..12),
    ) {
        let base = Instant::now();
        let clock = PlaybackClock::starting_at(base);
        let now = base + Duration::from_millis(now_ms);
        let mut expected = now_ms as i64;
        for (forward, step_ms) in steps {
            let step = Duration::from_millis(step_ms);
            if forward {
                clock.fast_forward(step);
                expected += step_ms as i64;
            } else {
                clock.rewind(step, now);
                expected = (expected - step_ms as i64).max(0);
            }
            prop_assert_eq!(clock.elapsed_at(now).as_millis() as i64, expected);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn handoff_preserves_order(delays in proptest::collection::vec((0u64..3, 0u64..3), 1..24)) {
        let ctx = SharedPlaybackContext::new(ControlState::default());
        let count = delays.len();

        let consumer_ctx = Arc::clone(&ctx);
        let consumer_delays: Vec<u64> = delays.iter().map(|&(_, d)| d).collect();
        let consumer = thread::spawn(move || {
            let mut cursor = ConsumerCursor::new(Duration::from_millis(1));
            let mut out = Vec::new();
            for delay in consumer_delays {
                thread::sleep(Duration::from_millis(delay));
                let slots = &consumer_ctx.slots;
                if !cursor.drain_next(slots, &consumer_ctx.control, &mut out).unwrap() {
                    break;
                }
                out.push(b'|');
            }
            out
        });

        let mut producer = ProducerCursor::new(Duration::from_millis(1));
        for (i, &(delay, _)) in delays.iter().enumerate() {
            thread::sleep(Duration::from_millis(delay));
            let mut frame = format!("frame{}", i);
            prop_assert!(producer.submit(&ctx.slots, &ctx.control, &mut frame));
        }

        let out = String::from_utf8(consumer.join().unwrap()).unwrap();
        let expected: String = (0..count).map(|i| format!("frame{}|", i)).collect();
        prop_assert_eq!(out, expected);
    }
}
