use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use clap::Parser;
use log::{debug, error, info, warn};

use term_player::audio::{self, RodioSink};
use term_player::config::{ConfigFile, PlayerConfig};
use term_player::control::SharedPlaybackContext;
use term_player::decoder::{FrameSource, VideoDecoder};
use term_player::handoff;
use term_player::input;
use term_player::pacer::{Pacer, PacerExit};
use term_player::terminal::{self, CrosstermGeometry, TerminalSession};
use term_player::utils::format_duration;
use term_player::{Cli, PlayerError, PACKAGE_NAME, VERSION};

/// What the pacer thread learned when opening the video
struct VideoInfo {
    width: u32,
    height: u32,
    fps: f64,
    duration: f64,
}

fn init_logging(cli: &Cli) -> io::Result<()> {
    let env = env_logger::Env::default().default_filter_or(cli.log_level().to_string());
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(ref path) = cli.log_file {
        let file = File::create(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn load_config(cli: &Cli) -> term_player::Result<PlayerConfig> {
    let mut file = match cli.config {
        Some(ref path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    file.merge(cli.overrides());
    file.resolve()
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Cannot open log file: {}", e);
        std::process::exit(1);
    }

    info!("Starting Term Player v{}", VERSION);
    info!("Playing: {}", cli.file_path.display());

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = run(&cli, config) {
        error!("{:#}", e);
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, config: PlayerConfig) -> anyhow::Result<()> {
    let ctx = SharedPlaybackContext::from_config(&config);
    let (opened_tx, opened_rx) = mpsc::channel::<Result<VideoInfo, PlayerError>>();
    let (start_tx, start_rx) = mpsc::channel::<()>();

    // the decoder lives and dies on the pacer thread
    let pacer = {
        let ctx = Arc::clone(&ctx);
        let config = config.clone();
        let path = cli.file_path.clone();
        thread::Builder::new()
            .name("pacer".into())
            .spawn(move || -> anyhow::Result<PacerExit> {
                let decoder = match VideoDecoder::open(&path) {
                    Ok(decoder) => decoder,
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return Ok(PacerExit::Stopped);
                    }
                };
                let (width, height) = decoder.dimensions();
                let info = VideoInfo {
                    width,
                    height,
                    fps: decoder.fps(),
                    duration: decoder.duration(),
                };
                if opened_tx.send(Ok(info)).is_err() || start_rx.recv().is_err() {
                    return Ok(PacerExit::Stopped);
                }
                Pacer::new(decoder, CrosstermGeometry, ctx, &config).run()
            })?
    };

    let video = match opened_rx.recv() {
        Ok(Ok(video)) => video,
        Ok(Err(e)) => {
            let _ = pacer.join();
            return Err(e.into());
        }
        Err(_) => {
            let _ = pacer.join();
            anyhow::bail!("video thread exited before opening {}", cli.file_path.display());
        }
    };
    info!(
        "Video info: {}x{}, {:.2} FPS, {} duration",
        video.width,
        video.height,
        video.fps,
        format_duration(video.duration)
    );

    let interactive = atty::is(atty::Stream::Stdin);
    let session = TerminalSession::enter(interactive)?;
    terminal::install_signal_handlers()?;

    let writer = spawn_writer(&ctx, &config)?;
    // removed on drop, or by `terminal::restore` when a thread exits the process
    let audio_dir = if config.play_audio {
        let dir = tempfile::Builder::new().prefix(PACKAGE_NAME).tempdir()?;
        terminal::register_scratch_dir(dir.path().to_path_buf());
        Some(dir)
    } else {
        None
    };
    let audio = match audio_dir {
        Some(ref dir) => Some(spawn_audio(&ctx, &config, cli, dir.path().join("audio.wav"))?),
        None => None,
    };
    let input = if interactive {
        let ctx = Arc::clone(&ctx);
        let seek_step = config.seek_step;
        Some(
            thread::Builder::new()
                .name("input".into())
                .spawn(move || input::run_input(ctx, seek_step))?,
        )
    } else {
        debug!("stdin is not a terminal, keyboard controls disabled");
        None
    };

    ctx.clock.reset(Instant::now());
    let _ = start_tx.send(());

    let outcome = match pacer.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("video thread panicked")),
    };
    ctx.control.request_stop();

    match writer.join() {
        Ok(frames) => debug!("{} frames written", frames),
        Err(_) => warn!("terminal writer panicked"),
    }
    if let Some(audio) = audio {
        let _ = audio.join();
    }
    if let Some(input) = input {
        if let Ok(Err(e)) = input.join() {
            warn!("input thread failed: {}", e);
        }
    }

    drop(session);
    drop(audio_dir);

    let exit = outcome?;
    info!("Playback finished ({:?})", exit);
    Ok(())
}

fn spawn_writer(
    ctx: &Arc<SharedPlaybackContext>,
    config: &PlayerConfig,
) -> io::Result<JoinHandle<u64>> {
    let ctx = Arc::clone(ctx);
    let poll_interval = config.poll_interval;
    thread::Builder::new().name("writer".into()).spawn(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match handoff::run_writer(&ctx.slots, &ctx.control, &mut out, poll_interval) {
            Ok(frames) => frames,
            Err(e) => terminal::fatal(&format!("Error writing to terminal: {}", e)),
        }
    })
}

/// Start extraction in the background and the thread that plays the result
fn spawn_audio(
    ctx: &Arc<SharedPlaybackContext>,
    config: &PlayerConfig,
    cli: &Cli,
    wav: PathBuf,
) -> io::Result<JoinHandle<()>> {
    let extracted = Arc::new(AtomicBool::new(false));
    {
        let ctx = Arc::clone(ctx);
        let extracted = Arc::clone(&extracted);
        let video = cli.file_path.clone();
        let wav = wav.clone();
        let verbose = cli.debug;
        // detached: ffmpeg may still be running when playback ends
        thread::Builder::new().name("audio-extract".into()).spawn(move || {
            match audio::extract_audio(&video, &wav, verbose) {
                Ok(()) => extracted.store(true, Ordering::Release),
                Err(e) if !ctx.control.stop_requested() => terminal::fatal_error(&e),
                Err(e) => debug!("audio extraction abandoned: {}", e),
            }
        })?;
    }

    let ctx = Arc::clone(ctx);
    let retries = config.audio_open_retries;
    let retry_interval = config.audio_retry_interval;
    let poll_interval = config.poll_interval;
    thread::Builder::new().name("audio".into()).spawn(move || {
        let opened = audio::open_with_retries(
            &wav,
            &extracted,
            retries,
            retry_interval,
            &ctx,
            RodioSink::open,
        );
        let mut sink = match opened {
            Ok(Some(sink)) => sink,
            Ok(None) => return,
            Err(e) => terminal::fatal_error(&e),
        };
        audio::run_sync(&mut sink, &ctx, poll_interval);
    })
}
