//! live_overlay - stream the camera through the detector and draw the boxes.
//!
//! This program:
//! 1. Loads configuration (DETECT_CONFIG file + DETECT_* overrides)
//! 2. Loads the model; failure here aborts startup
//! 3. Starts the capture session; a missing camera is logged and the overlay
//!    simply stays empty
//! 4. Owns the overlay surface on the main thread and applies each completed
//!    detection batch until Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use detect_overlay::{
    overlay_channel, DetectionPipeline, DetectorConfig, ImageSurface, InferenceService,
    LivePipeline, OverlayRenderer, RenderStep,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "live_overlay",
    about = "Run live object detection and draw bounding boxes over the camera feed"
)]
struct Args {
    /// Write the final overlay to this PNG on exit
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let config = {
        let _stage = ui.stage("Load configuration");
        DetectorConfig::load()?
    };

    let service = {
        let _stage = ui.stage("Load model");
        InferenceService::load(&config.model).inspect_err(|err| {
            log::error!("model {} failed to load: {:#}", config.model.path.display(), err);
        })?
    };
    log::info!(
        "inference backend={} crop={:?} max_in_flight={}",
        service.backend_name(),
        service.policy(),
        config.max_in_flight
    );

    let (poster, inbox) = overlay_channel();
    let pipeline = DetectionPipeline::new(service, poster.clone());

    let mut live = {
        let _stage = ui.stage("Start camera");
        match LivePipeline::start(
            &config.device,
            &config.capture,
            pipeline,
            config.max_in_flight,
        ) {
            Ok(live) => Some(live),
            Err(err) => {
                log::warn!("camera not started, overlay will stay empty: {:#}", err);
                None
            }
        }
    };

    let signal_poster = poster.clone();
    ctrlc::set_handler(move || signal_poster.shutdown())
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    if let Some(secs) = args.duration {
        let timer_poster = poster.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            timer_poster.shutdown();
        });
    }
    drop(poster);

    let mut renderer = OverlayRenderer::new(ImageSurface::new(
        config.surface_width,
        config.surface_height,
    ));
    let ticker = ui.ticker("overlay");
    log::info!("live_overlay running. press Ctrl-C to stop");

    loop {
        match renderer.poll(&inbox, Duration::from_millis(250)) {
            RenderStep::Applied | RenderStep::Idle => {}
            RenderStep::Closed => break,
        }
        let frames = live
            .as_ref()
            .map(|live| live.pipeline().stats().frames_received)
            .unwrap_or(0);
        ticker.update(
            frames,
            renderer.state().batches_applied(),
            renderer.state().len(),
        );
    }

    log::info!("shutdown requested, stopping capture...");
    let mut frames = 0;
    if let Some(live) = live.as_mut() {
        live.stop();
        if !live.pipeline().wait_idle(Duration::from_secs(5)) {
            log::warn!("inference calls still running at exit");
        }
        let stats = live.pipeline().stats();
        frames = stats.frames_received;
        log::info!(
            "frames received={} superseded={} submitted={} failed={}",
            stats.frames_received,
            stats.frames_superseded,
            stats.frames_submitted,
            stats.requests_failed
        );
    }
    renderer.drain(&inbox);
    ticker.finish(frames, renderer.state().batches_applied());

    if let Some(path) = &args.snapshot {
        renderer.surface().save(path)?;
        println!("overlay snapshot written to {}", path.display());
    }
    Ok(())
}
