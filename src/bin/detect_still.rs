//! detect_still - run the detector on one image and write the overlay.
//!
//! The image is treated as a single captured frame: the configured model and
//! crop policy apply, and the boxes are drawn over the upright image.

use anyhow::{Context, Result};
use clap::Parser;
use image::imageops;
use std::io::IsTerminal;
use std::path::PathBuf;

use detect_overlay::{
    DetectorConfig, Frame, ImageSurface, InferenceService, OverlayRenderer, Orientation,
    PixelFormat,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "detect_still",
    about = "Detect objects in a still image and draw the bounding boxes"
)]
struct Args {
    /// Input image (PNG or JPEG)
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Output PNG with the overlay drawn over the image
    #[arg(long, short, default_value = "overlay.png", value_name = "PATH")]
    output: PathBuf,

    /// Orientation hint of the input (up|right|down|left)
    #[arg(long, default_value = "up", value_name = "HINT")]
    orientation: String,

    /// Print detections as JSON lines on stdout
    #[arg(long)]
    json: bool,

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
    let orientation = Orientation::parse(&args.orientation)?;

    let config = {
        let _stage = ui.stage("Load configuration");
        DetectorConfig::load()?
    };
    let service = {
        let _stage = ui.stage("Load model");
        InferenceService::load(&config.model)?
    };

    let image = {
        let _stage = ui.stage("Read image");
        image::open(&args.image)
            .with_context(|| format!("reading {}", args.image.display()))?
            .to_rgb8()
    };
    let (width, height) = image.dimensions();

    let background = match orientation {
        Orientation::Up => image.clone(),
        Orientation::Right => imageops::rotate90(&image),
        Orientation::Down => imageops::rotate180(&image),
        Orientation::Left => imageops::rotate270(&image),
    };
    let background = image::DynamicImage::ImageRgb8(background).to_rgba8();

    let frame = Frame::new(
        image.into_raw(),
        width,
        height,
        PixelFormat::Rgb8,
        orientation,
        1,
    )?;
    let detections = {
        let _stage = ui.stage("Detect");
        service.run(frame)?
    };

    let mut renderer = OverlayRenderer::new(ImageSurface::with_background(background));
    {
        let _stage = ui.stage("Draw overlay");
        renderer.on_result(&detections)?;
        renderer.surface().save(&args.output)?;
    }

    if args.json {
        for detection in &detections {
            println!("{}", serde_json::to_string(detection)?);
        }
    }
    println!(
        "detect_still: {} detections, overlay written to {}",
        detections.len(),
        args.output.display()
    );
    Ok(())
}
