//! V4L2 capture device.
//!
//! Negotiates packed RGB (`RGB3`) at the preset resolution and streams frames
//! through memory-mapped buffers. The driver may pick a different resolution;
//! frames carry whatever was actually negotiated.

use anyhow::{Context, Result};
use ouroboros::self_referencing;

use crate::error::PipelineError;
use crate::frame::{Frame, Orientation, PixelFormat};

use super::{CaptureDevice, CaptureSettings};

const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Device {
    path: String,
    state: V4l2Stream,
    orientation: Orientation,
    width: u32,
    height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2Stream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Device {
    pub fn open(path: &str, settings: &CaptureSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let configuration_err =
            |what: &str, err: &dyn std::fmt::Display| -> anyhow::Error {
                PipelineError::ConfigurationError(format!("{} on {}: {}", what, path, err)).into()
            };

        let mut device =
            v4l::Device::with_path(path).map_err(|err| configuration_err("open device", &err))?;
        let mut format = device
            .format()
            .map_err(|err| configuration_err("read format", &err))?;
        let (width, height) = settings.preset.dimensions();
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Device: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .map_err(|err| configuration_err("read format after set failure", &err))?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(configuration_err(
                "negotiate RGB3",
                &format!("driver offered {}", format.fourcc),
            ));
        }

        if settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Device: failed to set fps on {}: {}", path, err);
            }
        }

        let state = V4l2StreamBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| configuration_err("create buffer stream", &err))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Device: attached {} ({}x{})",
            path,
            format.width,
            format.height
        );
        Ok(Self {
            path: path.to_string(),
            state,
            orientation: settings.orientation,
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }
}

impl CaptureDevice for V4l2Device {
    fn describe(&self) -> String {
        format!("{} ({}x{})", self.path, self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let expected = (self.width * self.height * 3) as usize;
        // Drivers may hand back padded buffers; keep only the image bytes.
        let pixels = self.state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            let image = buf.get(..expected).with_context(|| {
                format!("short v4l2 buffer: {} of {} bytes", buf.len(), expected)
            })?;
            Ok(image.to_vec())
        })?;

        self.frame_count += 1;
        Frame::new(
            pixels,
            self.width,
            self.height,
            PixelFormat::Rgb8,
            self.orientation,
            self.frame_count,
        )
    }
}
