//! Detection overlay: coordinate transform, overlay state, render surfaces and
//! the single-owner renderer.

mod renderer;
mod state;
mod surface;
mod transform;

pub use renderer::{
    overlay_channel, OverlayInbox, OverlayMessage, OverlayPoster, OverlayRenderer, RenderStep,
};
pub use state::{DrawCommand, OverlayItem, OverlayLabel, OverlayState, Rgba, BOX_COLOR};
pub use surface::{ImageSurface, RecordingSurface, RenderSurface};
pub use transform::{to_surface_rect, PixelRect, SurfaceSize};
