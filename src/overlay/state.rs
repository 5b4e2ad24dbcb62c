use crate::detect::Detection;

use super::transform::{to_surface_rect, PixelRect, SurfaceSize};

pub type Rgba = [u8; 4];

pub const BOX_COLOR: Rgba = [255, 0, 0, 255];
pub const BOX_LINE_WIDTH: f32 = 2.0;
pub const LABEL_FONT_PX: f32 = 14.0;
pub const LABEL_WIDTH: f32 = 100.0;
pub const LABEL_HEIGHT: f32 = 20.0;

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayLabel {
    pub text: String,
    pub frame: PixelRect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayItem {
    pub rect: PixelRect,
    pub confidence: f32,
    pub label: OverlayLabel,
}

impl OverlayItem {
    pub fn from_detection(detection: &Detection, surface: SurfaceSize) -> Self {
        let rect = to_surface_rect(detection.bbox, surface);
        let text = match &detection.label {
            Some(class) => format!("{} {:.2}", class, detection.confidence),
            None => format!("Conf: {:.2}", detection.confidence),
        };
        Self {
            rect,
            confidence: detection.confidence,
            label: OverlayLabel {
                text,
                frame: PixelRect::new(rect.x, rect.y - LABEL_HEIGHT, LABEL_WIDTH, LABEL_HEIGHT),
            },
        }
    }
}

/// One primitive handed to the render surface.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    StrokeRect {
        rect: PixelRect,
        color: Rgba,
        line_width: f32,
    },
    Text {
        text: String,
        frame: PixelRect,
        color: Rgba,
        font_px: f32,
    },
}

/// Items currently on screen. Replaced wholesale on every batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayState {
    items: Vec<OverlayItem>,
    /// Capture sequence of the frame the items came from, when known.
    source_frame: Option<u64>,
    batches_applied: u64,
}

impl OverlayState {
    pub fn replace(&mut self, items: Vec<OverlayItem>, source_frame: Option<u64>) {
        self.items = items;
        self.source_frame = source_frame;
        self.batches_applied += 1;
    }

    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn source_frame(&self) -> Option<u64> {
        self.source_frame
    }

    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Draw commands for the current items, in paint order.
    pub fn draw_commands(&self) -> Vec<DrawCommand> {
        let mut commands = Vec::with_capacity(self.items.len() * 2);
        for item in &self.items {
            commands.push(DrawCommand::StrokeRect {
                rect: item.rect,
                color: BOX_COLOR,
                line_width: BOX_LINE_WIDTH,
            });
            commands.push(DrawCommand::Text {
                text: item.label.text.clone(),
                frame: item.label.frame,
                color: BOX_COLOR,
                font_px: LABEL_FONT_PX,
            });
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::NormalizedRect;

    #[test]
    fn label_sits_above_box() {
        let det = Detection::new(NormalizedRect::new(0.25, 0.25, 0.5, 0.25), 0.876);
        let item = OverlayItem::from_detection(&det, SurfaceSize::new(200.0, 100.0));
        assert_eq!(item.label.text, "Conf: 0.88");
        assert_eq!(item.label.frame, PixelRect::new(50.0, 30.0, 100.0, 20.0));
    }

    #[test]
    fn class_label_replaces_prefix() {
        let det = Detection::new(NormalizedRect::FULL, 0.5).with_label("car");
        let item = OverlayItem::from_detection(&det, SurfaceSize::new(10.0, 10.0));
        assert_eq!(item.label.text, "car 0.50");
    }

    #[test]
    fn two_commands_per_item() {
        let det = Detection::new(NormalizedRect::FULL, 0.5);
        let surface = SurfaceSize::new(10.0, 10.0);
        let mut state = OverlayState::default();
        state.replace(
            vec![
                OverlayItem::from_detection(&det, surface),
                OverlayItem::from_detection(&det, surface),
            ],
            Some(3),
        );
        let commands = state.draw_commands();
        assert_eq!(commands.len(), 4);
        assert!(matches!(commands[0], DrawCommand::StrokeRect { .. }));
        assert!(matches!(commands[1], DrawCommand::Text { .. }));
        assert_eq!(state.source_frame(), Some(3));
    }
}
