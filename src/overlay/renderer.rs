//! Overlay renderer and its inbox.
//!
//! The renderer owns the surface and the overlay state and must stay on one
//! thread. Inference completions arrive on worker threads; they never touch
//! the renderer directly but post an `OverlayMessage` through an
//! `OverlayPoster`, and the owning thread applies it when it drains its inbox.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use anyhow::Result;

use crate::detect::Detection;

use super::state::{OverlayItem, OverlayState};
use super::surface::RenderSurface;

#[derive(Debug)]
pub enum OverlayMessage {
    /// A completed detection batch. `frame` is the capture sequence number.
    Detections {
        frame: Option<u64>,
        detections: Vec<Detection>,
    },
    /// Stop the render loop.
    Shutdown,
}

/// Create the inbox for a renderer and the poster other threads use to reach it.
pub fn overlay_channel() -> (OverlayPoster, OverlayInbox) {
    let (tx, rx) = mpsc::channel();
    (OverlayPoster { tx }, OverlayInbox { rx })
}

/// Sending half: posts work to the surface-owning thread.
#[derive(Clone, Debug)]
pub struct OverlayPoster {
    tx: Sender<OverlayMessage>,
}

impl OverlayPoster {
    /// Post a detection batch. Returns false once the renderer is gone.
    pub fn post(&self, frame: Option<u64>, detections: Vec<Detection>) -> bool {
        self.tx
            .send(OverlayMessage::Detections { frame, detections })
            .is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(OverlayMessage::Shutdown);
    }
}

/// Receiving half, held by the surface-owning thread.
#[derive(Debug)]
pub struct OverlayInbox {
    rx: Receiver<OverlayMessage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStep {
    /// A batch was applied to the surface.
    Applied,
    /// Nothing arrived before the timeout.
    Idle,
    /// Shutdown was requested or every poster was dropped.
    Closed,
}

pub struct OverlayRenderer<S: RenderSurface> {
    surface: S,
    state: OverlayState,
}

impl<S: RenderSurface> OverlayRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            state: OverlayState::default(),
        }
    }

    /// Replace the overlay with one item per detection. Nothing is filtered.
    pub fn on_result(&mut self, detections: &[Detection]) -> Result<()> {
        self.apply_batch(None, detections)
    }

    fn apply_batch(&mut self, frame: Option<u64>, detections: &[Detection]) -> Result<()> {
        let size = self.surface.size();
        let items = detections
            .iter()
            .map(|detection| OverlayItem::from_detection(detection, size))
            .collect();
        self.state.replace(items, frame);
        self.surface.replace(&self.state.draw_commands())
    }

    fn handle(&mut self, message: OverlayMessage) -> RenderStep {
        match message {
            OverlayMessage::Detections { frame, detections } => {
                if let Err(err) = self.apply_batch(frame, &detections) {
                    log::warn!("overlay: surface update failed: {:#}", err);
                }
                log::debug!(
                    "overlay: {} boxes from frame {:?}",
                    self.state.len(),
                    frame
                );
                RenderStep::Applied
            }
            OverlayMessage::Shutdown => RenderStep::Closed,
        }
    }

    /// Wait up to `timeout` for one message and apply it.
    pub fn poll(&mut self, inbox: &OverlayInbox, timeout: Duration) -> RenderStep {
        match inbox.rx.recv_timeout(timeout) {
            Ok(message) => self.handle(message),
            Err(RecvTimeoutError::Timeout) => RenderStep::Idle,
            Err(RecvTimeoutError::Disconnected) => RenderStep::Closed,
        }
    }

    /// Apply everything already queued without blocking. Returns the number
    /// of batches applied; stops early at a shutdown message.
    pub fn drain(&mut self, inbox: &OverlayInbox) -> usize {
        let mut applied = 0;
        loop {
            match inbox.rx.try_recv() {
                Ok(message) => match self.handle(message) {
                    RenderStep::Applied => applied += 1,
                    RenderStep::Closed => break,
                    RenderStep::Idle => {}
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    /// Block applying batches until shutdown or until every poster is gone.
    pub fn run(&mut self, inbox: &OverlayInbox) {
        while let Ok(message) = inbox.rx.recv() {
            if self.handle(message) == RenderStep::Closed {
                break;
            }
        }
        log::info!(
            "overlay: render loop finished after {} batches",
            self.state.batches_applied()
        );
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::NormalizedRect;
    use crate::overlay::surface::RecordingSurface;
    use crate::overlay::transform::PixelRect;

    fn det(x: f32, confidence: f32) -> Detection {
        Detection::new(NormalizedRect::new(x, 0.25, 0.25, 0.25), confidence)
    }

    #[test]
    fn empty_batch_clears_overlay() -> Result<()> {
        let mut renderer = OverlayRenderer::new(RecordingSurface::new(200.0, 100.0));
        renderer.on_result(&[det(0.0, 0.9), det(0.5, 0.8)])?;
        assert_eq!(renderer.state().len(), 2);

        renderer.on_result(&[])?;
        assert!(renderer.state().is_empty());
        assert!(renderer.surface().commands().is_empty());
        Ok(())
    }

    #[test]
    fn every_detection_is_drawn_regardless_of_confidence() -> Result<()> {
        let mut renderer = OverlayRenderer::new(RecordingSurface::new(200.0, 100.0));
        let batch = vec![det(0.0, 0.0), det(0.25, 0.01), det(0.5, 0.5), det(0.5, 1.0)];
        renderer.on_result(&batch)?;
        assert_eq!(renderer.state().len(), 4);
        assert_eq!(renderer.surface().rects().len(), 4);
        Ok(())
    }

    #[test]
    fn second_batch_replaces_first() -> Result<()> {
        let mut renderer = OverlayRenderer::new(RecordingSurface::new(200.0, 100.0));
        renderer.on_result(&[det(0.0, 0.9), det(0.25, 0.9), det(0.5, 0.9)])?;
        renderer.on_result(&[det(0.75, 0.4)])?;
        assert_eq!(
            renderer.surface().rects(),
            vec![PixelRect::new(150.0, 50.0, 50.0, 25.0)]
        );
        Ok(())
    }

    #[test]
    fn posted_batches_apply_in_arrival_order() {
        let (poster, inbox) = overlay_channel();
        let mut renderer = OverlayRenderer::new(RecordingSurface::new(100.0, 100.0));

        let worker = {
            let poster = poster.clone();
            std::thread::spawn(move || {
                assert!(poster.post(Some(2), vec![det(0.0, 0.5), det(0.5, 0.5)]));
                assert!(poster.post(Some(1), vec![det(0.25, 0.5)]));
            })
        };
        worker.join().unwrap();

        assert_eq!(renderer.drain(&inbox), 2);
        assert_eq!(renderer.state().len(), 1);
        assert_eq!(renderer.state().source_frame(), Some(1));
    }

    #[test]
    fn run_stops_on_shutdown() {
        let (poster, inbox) = overlay_channel();
        let mut renderer = OverlayRenderer::new(RecordingSurface::new(100.0, 100.0));
        poster.post(None, vec![det(0.0, 0.5)]);
        poster.shutdown();
        renderer.run(&inbox);
        assert_eq!(renderer.state().batches_applied(), 1);
        assert_eq!(renderer.poll(&inbox, Duration::from_millis(1)), RenderStep::Idle);
    }

    #[test]
    fn poll_reports_closed_when_posters_dropped() {
        let (poster, inbox) = overlay_channel();
        drop(poster);
        let mut renderer = OverlayRenderer::new(RecordingSurface::new(100.0, 100.0));
        assert_eq!(
            renderer.poll(&inbox, Duration::from_millis(1)),
            RenderStep::Closed
        );
    }
}
