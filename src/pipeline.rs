//! Frame-to-overlay pipeline.
//!
//! - `DetectionPipeline`: submits frames to the inference service and posts
//!   completed batches to the overlay owner. Tracks the in-flight count that
//!   makes up its `Idle` / `AwaitingResult` phase.
//! - `FrameSlot`: single-entry mailbox between capture and dispatch; a new
//!   frame supersedes one that has not been picked up yet.
//! - `LivePipeline`: capture session + slot + dispatcher thread.
//!
//! Results are applied in completion order, not capture order. There is no
//! cancellation and no timeout on a submitted frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::capture::{self, CaptureSession, CaptureSettings, DeviceSelector};
use crate::detect::{InferenceService, PendingInference};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::overlay::OverlayPoster;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    AwaitingResult,
}

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_superseded: AtomicU64,
    frames_submitted: AtomicU64,
    results_posted: AtomicU64,
    requests_failed: AtomicU64,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub frames_superseded: u64,
    pub frames_submitted: u64,
    pub results_posted: u64,
    pub requests_failed: u64,
}

#[derive(Clone)]
pub struct DetectionPipeline {
    service: Result<InferenceService, String>,
    poster: OverlayPoster,
    in_flight: Arc<(Mutex<usize>, Condvar)>,
    counters: Arc<Counters>,
}

impl DetectionPipeline {
    pub fn new(service: InferenceService, poster: OverlayPoster) -> Self {
        Self::with_service(Ok(service), poster)
    }

    /// A pipeline whose inference service failed to initialize. Every
    /// `submit` is rejected with `InferenceSetupError`.
    pub fn without_service(reason: impl Into<String>, poster: OverlayPoster) -> Self {
        Self::with_service(Err(reason.into()), poster)
    }

    fn with_service(service: Result<InferenceService, String>, poster: OverlayPoster) -> Self {
        Self {
            service,
            poster,
            in_flight: Arc::new((Mutex::new(0), Condvar::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Hand a frame to the inference service. Returns as soon as the call is
    /// running; the batch is posted to the overlay owner on completion.
    pub fn submit(&self, frame: Frame) -> Result<PendingInference> {
        let service = self
            .service
            .as_ref()
            .map_err(|reason| PipelineError::InferenceSetupError(reason.clone()))?;

        self.adjust_in_flight(1);
        self.counters.frames_submitted.fetch_add(1, Ordering::SeqCst);

        let sequence = frame.sequence;
        let pipeline = self.clone();
        Ok(service.spawn(frame, move |outcome| {
            match outcome {
                Ok(detections) => {
                    pipeline.counters.results_posted.fetch_add(1, Ordering::SeqCst);
                    if !pipeline.poster.post(Some(sequence), detections) {
                        log::debug!(
                            "pipeline: overlay gone, dropping batch for frame {}",
                            sequence
                        );
                    }
                }
                Err(err) => {
                    pipeline.counters.requests_failed.fetch_add(1, Ordering::SeqCst);
                    log::warn!("pipeline: skipping frame {}: {:#}", sequence, err);
                }
            }
            pipeline.adjust_in_flight(-1);
        }))
    }

    fn adjust_in_flight(&self, delta: isize) {
        let (lock, cvar) = &*self.in_flight;
        let mut count = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *count = count.saturating_add_signed(delta);
        cvar.notify_all();
    }

    pub fn in_flight(&self) -> usize {
        let (lock, _) = &*self.in_flight;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> PipelinePhase {
        if self.in_flight() == 0 {
            PipelinePhase::Idle
        } else {
            PipelinePhase::AwaitingResult
        }
    }

    pub fn is_ready(&self) -> bool {
        self.service.is_ok()
    }

    /// Wait until fewer than `limit` calls are in flight. Returns false if
    /// `timeout` passes first.
    pub fn wait_below(&self, limit: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.in_flight;
        let mut count = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while *count >= limit {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = cvar
                .wait_timeout(count, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        true
    }

    /// Wait until no call is in flight.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.wait_below(1, timeout)
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            frames_received: c.frames_received.load(Ordering::SeqCst),
            frames_superseded: c.frames_superseded.load(Ordering::SeqCst),
            frames_submitted: c.frames_submitted.load(Ordering::SeqCst),
            results_posted: c.results_posted.load(Ordering::SeqCst),
            requests_failed: c.requests_failed.load(Ordering::SeqCst),
        }
    }
}

#[derive(Default)]
struct SlotState {
    frame: Option<Frame>,
    closed: bool,
}

/// Single-entry frame mailbox. Only the most recent frame is kept.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, returning the sequence number of a frame it superseded.
    /// Frames put after `close` are dropped.
    pub fn put(&self, frame: Frame) -> Option<u64> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let superseded = state.frame.replace(frame).map(|old| old.sequence);
        self.ready.notify_one();
        superseded
    }

    /// Block until a frame is available. `None` once the slot is closed.
    pub fn take(&self) -> Option<Frame> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.frame.take() {
                return Some(frame);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Wake the consumer and drop any waiting frame.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.frame = None;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Capture session feeding a detection pipeline through a `FrameSlot`.
pub struct LivePipeline {
    capture: CaptureSession,
    slot: Arc<FrameSlot>,
    dispatcher: Option<JoinHandle<()>>,
    pipeline: DetectionPipeline,
}

impl LivePipeline {
    /// Open the camera and start streaming frames into `pipeline`.
    ///
    /// If the device cannot be opened nothing is started: no frame is
    /// delivered and no inference call is made.
    pub fn start(
        selector: &DeviceSelector,
        settings: &CaptureSettings,
        pipeline: DetectionPipeline,
        max_in_flight: usize,
    ) -> Result<Self> {
        if max_in_flight == 0 {
            return Err(anyhow!("max_in_flight must be at least 1"));
        }
        let slot = Arc::new(FrameSlot::new());

        let sink_slot = slot.clone();
        let counters = pipeline.counters.clone();
        let capture = capture::start(selector, settings, move |frame| {
            counters.frames_received.fetch_add(1, Ordering::SeqCst);
            if let Some(old) = sink_slot.put(frame) {
                counters.frames_superseded.fetch_add(1, Ordering::SeqCst);
                log::trace!("pipeline: frame {} superseded before dispatch", old);
            }
        })?;

        let dispatch_slot = slot.clone();
        let dispatch_pipeline = pipeline.clone();
        let dispatcher = std::thread::spawn(move || {
            dispatch(&dispatch_slot, &dispatch_pipeline, max_in_flight);
        });

        Ok(Self {
            capture,
            slot,
            dispatcher: Some(dispatcher),
            pipeline,
        })
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    /// Stop capture and dispatch. Idempotent. Calls already in flight run to
    /// completion and may still post their batch.
    pub fn stop(&mut self) {
        self.capture.stop();
        self.slot.close();
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                log::error!("pipeline: dispatcher panicked");
            }
        }
    }
}

impl Drop for LivePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(slot: &FrameSlot, pipeline: &DetectionPipeline, max_in_flight: usize) {
    const WAIT_STEP: Duration = Duration::from_millis(20);
    let mut setup_error_logged = false;

    loop {
        // Wait for capacity before taking a frame, so the frame we submit is
        // the newest one available at that moment.
        while !pipeline.wait_below(max_in_flight, WAIT_STEP) {
            if slot.is_closed() {
                return;
            }
        }
        let Some(frame) = slot.take() else {
            return;
        };
        if let Err(err) = pipeline.submit(frame) {
            if !setup_error_logged {
                log::error!("pipeline: dropping frames: {:#}", err);
                setup_error_logged = true;
            }
        }
    }
}
