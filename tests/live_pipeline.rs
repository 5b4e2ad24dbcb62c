use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::Result;
use tempfile::NamedTempFile;

use detect_overlay::overlay::PixelRect;
use detect_overlay::{
    overlay_channel, CapturePreset, CaptureSettings, CropScale, DetectionPipeline,
    DeviceSelector, InferenceService, LivePipeline, ModelSettings, Orientation, OverlayInbox,
    OverlayRenderer, PipelineError, RecordingSurface, RenderStep, ScriptStep, ScriptedBackend,
};

fn stub_camera() -> DeviceSelector {
    DeviceSelector::Path("stub://rear".to_string())
}

fn fast_capture() -> CaptureSettings {
    CaptureSettings {
        preset: CapturePreset::Vga,
        orientation: Orientation::Right,
        target_fps: 100,
    }
}

fn write_script(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp script");
    file.write_all(json.as_bytes()).expect("write script");
    file
}

fn render_until(
    renderer: &mut OverlayRenderer<RecordingSurface>,
    inbox: &OverlayInbox,
    batches: u64,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while renderer.state().batches_applied() < batches && Instant::now() < deadline {
        if renderer.poll(inbox, Duration::from_millis(50)) == RenderStep::Closed {
            break;
        }
    }
}

#[test]
fn stub_camera_drives_overlay() -> Result<()> {
    let script = write_script(
        r#"{"steps": [
            {"detections": [{"x": 0.25, "y": 0.25, "w": 0.5, "h": 0.25, "confidence": 0.88}]}
        ]}"#,
    );
    let settings = ModelSettings {
        path: script.path().to_path_buf(),
        ..ModelSettings::default()
    };
    let service = InferenceService::load(&settings)?;
    let (poster, inbox) = overlay_channel();
    let pipeline = DetectionPipeline::new(service, poster);
    let mut live = LivePipeline::start(&stub_camera(), &fast_capture(), pipeline, 2)?;

    let mut renderer = OverlayRenderer::new(RecordingSurface::new(200.0, 100.0));
    render_until(&mut renderer, &inbox, 5);
    live.stop();

    assert!(renderer.state().batches_applied() >= 5);
    assert_eq!(
        renderer.surface().rects(),
        vec![PixelRect::new(50.0, 50.0, 100.0, 25.0)]
    );
    assert_eq!(renderer.state().items()[0].label.text, "Conf: 0.88");

    let stats = live.pipeline().stats();
    assert!(stats.frames_submitted >= 5);
    assert!(stats.frames_received >= stats.frames_submitted);
    assert_eq!(stats.requests_failed, 0);
    Ok(())
}

#[test]
fn missing_camera_never_reaches_the_detector() -> Result<()> {
    let backend = ScriptedBackend::new(vec![ScriptStep::detections(Vec::new())])?;
    let calls = backend.call_counter();
    let service = InferenceService::new(backend, CropScale::CenterCrop)?;
    let (poster, inbox) = overlay_channel();
    let pipeline = DetectionPipeline::new(service, poster);

    let selector = DeviceSelector::Path("/dev/no-such-camera-42".to_string());
    let err = LivePipeline::start(&selector, &fast_capture(), pipeline, 2)
        .err()
        .expect("start must fail");
    assert!(matches!(
        PipelineError::find(&err),
        Some(PipelineError::DeviceUnavailable(_))
    ));

    // Every poster went down with the pipeline; the overlay stays empty.
    let mut renderer = OverlayRenderer::new(RecordingSurface::new(200.0, 100.0));
    assert_eq!(
        renderer.poll(&inbox, Duration::from_millis(100)),
        RenderStep::Closed
    );
    assert!(renderer.state().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn missing_model_is_a_setup_error() {
    let settings = ModelSettings {
        path: "/nonexistent/best.json".into(),
        ..ModelSettings::default()
    };
    let err = InferenceService::load(&settings).err().expect("load must fail");
    assert!(matches!(
        PipelineError::find(&err),
        Some(PipelineError::InferenceSetupError(_))
    ));
}

#[test]
fn failed_requests_leave_previous_overlay_and_stream_continues() -> Result<()> {
    let script = write_script(
        r#"{"steps": [
            {"detections": [{"x": 0.0, "y": 0.0, "w": 0.5, "h": 0.5, "confidence": 0.4}]},
            {"fail": "model rejected input"}
        ]}"#,
    );
    let settings = ModelSettings {
        path: script.path().to_path_buf(),
        ..ModelSettings::default()
    };
    let service = InferenceService::load(&settings)?;
    let (poster, inbox) = overlay_channel();
    let pipeline = DetectionPipeline::new(service, poster);
    let mut live = LivePipeline::start(&stub_camera(), &fast_capture(), pipeline, 1)?;

    let mut renderer = OverlayRenderer::new(RecordingSurface::new(100.0, 100.0));
    render_until(&mut renderer, &inbox, 3);
    live.stop();
    assert!(live.pipeline().wait_idle(Duration::from_secs(5)));

    assert!(renderer.state().batches_applied() >= 3);
    assert_eq!(renderer.state().len(), 1);
    assert!(live.pipeline().stats().requests_failed >= 2);
    Ok(())
}

#[test]
fn slow_detector_supersedes_frames() -> Result<()> {
    let backend = ScriptedBackend::new(vec![
        ScriptStep::detections(Vec::new()).delayed(Duration::from_millis(80))
    ])?;
    let service = InferenceService::new(backend, CropScale::ScaleFit)?;
    let (poster, _inbox) = overlay_channel();
    let pipeline = DetectionPipeline::new(service, poster);
    let capture = CaptureSettings {
        target_fps: 200,
        ..fast_capture()
    };
    let mut live = LivePipeline::start(&stub_camera(), &capture, pipeline, 1)?;

    std::thread::sleep(Duration::from_millis(500));
    assert!(live.pipeline().in_flight() <= 1);
    live.stop();

    let stats = live.pipeline().stats();
    assert!(stats.frames_superseded > 0);
    assert!(stats.frames_submitted < stats.frames_received);
    Ok(())
}

#[test]
fn stop_is_idempotent() -> Result<()> {
    let backend = ScriptedBackend::new(vec![ScriptStep::detections(Vec::new())])?;
    let service = InferenceService::new(backend, CropScale::CenterCrop)?;
    let (poster, _inbox) = overlay_channel();
    let pipeline = DetectionPipeline::new(service, poster);
    let mut live = LivePipeline::start(&stub_camera(), &fast_capture(), pipeline, 2)?;

    std::thread::sleep(Duration::from_millis(100));
    live.stop();
    live.stop();
    assert!(!live.capture().is_running());

    let received = live.pipeline().stats().frames_received;
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(live.pipeline().stats().frames_received, received);
    Ok(())
}
