//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use binwatch_eye::alert::Alerter;
use binwatch_eye::camera::{FrameSource, SourceLocator, SourceOpener};
use binwatch_eye::config::WorkerConfig;
use binwatch_eye::error::{EyeError, Result};
use binwatch_eye::frame::{Frame, PixelFormat};
use binwatch_eye::models::{BoundingBox, Detection, Detector};
use binwatch_eye::processing::DetectionPipeline;
use binwatch_eye::stream::{Clock, WorkerContext};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pixel value marking a frame that shows garbage
pub const GARBAGE: u8 = 255;
/// Pixel value marking an empty scene
pub const CLEAN: u8 = 0;

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

pub fn frame_of(value: u8) -> Frame {
    Frame::filled(WIDTH, HEIGHT, PixelFormat::Bgr8, value).unwrap()
}

/// Worker timings scaled down for real-time tests
pub fn fast_config() -> WorkerConfig {
    WorkerConfig {
        sample_interval: Duration::from_millis(10),
        sustain_threshold: Duration::from_millis(40),
        read_retry_delay: Duration::from_millis(5),
        loop_pause: Duration::from_millis(1),
        confidence_floor: 0.1,
    }
}

/// Source producing frames of a constant value; can be switched at runtime
pub struct ConstantSource {
    value: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl FrameSource for ConstantSource {
    fn read(&mut self) -> Option<Frame> {
        if self.released.load(Ordering::SeqCst) {
            return None;
        }
        Some(frame_of(self.value.load(Ordering::SeqCst) as u8))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Opener handing out `ConstantSource`s that share one scene value
#[derive(Default)]
pub struct SceneOpener {
    pub value: Arc<AtomicUsize>,
    pub released: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    pub opened: Arc<Mutex<Vec<SourceLocator>>>,
}

impl SceneOpener {
    pub fn set_scene(&self, value: u8) {
        self.value.store(value as usize, Ordering::SeqCst);
    }

    pub fn released_count(&self) -> usize {
        self.released
            .lock()
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }
}

impl SourceOpener for SceneOpener {
    fn open(&self, locator: &SourceLocator) -> Result<Box<dyn FrameSource>> {
        if let SourceLocator::Uri(uri) = locator {
            if uri.starts_with("broken://") {
                return Err(EyeError::Camera(format!("{} cannot be opened", uri)));
            }
        }
        let released = Arc::new(AtomicBool::new(false));
        self.released.lock().push(released.clone());
        self.opened.lock().push(locator.clone());
        Ok(Box::new(ConstantSource {
            value: self.value.clone(),
            released,
        }))
    }
}

/// Reports garbage whenever the first pixel byte is `GARBAGE`
#[derive(Default)]
pub struct MarkerDetector {
    pub calls: AtomicU64,
    pub fail: AtomicBool,
}

impl Detector for MarkerDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EyeError::Model("scripted failure".to_string()));
        }
        if frame.data()[0] != GARBAGE {
            return Ok(vec![]);
        }
        Ok(vec![Detection {
            class_id: 2,
            label: "garbage".to_string(),
            confidence: 0.87,
            bbox: BoundingBox::new(2.0, 2.0, 12.0, 10.0),
        }])
    }
}

/// One recorded alert
#[derive(Debug, Clone)]
pub struct AlertCall {
    pub area: String,
    pub frame: Frame,
    pub at: Duration,
}

/// Records alerts instead of sending them
pub struct RecordingAlerter {
    pub calls: Mutex<Vec<AlertCall>>,
    pub succeed: AtomicBool,
    clock: Option<Arc<dyn Clock>>,
    origin: Instant,
}

impl RecordingAlerter {
    pub fn new(succeed: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            succeed: AtomicBool::new(succeed),
            clock: None,
            origin: Instant::now(),
        }
    }

    pub fn with_clock(succeed: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock: Some(clock),
            ..Self::new(succeed)
        }
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Alerter for RecordingAlerter {
    fn send_alert(&self, area: &str, frame: &Frame) -> bool {
        let at = match &self.clock {
            Some(clock) => clock.now(),
            None => self.origin.elapsed(),
        };
        self.calls.lock().push(AlertCall {
            area: area.to_string(),
            frame: frame.clone(),
            at,
        });
        self.succeed.load(Ordering::SeqCst)
    }
}

pub fn context(
    opener: Arc<dyn SourceOpener>,
    detector: Arc<dyn Detector>,
    alerter: Arc<dyn Alerter>,
    config: WorkerConfig,
) -> WorkerContext {
    let pipeline = DetectionPipeline::new(detector, config.confidence_floor);
    WorkerContext::new(opener, pipeline, alerter, config)
}

/// Poll `check` until it holds or `timeout` passes
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    check()
}
