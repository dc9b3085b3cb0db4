//! Per-area stream workers and the garbage alert state machine

use crate::alert::Alerter;
use crate::camera::{FrameSource, SourceLocator, SourceOpener, UnavailableSource};
use crate::config::WorkerConfig;
use crate::error::{EyeError, Result};
use crate::frame::Frame;
use crate::processing::DetectionPipeline;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Monotonic time source for the worker loop
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;
}

/// Real time, measured from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to, for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: Duration) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// Lets through at most one detection sample per interval
#[derive(Debug, Clone)]
pub struct SampleGate {
    interval: Duration,
    last_sample: Option<Duration>,
}

impl SampleGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sample: None,
        }
    }

    /// Whether a sample is due at `now`; the first call always is
    pub fn is_due(&self, now: Duration) -> bool {
        match self.last_sample {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        }
    }

    pub fn record(&mut self, now: Duration) {
        self.last_sample = Some(now);
    }
}

/// What the alert state machine decided for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing present, no episode open
    Idle,
    /// First present sample: episode starts now
    EpisodeOpened,
    /// Present, but not for longer than the sustain threshold yet
    Holding,
    /// Present past the threshold: send the alert
    Alert,
    /// Present, alert for this episode already handled
    AlreadyAlerted,
    /// Absent after an open episode: episode closed, latch reset
    EpisodeClosed,
}

/// Debounces garbage presence into at most one alert per episode.
///
/// An episode is the span of consecutive samples reporting garbage. It
/// opens on the first present sample and closes on the first absent one,
/// which also re-arms the alert.
#[derive(Debug, Clone)]
pub struct AlertDebouncer {
    sustain: Duration,
    onset: Option<Duration>,
    alert_sent: bool,
}

impl AlertDebouncer {
    pub fn new(sustain: Duration) -> Self {
        Self {
            sustain,
            onset: None,
            alert_sent: false,
        }
    }

    pub fn observe(&mut self, now: Duration, present: bool) -> Verdict {
        if !present {
            let was_open = self.onset.is_some();
            self.onset = None;
            self.alert_sent = false;
            return if was_open { Verdict::EpisodeClosed } else { Verdict::Idle };
        }

        match self.onset {
            None => {
                self.onset = Some(now);
                Verdict::EpisodeOpened
            }
            Some(_) if self.alert_sent => Verdict::AlreadyAlerted,
            Some(onset) if now.saturating_sub(onset) > self.sustain => {
                // latched whether or not delivery succeeds
                self.alert_sent = true;
                Verdict::Alert
            }
            Some(_) => Verdict::Holding,
        }
    }

    pub fn episode_open(&self) -> bool {
        self.onset.is_some()
    }

    pub fn alert_sent(&self) -> bool {
        self.alert_sent
    }
}

/// Banner text published after an alert
pub fn alert_message(area: &str, wall_time: &str) -> String {
    format!("Garbage detected in {} at {}. Email Has Been Sent!", area, wall_time)
}

/// Counters describing a worker's activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames_read: u64,
    pub read_failures: u64,
    pub samples: u64,
    pub detector_errors: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
}

#[derive(Default)]
struct Counters {
    frames_read: AtomicU64,
    read_failures: AtomicU64,
    samples: AtomicU64,
    detector_errors: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
        }
    }
}

/// Cancellation flag whose waits wake up as soon as it is set
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep up to `timeout`; returns true once stopped
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.condvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// State shared between a worker's thread and its readers
#[derive(Default)]
struct Shared {
    frame: Mutex<Option<Frame>>,
    message: Mutex<Option<String>>,
    stop: StopSignal,
    counters: Counters,
}

/// Collaborators handed to every stream worker
#[derive(Clone)]
pub struct WorkerContext {
    pub opener: Arc<dyn SourceOpener>,
    pub pipeline: DetectionPipeline,
    pub alerter: Arc<dyn Alerter>,
    pub clock: Arc<dyn Clock>,
    pub config: WorkerConfig,
}

impl WorkerContext {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        pipeline: DetectionPipeline,
        alerter: Arc<dyn Alerter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            opener,
            pipeline,
            alerter,
            clock: Arc::new(SystemClock::new()),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// One iteration-at-a-time body of a worker: read, maybe sample, maybe alert, publish
pub struct StreamLoop {
    area: String,
    source: Box<dyn FrameSource>,
    pipeline: DetectionPipeline,
    alerter: Arc<dyn Alerter>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    gate: SampleGate,
    debouncer: AlertDebouncer,
    shared: Arc<Shared>,
}

impl StreamLoop {
    fn new(area: String, source: Box<dyn FrameSource>, ctx: &WorkerContext, shared: Arc<Shared>) -> Self {
        Self {
            area,
            source,
            pipeline: ctx.pipeline.clone(),
            alerter: ctx.alerter.clone(),
            clock: ctx.clock.clone(),
            config: ctx.config.clone(),
            gate: SampleGate::new(ctx.config.sample_interval),
            debouncer: AlertDebouncer::new(ctx.config.sustain_threshold),
            shared,
        }
    }

    /// A loop not attached to any thread; the caller drives it with `tick`
    pub fn detached(area: &str, source: Box<dyn FrameSource>, ctx: &WorkerContext) -> Self {
        Self::new(area.to_string(), source, ctx, Arc::new(Shared::default()))
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.shared.frame.lock().clone()
    }

    pub fn take_message(&self) -> Option<String> {
        self.shared.message.lock().take()
    }

    pub fn stats(&self) -> WorkerStats {
        self.shared.counters.snapshot()
    }

    /// Run one iteration and return how long to pause before the next
    pub fn tick(&mut self) -> Duration {
        let frame = match self.source.read() {
            Some(frame) => frame,
            None => {
                self.shared.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                return self.config.read_retry_delay;
            }
        };
        self.shared.counters.frames_read.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();
        let frame = if self.gate.is_due(now) {
            self.sample(frame, now)
        } else {
            frame
        };

        *self.shared.frame.lock() = Some(frame);
        self.config.loop_pause
    }

    fn sample(&mut self, frame: Frame, now: Duration) -> Frame {
        self.gate.record(now);
        self.shared.counters.samples.fetch_add(1, Ordering::Relaxed);

        // keep a copy so a detector failure still publishes the raw frame
        let result = match self.pipeline.process(frame.clone()) {
            Ok(result) => result,
            Err(e) => {
                self.shared.counters.detector_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Detection failed for {}, retrying next sample: {}", self.area, e);
                return frame;
            }
        };

        let verdict = self.debouncer.observe(now, result.garbage_present);
        debug!(
            "Sample for {}: {} detections, {:?}",
            self.area,
            result.detections.len(),
            verdict
        );

        if verdict == Verdict::Alert {
            if self.alerter.send_alert(&self.area, &result.frame) {
                self.shared.counters.alerts_sent.fetch_add(1, Ordering::Relaxed);
            } else {
                self.shared.counters.alerts_failed.fetch_add(1, Ordering::Relaxed);
            }
            let wall_time = chrono::Local::now().format("%H:%M:%S").to_string();
            let message = alert_message(&self.area, &wall_time);
            info!("{}", message);
            *self.shared.message.lock() = Some(message);
        }

        result.frame
    }

    /// Release the capture source
    pub fn release(&mut self) {
        self.source.release();
    }
}

/// Owns one capture source and the background thread polling it
pub struct StreamWorker {
    area: String,
    locator: SourceLocator,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamWorker {
    /// Open the source and start polling it in the background.
    ///
    /// A source that fails to open is not an error here: the worker keeps
    /// running and simply never produces a frame.
    pub fn start(locator: SourceLocator, area: &str, ctx: &WorkerContext) -> Result<Self> {
        let source: Box<dyn FrameSource> = match ctx.opener.open(&locator) {
            Ok(source) => source,
            Err(e) => {
                warn!("Could not open {} for {}: {}", locator, area, e);
                Box::new(UnavailableSource)
            }
        };
        Self::start_with_source(locator, area, source, ctx)
    }

    /// Start polling an already opened source
    pub fn start_with_source(
        locator: SourceLocator,
        area: &str,
        source: Box<dyn FrameSource>,
        ctx: &WorkerContext,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let mut body = StreamLoop::new(area.to_string(), source, ctx, shared.clone());
        let thread_shared = shared.clone();

        let handle = std::thread::Builder::new()
            .name(format!("stream-{}", area))
            .spawn(move || {
                while !thread_shared.stop.is_stopped() {
                    let pause = body.tick();
                    if thread_shared.stop.wait(pause) {
                        break;
                    }
                }
                body.release();
            })
            .map_err(|e| EyeError::Camera(format!("Failed to spawn worker for {}: {}", area, e)))?;

        info!("Stream worker started for {} ({})", area, locator);
        Ok(Self {
            area: area.to_string(),
            locator,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    /// Copy of the latest published frame
    pub fn get_frame(&self) -> Option<Frame> {
        self.shared.frame.lock().clone()
    }

    /// Take the pending alert message; later calls return `None` until the next alert
    pub fn get_pending_message(&self) -> Option<String> {
        self.shared.message.lock().take()
    }

    /// Look at the pending message without consuming it
    pub fn peek_pending_message(&self) -> Option<String> {
        self.shared.message.lock().clone()
    }

    pub fn clear_pending_message(&self) {
        *self.shared.message.lock() = None;
    }

    pub fn stats(&self) -> WorkerStats {
        self.shared.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop, wait for it to exit and release the capture
    pub fn stop(&self) {
        self.shared.stop.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Stream worker for {} panicked", self.area);
            } else {
                info!("Stream worker for {} stopped", self.area);
            }
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
