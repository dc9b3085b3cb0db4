//! Dashboard refresh loop over the registered streams

use crate::frame::Frame;
use crate::registry::StreamRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const NO_STREAMS_NOTICE: &str = "No active streams. Add one to start monitoring.";

/// Where the dashboard renders to
pub trait DisplaySink {
    /// Show the latest frame of an area (always RGB)
    fn show_frame(&mut self, area: &str, frame: &Frame);

    /// Show a one-shot success banner
    fn show_banner(&mut self, area: &str, message: &str);

    /// Called instead of the per-area calls when nothing is registered
    fn show_empty(&mut self);
}

/// What one refresh pass rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub frames: usize,
    pub banners: usize,
}

pub struct Dashboard {
    registry: Arc<StreamRegistry>,
    refresh_interval: Duration,
}

impl Dashboard {
    pub fn new(registry: Arc<StreamRegistry>, refresh_interval: Duration) -> Self {
        Self {
            registry,
            refresh_interval,
        }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Render every worker's pending banner and latest frame once
    pub fn refresh_once<S: DisplaySink + ?Sized>(&self, sink: &mut S) -> RefreshSummary {
        let workers = self.registry.workers();
        if workers.is_empty() {
            sink.show_empty();
            return RefreshSummary::default();
        }

        let mut summary = RefreshSummary::default();
        for worker in workers {
            let frame = worker.get_frame();

            if let Some(message) = worker.get_pending_message() {
                sink.show_banner(worker.area(), &message);
                summary.banners += 1;
            }

            if let Some(frame) = frame {
                sink.show_frame(worker.area(), &frame.to_rgb());
                summary.frames += 1;
            }
        }
        summary
    }

    /// Refresh until `running` goes false
    pub fn run<S: DisplaySink + ?Sized>(&self, sink: &mut S, running: &AtomicBool) {
        debug!("Dashboard loop started");
        while running.load(Ordering::SeqCst) {
            self.refresh_once(sink);
            std::thread::sleep(self.refresh_interval);
        }
        debug!("Dashboard loop stopped");
    }
}
