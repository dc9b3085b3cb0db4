//! Registry of active stream workers keyed by area name

use crate::camera::SourceLocator;
use crate::error::{EyeError, Result, REGISTRATION_INCOMPLETE};
use crate::stream::{StreamWorker, WorkerContext};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Holds one worker per area. Registering an area that already exists
/// replaces its worker: the old one is stopped and joined first.
pub struct StreamRegistry {
    ctx: WorkerContext,
    workers: RwLock<BTreeMap<String, Arc<StreamWorker>>>,
}

impl StreamRegistry {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx,
            workers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Start a worker for `area` reading from `source`
    pub fn register(&self, source: &str, area: &str) -> Result<Arc<StreamWorker>> {
        let source = source.trim();
        let area = area.trim();
        if source.is_empty() || area.is_empty() {
            return Err(EyeError::Registration(REGISTRATION_INCOMPLETE.to_string()));
        }

        if let Some(previous) = self.workers.write().remove(area) {
            info!("Replacing stream for {}", area);
            previous.stop();
        }

        let worker = Arc::new(StreamWorker::start(SourceLocator::parse(source), area, &self.ctx)?);
        let displaced = self.workers.write().insert(area.to_string(), worker.clone());
        if let Some(displaced) = displaced {
            displaced.stop();
        }

        info!("Added stream for {}", area);
        Ok(worker)
    }

    /// Stop and forget the worker for `area`
    pub fn remove(&self, area: &str) -> bool {
        let removed = self.workers.write().remove(area.trim());
        match removed {
            Some(worker) => {
                worker.stop();
                info!("Removed stream for {}", area);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, area: &str) -> Option<Arc<StreamWorker>> {
        self.workers.read().get(area).cloned()
    }

    /// Registered areas in name order
    pub fn areas(&self) -> Vec<String> {
        self.workers.read().keys().cloned().collect()
    }

    /// Snapshot of all workers in area order
    pub fn workers(&self) -> Vec<Arc<StreamWorker>> {
        self.workers.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Stop every worker and empty the registry
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.workers.write());
        for (_, worker) in workers {
            worker.stop();
        }
        info!("All streams stopped");
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
