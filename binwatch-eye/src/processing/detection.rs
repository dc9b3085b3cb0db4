//! Object detection pipeline

use crate::error::Result;
use crate::frame::Frame;
use crate::models::{Detection, Detector};
use crate::processing::overlay;
use crate::utils::round_confidence;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one detection sample
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// The sampled frame with every kept detection drawn on it
    pub frame: Frame,
    /// Detections above the confidence floor, confidences rounded up to 0.01
    pub detections: Vec<Detection>,
    /// True iff at least one detection cleared the floor
    pub garbage_present: bool,
}

/// Runs the shared detector, filters by confidence and annotates the frame
#[derive(Clone)]
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    confidence_floor: f32,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>, confidence_floor: f32) -> Self {
        Self {
            detector,
            confidence_floor,
        }
    }

    pub fn confidence_floor(&self) -> f32 {
        self.confidence_floor
    }

    /// Detect on `frame`, consuming it into the annotated result
    pub fn process(&self, mut frame: Frame) -> Result<DetectionResult> {
        let raw = self.detector.detect(&frame)?;

        let detections: Vec<Detection> = raw
            .into_iter()
            .map(|mut det| {
                det.confidence = round_confidence(det.confidence);
                det
            })
            .filter(|det| det.confidence > self.confidence_floor)
            .collect();

        overlay::annotate(&mut frame, &detections)?;
        debug!("Detected {} objects above {}", detections.len(), self.confidence_floor);

        Ok(DetectionResult {
            garbage_present: !detections.is_empty(),
            frame,
            detections,
        })
    }
}
