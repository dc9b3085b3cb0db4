//! YOLOv8 garbage detector on ONNX Runtime

use super::nms::apply_nms;
use super::{BoundingBox, Detection, Detector};
use crate::config::DetectorConfig;
use crate::error::{EyeError, Result};
use crate::frame::Frame;
use crate::utils::frame_to_chw_tensor;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Upper bound on candidates decoded from one output tensor
const MAX_DETECTIONS: usize = 300;

/// YOLOv8 model exported to ONNX
pub struct YoloModel {
    session: Mutex<Session>,
    input_size: u32,
    class_names: Vec<String>,
    score_threshold: f32,
    iou_threshold: f32,
}

impl YoloModel {
    /// Load the model named in the configuration
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        config.validate().map_err(EyeError::Config)?;

        if !config.model_path.exists() {
            return Err(EyeError::Model(format!("Model file {:?} not found", config.model_path)));
        }

        let session = Session::builder()?
            .commit_from_file(&config.model_path)
            .map_err(|e| EyeError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?}", config.model_path);

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            class_names: config.class_names.clone(),
            score_threshold: config.score_threshold,
            iou_threshold: config.iou_threshold,
        })
    }

    fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    /// Decode a `[1, 4 + classes, anchors]` output into frame-space detections
    fn postprocess(&self, shape: &[i64], data: &[f32], frame: &Frame) -> Result<Vec<Detection>> {
        if shape.len() != 3 || shape[0] != 1 {
            return Err(EyeError::Model(format!("Unexpected YOLO output shape {:?}", shape)));
        }
        let rows = shape[1] as usize;
        let anchors = shape[2] as usize;
        if rows <= 4 || data.len() != rows * anchors {
            return Err(EyeError::Model(format!("Unexpected YOLO output shape {:?}", shape)));
        }
        let num_classes = rows - 4;

        let scale_x = frame.width() as f32 / self.input_size as f32;
        let scale_y = frame.height() as f32 / self.input_size as f32;
        let frame_w = frame.width() as f32;
        let frame_h = frame.height() as f32;
        let at = |row: usize, anchor: usize| data[row * anchors + anchor];

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let mut best_class = 0;
            let mut best_score = f32::MIN;
            for class_idx in 0..num_classes {
                let score = at(4 + class_idx, i);
                if score > best_score {
                    best_score = score;
                    best_class = class_idx;
                }
            }

            if !best_score.is_finite() || best_score < self.score_threshold {
                continue;
            }

            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, frame_w);
            let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, frame_h);
            let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, frame_w);
            let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, frame_h);
            let bbox = BoundingBox::from_corners(x1, y1, x2, y2);

            if !bbox.is_finite() || bbox.width <= 0.0 || bbox.height <= 0.0 {
                continue;
            }

            candidates.push(Detection {
                class_id: best_class,
                label: self.class_name(best_class),
                confidence: best_score.min(1.0),
                bbox,
            });
        }

        let mut detections = apply_nms(candidates, self.iou_threshold);
        detections.truncate(MAX_DETECTIONS);
        debug!("YOLO detected {} objects", detections.len());
        Ok(detections)
    }
}

impl Detector for YoloModel {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let size = self.input_size as usize;
        let input = frame_to_chw_tensor(frame, self.input_size, self.input_size)?;
        let tensor = Tensor::from_array(([1usize, 3, size, size], input))?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let shape: Vec<i64> = shape.iter().copied().collect();
        self.postprocess(&shape, data, frame)
    }
}
