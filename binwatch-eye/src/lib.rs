//! binwatch-eye: garbage watch over camera streams
//!
//! Every registered area gets a stream worker polling its capture source on
//! a background thread. Workers sample the shared detector at a fixed
//! cadence, draw the detections onto the frame and, once garbage has stayed
//! in view past the sustain threshold, mail the annotated frame to the
//! cleaning staff. The dashboard loop renders the latest frames and the
//! one-shot alert banners.

pub mod alert;
pub mod camera;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod frame;
pub mod models;
pub mod processing;
pub mod registry;
pub mod stream;
mod utils;

pub use alert::{Alerter, EmailAlerter};
pub use config::AppConfig;
pub use dashboard::{Dashboard, DisplaySink};
pub use error::{EyeError, Result};
pub use frame::{Frame, PixelFormat};
pub use models::{Detection, Detector};
pub use registry::StreamRegistry;
pub use stream::{StreamWorker, WorkerContext};
