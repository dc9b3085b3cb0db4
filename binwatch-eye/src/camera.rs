//! Capture sources: cameras, network streams and image folders

use crate::error::{EyeError, Result};
use crate::frame::Frame;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Where frames come from, as typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// Local capture device index ("0" is the default webcam)
    Device(i32),
    /// Network URL (RTSP, HTTP) or local file/folder path
    Uri(String),
}

impl SourceLocator {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse::<i32>() {
                return SourceLocator::Device(index);
            }
        }
        SourceLocator::Uri(trimmed.to_string())
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Device(index) => write!(f, "device {}", index),
            SourceLocator::Uri(uri) => write!(f, "{}", uri),
        }
    }
}

/// A blocking frame producer owned by one stream worker
pub trait FrameSource: Send {
    /// Read the next frame; `None` means this read failed
    fn read(&mut self) -> Option<Frame>;

    /// Release the underlying capture handle
    fn release(&mut self);
}

/// Opens capture sources for new stream workers
pub trait SourceOpener: Send + Sync {
    fn open(&self, locator: &SourceLocator) -> Result<Box<dyn FrameSource>>;
}

/// Source used when opening failed: every read fails
#[derive(Debug, Default)]
pub struct UnavailableSource;

impl FrameSource for UnavailableSource {
    fn read(&mut self) -> Option<Frame> {
        None
    }

    fn release(&mut self) {}
}

/// Loops over the image files of a folder (or a single image file)
pub struct ImageFolderSource {
    files: Vec<PathBuf>,
    position: usize,
    released: bool,
}

impl ImageFolderSource {
    pub fn open(path: &Path) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_path(p))
                .collect();
            files.sort();
            files
        } else if path.is_file() && is_image_path(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(EyeError::Camera(format!("{:?} is not an image or image folder", path)));
        };

        if files.is_empty() {
            return Err(EyeError::Camera(format!("No images found in {:?}", path)));
        }

        info!("Image source {:?} opened with {} frames", path, files.len());
        Ok(Self {
            files,
            position: 0,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageFolderSource {
    fn read(&mut self) -> Option<Frame> {
        if self.released || self.files.is_empty() {
            return None;
        }
        let path = &self.files[self.position];
        self.position = (self.position + 1) % self.files.len();

        match image::open(path).map_err(EyeError::from).and_then(|img| Frame::from_image(&img)) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Failed to decode {:?}: {}", path, e);
                None
            }
        }
    }

    fn release(&mut self) {
        self.released = true;
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Picks image folders for local paths and OpenCV capture for everything else
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOpener;

impl SourceOpener for DefaultOpener {
    fn open(&self, locator: &SourceLocator) -> Result<Box<dyn FrameSource>> {
        if let SourceLocator::Uri(uri) = locator {
            let path = Path::new(uri);
            if path.is_dir() || (path.is_file() && is_image_path(path)) {
                return Ok(Box::new(ImageFolderSource::open(path)?));
            }
        }
        open_capture(locator)
    }
}

#[cfg(feature = "opencv")]
fn open_capture(locator: &SourceLocator) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(capture::OpenCvSource::open(locator)?))
}

#[cfg(not(feature = "opencv"))]
fn open_capture(locator: &SourceLocator) -> Result<Box<dyn FrameSource>> {
    warn!("Cannot open {}: built without the opencv feature", locator);
    Err(EyeError::Camera(format!(
        "{} needs video capture support (enable the opencv feature)",
        locator
    )))
}

#[cfg(feature = "opencv")]
pub mod capture {
    //! OpenCV `VideoCapture` backed source

    use super::{FrameSource, SourceLocator};
    use crate::error::{EyeError, Result};
    use crate::frame::{Frame, PixelFormat};
    use opencv::{
        core::{Mat, CV_8UC3},
        prelude::*,
        videoio::{VideoCapture, CAP_ANY},
    };
    use tracing::{info, warn};

    pub struct OpenCvSource {
        capture: Option<VideoCapture>,
        label: String,
    }

    impl OpenCvSource {
        pub fn open(locator: &SourceLocator) -> Result<Self> {
            let capture = match locator {
                SourceLocator::Device(index) => VideoCapture::new(*index, CAP_ANY)
                    .map_err(|e| EyeError::Camera(format!("Failed to open camera {}: {}", index, e)))?,
                SourceLocator::Uri(uri) => VideoCapture::from_file(uri, CAP_ANY)
                    .map_err(|e| EyeError::Camera(format!("Failed to open {}: {}", uri, e)))?,
            };

            if !capture.is_opened()? {
                return Err(EyeError::Camera(format!("{} failed to open", locator)));
            }

            info!("Capture {} opened", locator);
            Ok(Self {
                capture: Some(capture),
                label: locator.to_string(),
            })
        }
    }

    impl FrameSource for OpenCvSource {
        fn read(&mut self) -> Option<Frame> {
            let capture = self.capture.as_mut()?;
            let mut mat = Mat::default();
            match capture.read(&mut mat) {
                Ok(true) if !mat.empty() => match mat_to_frame(&mat) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!("Dropping unusable frame from {}: {}", self.label, e);
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => {
                    warn!("Capture read error on {}: {}", self.label, e);
                    None
                }
            }
        }

        fn release(&mut self) {
            if let Some(mut capture) = self.capture.take() {
                if let Err(e) = capture.release() {
                    warn!("Failed to release {}: {}", self.label, e);
                }
            }
        }
    }

    fn mat_to_frame(mat: &Mat) -> Result<Frame> {
        if mat.typ() != CV_8UC3 {
            return Err(EyeError::OpenCv(format!("Unsupported Mat type {}", mat.typ())));
        }
        let owned;
        let source = if mat.is_continuous() {
            mat
        } else {
            owned = mat.try_clone()?;
            &owned
        };
        let data = source.data_bytes()?.to_vec();
        Frame::new(mat.cols() as u32, mat.rows() as u32, PixelFormat::Bgr8, data)
    }
}
