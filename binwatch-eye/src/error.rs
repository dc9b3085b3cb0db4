//! Error types for binwatch-eye

use thiserror::Error;

/// Message shown when a registration is missing its source or area name.
pub const REGISTRATION_INCOMPLETE: &str = "Please provide both URL and area name!";

#[derive(Error, Debug)]
pub enum EyeError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Alert error: {0}")]
    Alert(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

pub type Result<T> = std::result::Result<T, EyeError>;

impl From<lettre::error::Error> for EyeError {
    fn from(err: lettre::error::Error) -> Self {
        EyeError::Alert(format!("Failed to build message: {}", err))
    }
}

impl From<lettre::address::AddressError> for EyeError {
    fn from(err: lettre::address::AddressError) -> Self {
        EyeError::Alert(format!("Invalid address: {}", err))
    }
}

impl From<lettre::transport::smtp::Error> for EyeError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        EyeError::Alert(format!("SMTP transport failed: {}", err))
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for EyeError {
    fn from(err: opencv::Error) -> Self {
        EyeError::OpenCv(err.message)
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for EyeError {
    fn from(err: ort::Error) -> Self {
        EyeError::Ort(err.to_string())
    }
}
