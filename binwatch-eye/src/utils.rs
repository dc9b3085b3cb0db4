//! Utility functions for vision processing

use crate::error::{EyeError, Result};
use crate::frame::Frame;
use image::imageops::{self, FilterType};

/// Resize a frame and lay it out as an RGB float32 tensor in CHW order, scaled to [0, 1]
pub fn frame_to_chw_tensor(frame: &Frame, target_width: u32, target_height: u32) -> Result<Vec<f32>> {
    if target_width == 0 || target_height == 0 {
        return Err(EyeError::Processing("Target dimensions cannot be zero".to_string()));
    }

    let total = (target_width as usize)
        .checked_mul(target_height as usize)
        .and_then(|p| p.checked_mul(3))
        .ok_or_else(|| EyeError::Processing("Target dimensions too large, would overflow".to_string()))?;

    if total > 100_000_000 {
        return Err(EyeError::Processing("Target dimensions too large (max 100M values)".to_string()));
    }

    let rgb = frame.to_rgb_image()?;
    let resized = if rgb.dimensions() == (target_width, target_height) {
        rgb
    } else {
        imageops::resize(&rgb, target_width, target_height, FilterType::Triangle)
    };

    let plane = (target_width as usize) * (target_height as usize);
    let mut chw = vec![0.0f32; total];
    for (i, px) in resized.pixels().enumerate() {
        for c in 0..3 {
            chw[c * plane + i] = px.0[c] as f32 / 255.0;
        }
    }

    Ok(chw)
}

/// Round a confidence up to two decimals, the precision shown on labels
pub fn round_confidence(confidence: f32) -> f32 {
    if !confidence.is_finite() {
        return 0.0;
    }
    ((confidence * 100.0).ceil() / 100.0).clamp(0.0, 1.0)
}
