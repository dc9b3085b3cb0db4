//! Owned video frames

use crate::error::{EyeError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, RgbImage};

/// Channel order of a packed 8-bit, 3-channel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Capture order (what OpenCV hands out)
    Bgr8,
    /// Display order
    Rgb8,
}

/// A packed 3-channel frame. Cloning copies the pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a pixel buffer, checking it matches the dimensions
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|p| p.checked_mul(3))
            .ok_or_else(|| EyeError::Processing("Frame dimensions overflow".to_string()))?;

        if width == 0 || height == 0 {
            return Err(EyeError::Processing("Frame dimensions must be non-zero".to_string()));
        }
        if data.len() != expected {
            return Err(EyeError::Processing(format!(
                "Frame buffer holds {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A frame with every byte set to `value`
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Result<Self> {
        let len = (width as usize) * (height as usize) * 3;
        Self::new(width, height, format, vec![value; len])
    }

    /// Convert a decoded image into a capture-order frame
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        Self::from_rgb_image(image.to_rgb8(), PixelFormat::Bgr8)
    }

    /// Take an RGB image back into a frame stored as `format`
    pub fn from_rgb_image(image: RgbImage, format: PixelFormat) -> Result<Self> {
        let (width, height) = image.dimensions();
        let frame = Self::new(width, height, PixelFormat::Rgb8, image.into_raw())?;
        Ok(match format {
            PixelFormat::Rgb8 => frame,
            PixelFormat::Bgr8 => frame.to_bgr(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read one pixel in RGB order
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        let px = &self.data[idx..idx + 3];
        Some(match self.format {
            PixelFormat::Rgb8 => [px[0], px[1], px[2]],
            PixelFormat::Bgr8 => [px[2], px[1], px[0]],
        })
    }

    fn swapped(&self, format: PixelFormat) -> Frame {
        let mut data = self.data.clone();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Frame {
            width: self.width,
            height: self.height,
            format,
            data,
        }
    }

    /// Copy in display (RGB) order
    pub fn to_rgb(&self) -> Frame {
        match self.format {
            PixelFormat::Rgb8 => self.clone(),
            PixelFormat::Bgr8 => self.swapped(PixelFormat::Rgb8),
        }
    }

    /// Copy in capture (BGR) order
    pub fn to_bgr(&self) -> Frame {
        match self.format {
            PixelFormat::Bgr8 => self.clone(),
            PixelFormat::Rgb8 => self.swapped(PixelFormat::Bgr8),
        }
    }

    /// RGB image view for the `image` crate
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let rgb = self.to_rgb();
        RgbImage::from_raw(rgb.width, rgb.height, rgb.data)
            .ok_or_else(|| EyeError::Processing("Frame buffer does not fit image".to_string()))
    }

    /// Encode as JPEG bytes
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgb = self.to_rgb();
        let mut bytes = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
            encoder.encode(&rgb.data, rgb.width, rgb.height, ExtendedColorType::Rgb8)?;
        }
        Ok(bytes)
    }
}
