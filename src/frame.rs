use crate::error::BroadcastError;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Already JPEG-compressed
    Jpeg,
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit RGBA
    Rgba32,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Jpeg => 0, // Variable size, compressed
            FrameFormat::Rgb24 => 3,
            FrameFormat::Rgba32 => 4,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Jpeg)
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Frame identifier, increasing per capture handle
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Native width in pixels
    pub width: u32,
    /// Native height in pixels
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true, // Compressed formats have variable size
        }
    }

    /// Encode the frame as JPEG at its native resolution
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, BroadcastError> {
        if self.format.is_compressed() {
            return Ok(self.data.as_ref().clone());
        }

        if !self.validate_size() {
            return Err(BroadcastError::Encode {
                details: format!(
                    "frame {} has {} bytes, expected {:?} for {}x{} {:?}",
                    self.id,
                    self.data.len(),
                    self.expected_size(),
                    self.width,
                    self.height,
                    self.format
                ),
            });
        }

        let rgb;
        let pixels: &[u8] = match self.format {
            FrameFormat::Rgb24 => self.data.as_slice(),
            FrameFormat::Rgba32 => {
                rgb = rgba_to_rgb(&self.data);
                &rgb
            }
            FrameFormat::Jpeg => unreachable!("compressed frames return early"),
        };

        let mut jpeg = Vec::with_capacity(pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
            .encode(pixels, self.width, self.height, ColorType::Rgb8)
            .map_err(|e| BroadcastError::Encode {
                details: format!("frame {}: {}", self.id, e),
            })?;

        Ok(jpeg)
    }
}

fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    rgb
}
