use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geometry::{CropRect, Size};

/// Pixel layout of captured frames. Duplication is always requested as BGRA8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra8 => 4,
        }
    }
}

/// Full output image read back from the GPU, rows tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl DecodedImage {
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// One published, cropped capture result.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tightly packed pixels, `width * height * bytes_per_pixel` long.
    pub data: Vec<u8>,
    /// Crop applied to the source image.
    pub region: CropRect,
    /// Size of the source image before cropping.
    pub source_size: Size,
    /// Monotonic publish counter, starting at 1 for each controller.
    pub sequence: u64,
    /// Backend presentation timestamp of the source frame.
    pub present_time: i64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// BGRA value at (x, y), if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * self.format.bytes_per_pixel();
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}
