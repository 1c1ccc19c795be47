use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Region of the captured output kept for consumers.
///
/// The origin may lie outside the captured image; cropping zero-fills
/// whatever part of the rectangle has no source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The whole virtual desktop, anchored at the origin.
    pub fn full(bounds: Size) -> Self {
        Self::new(0, 0, bounds.width, bounds.height)
    }

    /// A rectangle of the requested size centred inside `bounds`.
    ///
    /// Zero or oversized dimensions fall back to the bound, so a request at
    /// least as large as the desktop yields the full rectangle at (0, 0).
    pub fn centered(width: u32, height: u32, bounds: Size) -> Self {
        let width = clamp_extent(width, bounds.width);
        let height = clamp_extent(height, bounds.height);
        Self::new(
            ((bounds.width - width) / 2) as i32,
            ((bounds.height - height) / 2) as i32,
            width,
            height,
        )
    }

    /// Keeps the given origin, clamping only the size to `bounds`.
    pub fn clamped(x: i32, y: i32, width: u32, height: u32, bounds: Size) -> Self {
        Self::new(
            x,
            y,
            clamp_extent(width, bounds.width),
            clamp_extent(height, bounds.height),
        )
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

fn clamp_extent(requested: u32, bound: u32) -> u32 {
    if requested == 0 || requested > bound {
        bound
    } else {
        requested
    }
}
