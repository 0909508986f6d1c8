use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Invalid trim size: {0}")]
    InvalidTrimSize(String),
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Pixel dimensions at print resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in pixels, origin at the top-left of the output
/// surface (bleed included)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge (exclusive)
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive)
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True if `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True if `other` lies inside this rectangle without touching any edge
    pub fn strictly_contains(&self, other: &PixelRect) -> bool {
        other.x > self.x
            && other.y > self.y
            && other.right() < self.right()
            && other.bottom() < self.bottom()
    }
}
