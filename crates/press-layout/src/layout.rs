//! Interior page geometry
//!
//! Given a trim size, a bleed flag and the book's page count, compute the
//! viewport the editor renders at, the raster size the partner expects, and
//! the trim and safety boxes inside that raster.

use crate::constants::*;
use crate::trim::TrimSize;
use crate::types::*;

/// Derived page geometry for one compile. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayoutSpec {
    pub trim_size: TrimSize,
    pub include_bleed: bool,
    pub page_count: usize,
    /// Render viewport in points at the base resolution, bleed included
    pub viewport: PixelSize,
    /// Final raster size at print resolution, bleed included
    pub output_pixels: PixelSize,
    /// Bleed on each edge in pixels (0 when bleed is off)
    pub bleed_px: u32,
    /// Trim line, relative to the output surface
    pub trim_box: PixelRect,
    /// Region critical content must stay inside
    pub safety_box: PixelRect,
    /// Extra inset on the binding (left) edge in pixels
    pub gutter_px: u32,
    /// Surface scale from viewport to output raster
    pub scale_factor: f64,
}

impl LayoutSpec {
    /// Whether the binding-side gutter was applied
    pub fn has_gutter(&self) -> bool {
        self.gutter_px > 0
    }

    /// Trim size in pixels (without bleed)
    pub fn trim_pixels(&self) -> PixelSize {
        PixelSize::new(self.trim_box.width, self.trim_box.height)
    }
}

/// Compute the layout for a catalog key.
///
/// Fails with [`LayoutError::InvalidTrimSize`] when the key is not in the
/// catalog.
pub fn calculate_layout(
    trim_key: &str,
    include_bleed: bool,
    page_count: usize,
) -> Result<LayoutSpec> {
    let trim = TrimSize::from_key(trim_key)?;
    Ok(trim.layout(include_bleed, page_count))
}

/// Gutter width for a book of `page_count` pages (inches)
pub(crate) fn gutter_in(page_count: usize) -> f64 {
    if page_count > THICK_BOOK_THRESHOLD_PAGES {
        THICK_BOOK_GUTTER_IN
    } else if page_count > GUTTER_THRESHOLD_PAGES {
        GUTTER_IN
    } else {
        0.0
    }
}

impl TrimSize {
    /// Compute the interior layout for this trim size
    pub fn layout(self, include_bleed: bool, page_count: usize) -> LayoutSpec {
        let (width_in, height_in) = self.dimensions_in();
        let bleed_in = if include_bleed { BLEED_IN } else { 0.0 };

        let total_width_in = width_in + 2.0 * bleed_in;
        let total_height_in = height_in + 2.0 * bleed_in;

        let viewport = PixelSize::new(in_to_pt(total_width_in), in_to_pt(total_height_in));
        let output_pixels = PixelSize::new(in_to_px(total_width_in), in_to_px(total_height_in));

        let bleed_px = in_to_px(bleed_in);
        let trim_width_px = in_to_px(width_in);
        let trim_height_px = in_to_px(height_in);
        let trim_box = PixelRect::new(bleed_px, bleed_px, trim_width_px, trim_height_px);

        // The inset is measured from the output origin, so the far edges lose
        // the bleed as well as the margin.
        let safety_px = in_to_px(SAFETY_MARGIN_IN);
        let gutter_px = in_to_px(gutter_in(page_count));
        let inset = bleed_px + safety_px;
        let safety_box = PixelRect::new(
            inset + gutter_px,
            inset,
            trim_width_px.saturating_sub(2 * inset + gutter_px),
            trim_height_px.saturating_sub(2 * inset),
        );

        LayoutSpec {
            trim_size: self,
            include_bleed,
            page_count,
            viewport,
            output_pixels,
            bleed_px,
            trim_box,
            safety_box,
            gutter_px,
            scale_factor: RENDER_SCALE_FACTOR,
        }
    }
}
