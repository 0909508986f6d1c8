//! Print geometry constants
//!
//! Every tolerance the print partner checks during preflight lives here so
//! the layout and cover calculations agree on the same numbers.

// =============================================================================
// Resolution
// =============================================================================

/// Base resolution the page editor lays out in (CSS/PDF points per inch)
pub const BASE_DPI: f64 = 72.0;

/// Raster resolution required by the print partner
pub const PRINT_DPI: f64 = 300.0;

/// Surface scale applied at render time (≈ 4.1667)
pub const RENDER_SCALE_FACTOR: f64 = PRINT_DPI / BASE_DPI;

/// Convert inches to print pixels, rounding half away from zero
#[inline]
pub fn in_to_px(inches: f64) -> u32 {
    (inches * PRINT_DPI).round() as u32
}

/// Convert inches to base-resolution points, rounding half away from zero
#[inline]
pub fn in_to_pt(inches: f64) -> u32 {
    (inches * BASE_DPI).round() as u32
}

/// Convert print pixels back to inches
#[inline]
pub fn px_to_in(px: u32) -> f64 {
    f64::from(px) / PRINT_DPI
}

// =============================================================================
// Interior Margins
// =============================================================================

/// Bleed added beyond the trim line on every edge (inches)
pub const BLEED_IN: f64 = 0.125;

/// Safety inset from the trim line on every edge (inches)
pub const SAFETY_MARGIN_IN: f64 = 0.5;

/// Books with more pages than this get a binding-side gutter
pub const GUTTER_THRESHOLD_PAGES: usize = 60;

/// Gutter for books just over the threshold (inches)
pub const GUTTER_IN: f64 = 0.125;

/// Books with more pages than this get the wide gutter
pub const THICK_BOOK_THRESHOLD_PAGES: usize = 150;

/// Gutter for thick books (inches)
pub const THICK_BOOK_GUTTER_IN: f64 = 0.25;

// =============================================================================
// Cover
// =============================================================================

/// Board wrap allowance on each edge of a hardcover case (inches)
pub const HARDCOVER_WRAP_IN: f64 = 0.75;
