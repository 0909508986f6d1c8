//! Cover spread geometry
//!
//! The cover is a single sheet wrapping back panel, spine and front panel.
//! Spine width follows the interior page count and paper grade.

use crate::constants::*;
use crate::trim::TrimSize;
use crate::types::*;

/// Interior paper stock; determines spine thickness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PaperGrade {
    /// 80# coated (default)
    #[default]
    Standard,
    /// 100# coated
    Premium,
    /// Lustre photo paper
    Lustre,
}

impl PaperGrade {
    /// Thickness contributed by one page (inches)
    pub fn thickness_per_page_in(self) -> f64 {
        match self {
            PaperGrade::Standard => 0.0025,
            PaperGrade::Premium => 0.0030,
            PaperGrade::Lustre => 0.0035,
        }
    }
}

/// How the cover is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoverBinding {
    /// Perfect-bound paperback
    #[default]
    Softcover,
    /// Case-wrapped hardcover; cover wraps around the boards
    Hardcover,
}

impl CoverBinding {
    /// Wrap allowance on each outside edge (inches)
    pub fn wrap_in(self) -> f64 {
        match self {
            CoverBinding::Softcover => 0.0,
            CoverBinding::Hardcover => HARDCOVER_WRAP_IN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverOptions {
    pub binding: CoverBinding,
    pub paper: PaperGrade,
}

/// Full cover sheet geometry
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverSpread {
    pub trim_size: TrimSize,
    pub page_count: usize,
    pub options: CoverOptions,
    pub spine_width_in: f64,
    pub total_width_in: f64,
    pub total_height_in: f64,
    pub output_pixels: PixelSize,
    /// Back cover panel (left of the spine)
    pub back_panel: PixelRect,
    pub spine: PixelRect,
    /// Front cover panel (right of the spine)
    pub front_panel: PixelRect,
}

/// Compute the cover spread for a book.
///
/// Bleed is added on the three non-spine edges of each panel, i.e. on all
/// four outside edges of the sheet.
pub fn calculate_cover(trim: TrimSize, page_count: usize, options: CoverOptions) -> CoverSpread {
    let (trim_width_in, trim_height_in) = trim.dimensions_in();
    let wrap_in = options.binding.wrap_in();

    let spine_width_in = page_count as f64 * options.paper.thickness_per_page_in();
    let total_width_in = 2.0 * trim_width_in + spine_width_in + 2.0 * wrap_in + 2.0 * BLEED_IN;
    let total_height_in = trim_height_in + 2.0 * wrap_in + 2.0 * BLEED_IN;

    let edge_px = in_to_px(wrap_in + BLEED_IN);
    let panel_width_px = in_to_px(trim_width_in);
    let panel_height_px = in_to_px(trim_height_in);
    let spine_px = in_to_px(spine_width_in);

    let back_panel = PixelRect::new(edge_px, edge_px, panel_width_px, panel_height_px);
    let spine = PixelRect::new(back_panel.right(), edge_px, spine_px, panel_height_px);
    let front_panel = PixelRect::new(spine.right(), edge_px, panel_width_px, panel_height_px);

    CoverSpread {
        trim_size: trim,
        page_count,
        options,
        spine_width_in,
        total_width_in,
        total_height_in,
        output_pixels: PixelSize::new(in_to_px(total_width_in), in_to_px(total_height_in)),
        back_panel,
        spine,
        front_panel,
    }
}
