//! Pre-flight safety-zone checks
//!
//! Run before a job is created. Critical violations block the compile
//! unless the caller explicitly acknowledges them; warnings never block.

use crate::provider::{ElementKind, PageElement};
use crate::types::*;
use press_layout::LayoutSpec;
use press_layout::constants::PRINT_DPI;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Element crosses into the safety margin
    OutsideSafetyZone,
    /// Element extends past the printable surface
    OutsidePrintArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub page_id: PageId,
    pub element: String,
    pub kind: ViolationKind,
    pub severity: Severity,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            ViolationKind::OutsideSafetyZone => "crosses the safety margin",
            ViolationKind::OutsidePrintArea => "extends past the print area",
        };
        write!(f, "page {}: {} {}", self.page_id, self.element, what)
    }
}

/// Violations collected across a whole book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreflightReport {
    pub violations: Vec<Violation>,
}

impl PreflightReport {
    pub fn critical(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
    }

    pub fn has_critical(&self) -> bool {
        self.critical().next().is_some()
    }

    /// Fail with [`CompileError::ValidationBlocked`] if critical violations
    /// remain unacknowledged
    pub fn enforce(&self, acknowledged: bool) -> Result<()> {
        if self.has_critical() && !acknowledged {
            return Err(CompileError::ValidationBlocked(
                self.critical().cloned().collect(),
            ));
        }
        Ok(())
    }
}

// Rectangle in output pixels; may go negative past the surface edge
#[derive(Debug, Clone, Copy)]
struct Bounds {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Bounds {
    fn contains(&self, other: &Bounds) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

/// Check one page's elements against the book layout
pub fn check_page(
    layout: &LayoutSpec,
    page_id: &PageId,
    elements: &[PageElement],
) -> Vec<Violation> {
    let surface = Bounds {
        left: 0.0,
        top: 0.0,
        right: f64::from(layout.output_pixels.width),
        bottom: f64::from(layout.output_pixels.height),
    };
    let safety = Bounds {
        left: f64::from(layout.safety_box.x),
        top: f64::from(layout.safety_box.y),
        right: f64::from(layout.safety_box.right()),
        bottom: f64::from(layout.safety_box.bottom()),
    };
    let origin_x = f64::from(layout.trim_box.x);
    let origin_y = f64::from(layout.trim_box.y);

    let mut violations = Vec::new();
    for element in elements {
        let bounds = Bounds {
            left: origin_x + element.x_in * PRINT_DPI,
            top: origin_y + element.y_in * PRINT_DPI,
            right: origin_x + (element.x_in + element.width_in) * PRINT_DPI,
            bottom: origin_y + (element.y_in + element.height_in) * PRINT_DPI,
        };

        let violation = if !surface.contains(&bounds) {
            Some((ViolationKind::OutsidePrintArea, Severity::Critical))
        } else if !safety.contains(&bounds) {
            let severity = match element.kind {
                ElementKind::Text => Severity::Critical,
                ElementKind::Image | ElementKind::Decoration => Severity::Warning,
            };
            Some((ViolationKind::OutsideSafetyZone, severity))
        } else {
            None
        };

        if let Some((kind, severity)) = violation {
            violations.push(Violation {
                page_id: page_id.clone(),
                element: element.label.clone(),
                kind,
                severity,
            });
        }
    }
    violations
}
