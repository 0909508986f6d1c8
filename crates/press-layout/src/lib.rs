pub mod constants;
mod cover;
mod layout;
mod trim;
mod types;

pub use cover::{CoverBinding, CoverOptions, CoverSpread, PaperGrade, calculate_cover};
pub use layout::{LayoutSpec, calculate_layout};
pub use trim::TrimSize;
pub use types::*;
