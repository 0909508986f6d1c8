use crate::types::*;
use std::fmt;
use std::str::FromStr;

/// Trim sizes offered by the print partner
///
/// The catalog is closed: a book can only be compiled at one of these sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrimSize {
    /// 8" × 8" square
    Square8,
    /// 10" × 10" square
    Square10,
    /// 12" × 12" square (classic scrapbook page)
    Square12,
    /// 8.5" × 11" portrait
    LetterPortrait,
    /// 11" × 8.5" landscape
    LetterLandscape,
}

impl TrimSize {
    pub const ALL: [TrimSize; 5] = [
        TrimSize::Square8,
        TrimSize::Square10,
        TrimSize::Square12,
        TrimSize::LetterPortrait,
        TrimSize::LetterLandscape,
    ];

    /// Look up a catalog entry by its key (e.g. `"8x8"`)
    pub fn from_key(key: &str) -> Result<Self> {
        match key.trim() {
            "8x8" => Ok(TrimSize::Square8),
            "10x10" => Ok(TrimSize::Square10),
            "12x12" => Ok(TrimSize::Square12),
            "8.5x11" => Ok(TrimSize::LetterPortrait),
            "11x8.5" => Ok(TrimSize::LetterLandscape),
            other => Err(LayoutError::InvalidTrimSize(other.to_string())),
        }
    }

    /// Catalog key, stable across releases (used in storage addresses)
    pub fn key(self) -> &'static str {
        match self {
            TrimSize::Square8 => "8x8",
            TrimSize::Square10 => "10x10",
            TrimSize::Square12 => "12x12",
            TrimSize::LetterPortrait => "8.5x11",
            TrimSize::LetterLandscape => "11x8.5",
        }
    }

    /// Physical (width, height) in inches
    pub fn dimensions_in(self) -> (f64, f64) {
        match self {
            TrimSize::Square8 => (8.0, 8.0),
            TrimSize::Square10 => (10.0, 10.0),
            TrimSize::Square12 => (12.0, 12.0),
            TrimSize::LetterPortrait => (8.5, 11.0),
            TrimSize::LetterLandscape => (11.0, 8.5),
        }
    }
}

impl fmt::Display for TrimSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TrimSize {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self> {
        TrimSize::from_key(s)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::TrimSize;
    use serde::{Deserialize, Serialize};

    // Serialized as the catalog key so persisted jobs survive variant renames
    impl Serialize for TrimSize {
        fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_str(self.key())
        }
    }

    impl<'de> Deserialize<'de> for TrimSize {
        fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            TrimSize::from_key(&s).map_err(serde::de::Error::custom)
        }
    }
}
