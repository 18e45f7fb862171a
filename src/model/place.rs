//! Place name normalization.
//!
//! GEDCOM places are comma-separated geographic hierarchies, smallest unit
//! first ("Berlin, Germany", "Nancy, 54000, Meurthe-et-Moselle, Grand-Est,
//! France"). Normalization keeps comparisons insensitive to case and spacing.

use serde::{Deserialize, Serialize};

/// A place split into its comma-separated hierarchy, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPlace {
    /// Hierarchy parts, smallest unit first, lowercased and trimmed.
    pub parts: Vec<String>,
}

impl NormalizedPlace {
    pub fn parse(raw: &str) -> NormalizedPlace {
        let parts = raw
            .split(',')
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        NormalizedPlace { parts }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The broadest unit (usually the country).
    pub fn country(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    /// The narrowest unit (usually the city).
    pub fn locality(&self) -> Option<&str> {
        self.parts.first().map(String::as_str)
    }
}

/// Place match score in [0, 1]: full hierarchy match 1.0, same locality 0.7,
/// same broadest unit 0.4, no overlap 0.0.
pub fn place_similarity(a: &NormalizedPlace, b: &NormalizedPlace) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.parts == b.parts {
        return 1.0;
    }
    if a.locality().is_some() && a.locality() == b.locality() {
        return 0.7;
    }
    if a.country() == b.country() {
        return 0.4;
    }
    0.0
}
