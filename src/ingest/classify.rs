use serde::Serialize;
use std::fmt;

/// Ratios strictly above this are landscape.
pub const LANDSCAPE_MIN_RATIO: f64 = 1.7;
/// Ratios strictly below this are portrait.
pub const PORTRAIT_MAX_RATIO: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectClass {
    Landscape,
    Portrait,
    Other,
}

impl AspectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectClass::Landscape => "landscape",
            AspectClass::Portrait => "portrait",
            AspectClass::Other => "other",
        }
    }
}

impl fmt::Display for AspectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map width / height to a category. Both thresholds fall into `Other`.
pub fn classify(ratio: f64) -> AspectClass {
    if ratio > LANDSCAPE_MIN_RATIO {
        AspectClass::Landscape
    } else if ratio < PORTRAIT_MAX_RATIO {
        AspectClass::Portrait
    } else {
        AspectClass::Other
    }
}
