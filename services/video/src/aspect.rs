use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive width/height bands for each named category
const LANDSCAPE_MIN: f32 = 1.70;
const LANDSCAPE_MAX: f32 = 1.82;
const PORTRAIT_MIN: f32 = 0.55;
const PORTRAIT_MAX: f32 = 0.59;

/// Aspect bucket a video is filed under, also the first storage key segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectCategory {
    /// Roughly 16:9
    Landscape,
    /// Roughly 9:16
    Portrait,
    Other,
}

impl AspectCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectCategory::Landscape => "landscape",
            AspectCategory::Portrait => "portrait",
            AspectCategory::Other => "other",
        }
    }

    /// Bucket a width/height ratio
    pub fn from_ratio(ratio: f32) -> Self {
        if (LANDSCAPE_MIN..=LANDSCAPE_MAX).contains(&ratio) {
            AspectCategory::Landscape
        } else if (PORTRAIT_MIN..=PORTRAIT_MAX).contains(&ratio) {
            AspectCategory::Portrait
        } else {
            AspectCategory::Other
        }
    }
}

impl fmt::Display for AspectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify frame dimensions.
///
/// Returns `None` when either dimension is zero: such a probe result is
/// malformed input, not an unusual but valid shape.
pub fn classify(width: u32, height: u32) -> Option<AspectCategory> {
    if width == 0 || height == 0 {
        return None;
    }

    let ratio = width as f32 / height as f32;
    Some(AspectCategory::from_ratio(ratio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_resolutions() {
        assert_eq!(classify(1920, 1080), Some(AspectCategory::Landscape));
        assert_eq!(classify(1280, 720), Some(AspectCategory::Landscape));
        assert_eq!(classify(1080, 1920), Some(AspectCategory::Portrait));
        assert_eq!(classify(720, 1280), Some(AspectCategory::Portrait));
        assert_eq!(classify(1080, 1080), Some(AspectCategory::Other));
        assert_eq!(classify(640, 480), Some(AspectCategory::Other));
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        assert_eq!(AspectCategory::from_ratio(1.70), AspectCategory::Landscape);
        assert_eq!(AspectCategory::from_ratio(1.82), AspectCategory::Landscape);
        assert_eq!(AspectCategory::from_ratio(0.55), AspectCategory::Portrait);
        assert_eq!(AspectCategory::from_ratio(0.59), AspectCategory::Portrait);

        assert_eq!(AspectCategory::from_ratio(1.69), AspectCategory::Other);
        assert_eq!(AspectCategory::from_ratio(1.83), AspectCategory::Other);
        assert_eq!(AspectCategory::from_ratio(0.54), AspectCategory::Other);
        assert_eq!(AspectCategory::from_ratio(0.60), AspectCategory::Other);
    }

    #[test]
    fn test_zero_dimension_is_not_other() {
        assert_eq!(classify(0, 1080), None);
        assert_eq!(classify(1920, 0), None);
    }

    #[test]
    fn test_ultrawide_is_valid_other() {
        // 21:9 misses both bands but is still a usable video
        assert_eq!(classify(2560, 1080), Some(AspectCategory::Other));
    }

    #[test]
    fn test_category_serialization() {
        assert_eq!(
            serde_json::to_string(&AspectCategory::Landscape).unwrap(),
            "\"landscape\""
        );
        assert_eq!(AspectCategory::Portrait.to_string(), "portrait");
    }
}
