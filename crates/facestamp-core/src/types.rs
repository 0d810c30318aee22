use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in base-image coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// A detected face with its resolved nose-tip landmark.
///
/// The landmark predictor produces a full point set, but placement only
/// ever consults the nose tip, so that is all we carry. A face whose
/// nose tip could not be resolved is never surfaced as a detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: FaceBox,
    /// Nose-tip point (x, y) in base-image coordinates.
    pub nose: (f32, f32),
}

/// Rectangle at which the overlay asset is drawn, in base-image
/// coordinates. Height always preserves the asset's aspect ratio.
/// Placements are not clamped to the canvas; the compositor clips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayPlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Fallback vertical position used when no face is detected.
///
/// Exchanged with outer layers as percentage tokens ("100%" is the top
/// of the image). Unrecognized tokens map to `Middle` at the point of
/// use — never at storage time, so a stored token round-trips as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerticalAnchor {
    Top,
    UpperMiddle,
    #[default]
    Middle,
    Lower,
}

impl VerticalAnchor {
    /// Parse a preference token. Anything other than the four known
    /// tokens falls back to `Middle`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "100%" => VerticalAnchor::Top,
            "75%" => VerticalAnchor::UpperMiddle,
            "50%" => VerticalAnchor::Middle,
            "25%" => VerticalAnchor::Lower,
            _ => VerticalAnchor::Middle,
        }
    }

    /// The textual token exchanged with outer layers.
    pub fn token(&self) -> &'static str {
        match self {
            VerticalAnchor::Top => "100%",
            VerticalAnchor::UpperMiddle => "75%",
            VerticalAnchor::Middle => "50%",
            VerticalAnchor::Lower => "25%",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens_round_trip() {
        for token in ["100%", "75%", "50%", "25%"] {
            assert_eq!(VerticalAnchor::from_token(token).token(), token);
        }
    }

    #[test]
    fn test_unrecognized_token_maps_to_middle() {
        assert_eq!(VerticalAnchor::from_token("foo"), VerticalAnchor::Middle);
        assert_eq!(VerticalAnchor::from_token(""), VerticalAnchor::Middle);
        assert_eq!(VerticalAnchor::from_token("50"), VerticalAnchor::Middle);
    }

    #[test]
    fn test_default_is_middle() {
        assert_eq!(VerticalAnchor::default(), VerticalAnchor::Middle);
    }
}
