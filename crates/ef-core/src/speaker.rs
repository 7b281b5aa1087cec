//! Speaker layouts
//!
//! Built-in mono/stereo/quad/5.1/7.1 tables plus custom layouts with
//! explicit unit-vector speaker directions. Directions use the listener
//! convention (+X right, +Y up, -Z ahead).

use crate::math::Vector3;
use serde::{Deserialize, Serialize};

/// Built-in layout selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeakerLayoutKind {
    Mono,
    Stereo,
    Quadraphonic,
    FivePointOne,
    SevenPointOne,
    Custom,
}

/// Speaker layout: a set of unit direction vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerLayout {
    kind: SpeakerLayoutKind,
    speakers: Vec<Vector3>,
}

impl SpeakerLayout {
    pub fn mono() -> Self {
        Self {
            kind: SpeakerLayoutKind::Mono,
            speakers: vec![-Vector3::UNIT_Z],
        }
    }

    pub fn stereo() -> Self {
        Self {
            kind: SpeakerLayoutKind::Stereo,
            speakers: vec![
                direction_from_azimuth(-30.0),
                direction_from_azimuth(30.0),
            ],
        }
    }

    pub fn quadraphonic() -> Self {
        Self {
            kind: SpeakerLayoutKind::Quadraphonic,
            speakers: vec![
                direction_from_azimuth(-45.0),
                direction_from_azimuth(45.0),
                direction_from_azimuth(-135.0),
                direction_from_azimuth(135.0),
            ],
        }
    }

    pub fn five_point_one() -> Self {
        Self {
            kind: SpeakerLayoutKind::FivePointOne,
            speakers: vec![
                direction_from_azimuth(-30.0),
                direction_from_azimuth(30.0),
                direction_from_azimuth(0.0),
                Vector3::ZERO, // LFE carries no direction
                direction_from_azimuth(-110.0),
                direction_from_azimuth(110.0),
            ],
        }
    }

    pub fn seven_point_one() -> Self {
        Self {
            kind: SpeakerLayoutKind::SevenPointOne,
            speakers: vec![
                direction_from_azimuth(-30.0),
                direction_from_azimuth(30.0),
                direction_from_azimuth(0.0),
                Vector3::ZERO, // LFE
                direction_from_azimuth(-90.0),
                direction_from_azimuth(90.0),
                direction_from_azimuth(-135.0),
                direction_from_azimuth(135.0),
            ],
        }
    }

    /// Custom layout from explicit speaker unit vectors
    pub fn custom(speakers: Vec<Vector3>) -> Self {
        Self {
            kind: SpeakerLayoutKind::Custom,
            speakers,
        }
    }

    pub fn kind(&self) -> SpeakerLayoutKind {
        self.kind
    }

    pub fn num_speakers(&self) -> usize {
        self.speakers.len()
    }

    pub fn speaker(&self, index: usize) -> Vector3 {
        self.speakers[index]
    }

    pub fn speakers(&self) -> &[Vector3] {
        &self.speakers
    }
}

/// Unit vector in the horizontal plane; positive azimuth is to the right.
fn direction_from_azimuth(azimuth_degrees: f32) -> Vector3 {
    let azimuth = azimuth_degrees.to_radians();
    Vector3::new(azimuth.sin(), 0.0, -azimuth.cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builtin_speaker_counts() {
        assert_eq!(SpeakerLayout::mono().num_speakers(), 1);
        assert_eq!(SpeakerLayout::stereo().num_speakers(), 2);
        assert_eq!(SpeakerLayout::quadraphonic().num_speakers(), 4);
        assert_eq!(SpeakerLayout::five_point_one().num_speakers(), 6);
        assert_eq!(SpeakerLayout::seven_point_one().num_speakers(), 8);
    }

    #[test]
    fn test_stereo_directions() {
        let layout = SpeakerLayout::stereo();
        // Left speaker points left-forward.
        assert!(layout.speaker(0).x < 0.0 && layout.speaker(0).z < 0.0);
        assert!(layout.speaker(1).x > 0.0);
        assert_relative_eq!(layout.speaker(0).length(), 1.0, epsilon = 1e-6);
    }
}
