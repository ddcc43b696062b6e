use serde::{Deserialize, Serialize};

/// Bounding box for a located face, in frame coordinates.
///
/// Landmarks are not part of the box: the locator only finds faces, the
/// landmark extractor runs as a separate model on the cropped region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face descriptor vector (128-dimensional for the bundled encoder).
///
/// Immutable once produced; all derived computation (distance) is pure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    /// Euclidean distance between two descriptors.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One identity registered during dataset priming.
///
/// Owned by the descriptor store; never mutated after creation.
#[derive(Debug, Clone)]
pub struct RegisteredIdentity {
    /// Unique label within the session (duplicates are skipped at priming).
    pub label: String,
    pub descriptor: Descriptor,
    /// Optional reference to a display image for the profile view.
    pub display: Option<String>,
}

/// Live classification of how many faces the camera currently sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceCount {
    Zero,
    One,
    Many,
}

impl FaceCount {
    pub fn classify(faces: usize) -> Self {
        match faces {
            0 => FaceCount::Zero,
            1 => FaceCount::One,
            _ => FaceCount::Many,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaceCount::Zero => "zero",
            FaceCount::One => "one",
            FaceCount::Many => "many",
        }
    }
}

/// Result of running the full detection pipeline on a single frame.
///
/// A descriptor is only produced when the frame contains exactly one face;
/// callers consume this exhaustively instead of probing result shapes.
#[derive(Debug, Clone)]
pub enum Observation {
    NoFace,
    OneFace(Descriptor),
    ManyFaces(usize),
}

/// Result of matching a probe descriptor against the store.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The matched identity, present only when accepted.
    pub identity: Option<RegisteredIdentity>,
    /// Distance of the best candidate; +infinity for an empty store.
    pub distance: f32,
    pub accepted: bool,
}

/// Strategy for classifying a probe descriptor against registered identities.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Descriptor,
        identities: &[RegisteredIdentity],
        threshold: f32,
    ) -> MatchResult;
}

/// Minimum-Euclidean-distance matcher.
///
/// The first-encountered identity wins distance ties, so results are
/// deterministic for a fixed store order. Acceptance requires the minimum
/// distance to be strictly below the threshold.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(
        &self,
        probe: &Descriptor,
        identities: &[RegisteredIdentity],
        threshold: f32,
    ) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in identities.iter().enumerate() {
            let dist = probe.distance(&identity.descriptor);
            // Strict < keeps the first entry on ties.
            if dist < best_distance {
                best_distance = dist;
                best_idx = Some(i);
            }
        }

        let accepted = best_distance < threshold;
        MatchResult {
            identity: if accepted {
                best_idx.map(|i| identities[i].clone())
            } else {
                None
            },
            distance: best_distance,
            accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(label: &str, values: Vec<f32>) -> RegisteredIdentity {
        RegisteredIdentity {
            label: label.into(),
            descriptor: Descriptor { values },
            display: None,
        }
    }

    #[test]
    fn distance_identical_is_zero() {
        let a = Descriptor { values: vec![0.5, -0.25, 1.0] };
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn distance_unit_axes() {
        let a = Descriptor { values: vec![1.0, 0.0] };
        let b = Descriptor { values: vec![0.0, 1.0] };
        assert!((a.distance(&b) - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn classify_counts() {
        assert_eq!(FaceCount::classify(0), FaceCount::Zero);
        assert_eq!(FaceCount::classify(1), FaceCount::One);
        assert_eq!(FaceCount::classify(2), FaceCount::Many);
        assert_eq!(FaceCount::classify(7), FaceCount::Many);
    }

    #[test]
    fn accepts_below_threshold_only() {
        let store = vec![identity("alice", vec![0.0]), identity("bob", vec![1.2])];
        let probe = Descriptor { values: vec![0.3] };

        let result = NearestMatcher.compare(&probe, &store, 0.6);
        assert!(result.accepted);
        assert_eq!(result.identity.as_ref().map(|m| m.label.as_str()), Some("alice"));
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn rejects_when_all_at_or_above_threshold() {
        let store = vec![identity("alice", vec![0.0]), identity("bob", vec![1.5])];
        let probe = Descriptor { values: vec![0.7] };

        let result = NearestMatcher.compare(&probe, &store, 0.6);
        assert!(!result.accepted);
        assert!(result.identity.is_none());
        // Best candidate distance still reported for diagnostics.
        assert!((result.distance - 0.7).abs() < 1e-6);
    }

    #[test]
    fn boundary_distance_is_rejected() {
        // Acceptance is strict: distance == threshold must not match.
        let store = vec![identity("alice", vec![0.0])];
        let probe = Descriptor { values: vec![0.6] };

        let result = NearestMatcher.compare(&probe, &store, 0.6);
        assert!(!result.accepted);
    }

    #[test]
    fn tie_break_prefers_first_entry() {
        let store = vec![
            identity("alice", vec![0.1, 0.2]),
            identity("bob", vec![0.1, 0.2]),
        ];
        let probe = Descriptor { values: vec![0.1, 0.2] };

        let result = NearestMatcher.compare(&probe, &store, 0.6);
        assert!(result.accepted);
        assert_eq!(result.identity.as_ref().map(|m| m.label.as_str()), Some("alice"));
    }

    #[test]
    fn empty_store_never_matches() {
        let probe = Descriptor { values: vec![0.0, 0.0] };
        let result = NearestMatcher.compare(&probe, &[], 1000.0);
        assert!(!result.accepted);
        assert!(result.identity.is_none());
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn acceptance_tracks_minimum_distance() {
        // accepted == (min distance < threshold) across a spread of thresholds.
        let store = vec![identity("a", vec![0.0]), identity("b", vec![2.0])];
        let probe = Descriptor { values: vec![0.5] };

        for (threshold, expected) in [(0.4, false), (0.5, false), (0.51, true), (2.0, true)] {
            let result = NearestMatcher.compare(&probe, &store, threshold);
            assert_eq!(result.accepted, expected, "threshold {threshold}");
        }
    }
}
