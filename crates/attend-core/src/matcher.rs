//! Nearest-neighbour matching of a probe vector against the gallery.

use crate::gallery::Gallery;
use crate::types::FeatureVector;

/// Label shown for faces that match nobody in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Default maximum distance for a positive match. Lower is stricter.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Result of matching a probe against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Label of the nearest entry, if it is within tolerance.
    pub label: Option<String>,
    /// Distance to the nearest entry. `None` for an empty gallery.
    pub distance: Option<f32>,
    /// Gallery index of the nearest entry, whether or not it matched.
    pub index: Option<usize>,
}

impl MatchResult {
    fn unknown() -> Self {
        Self {
            label: None,
            distance: None,
            index: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }

    /// The matched label, or [`UNKNOWN_LABEL`].
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Strategy for comparing a probe against the gallery.
pub trait Matcher {
    fn compare(&self, probe: &FeatureVector, gallery: &Gallery, tolerance: f32) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// Ties go to the earliest gallery entry. NaN distances never win.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &FeatureVector, gallery: &Gallery, tolerance: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, vector) in gallery.vectors().iter().enumerate() {
            let d = probe.distance(vector);
            let better = match best {
                None => !d.is_nan(),
                Some((_, best_d)) => d < best_d,
            };
            if better {
                best = Some((i, d));
            }
        }

        let Some((idx, distance)) = best else {
            return MatchResult::unknown();
        };

        MatchResult {
            label: (distance <= tolerance).then(|| gallery.labels()[idx].clone()),
            distance: Some(distance),
            index: Some(idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: &[f32]) -> FeatureVector {
        FeatureVector::new(values.to_vec())
    }

    fn gallery(entries: &[(&str, &[f32])]) -> Gallery {
        let mut g = Gallery::new();
        for (label, values) in entries {
            g.push(*label, fv(values));
        }
        g
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let g = Gallery::new();
        for tol in [0.0, 0.5, 100.0, f32::INFINITY] {
            let r = EuclideanMatcher.compare(&fv(&[1.0, 2.0]), &g, tol);
            assert!(!r.is_match());
            assert_eq!(r.display_label(), UNKNOWN_LABEL);
            assert_eq!(r.distance, None);
        }
    }

    #[test]
    fn test_within_tolerance_matches() {
        let g = gallery(&[("carol", &[0.0, 0.0])]);
        let r = EuclideanMatcher.compare(&fv(&[0.3, 0.0]), &g, 0.5);
        assert_eq!(r.label.as_deref(), Some("carol"));
        assert_eq!(r.index, Some(0));
    }

    #[test]
    fn test_beyond_tolerance_is_unknown() {
        let g = gallery(&[("carol", &[0.0, 0.0])]);
        let r = EuclideanMatcher.compare(&fv(&[0.8, 0.0]), &g, 0.5);
        assert!(!r.is_match());
        assert!((r.distance.unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(r.index, Some(0));
    }

    #[test]
    fn test_exact_tolerance_is_inclusive() {
        let g = gallery(&[("dan", &[0.0, 0.0])]);
        let r = EuclideanMatcher.compare(&fv(&[0.0, 0.5]), &g, 0.5);
        assert!(r.is_match());
    }

    #[test]
    fn test_picks_nearest_anywhere_in_gallery() {
        let g = gallery(&[
            ("decoy1", &[0.0, 1.0, 0.0]),
            ("decoy2", &[0.0, 0.0, 1.0]),
            ("target", &[1.0, 0.0, 0.0]),
        ]);
        let r = EuclideanMatcher.compare(&fv(&[0.9, 0.0, 0.0]), &g, 0.5);
        assert_eq!(r.label.as_deref(), Some("target"));
        assert_eq!(r.index, Some(2));
    }

    #[test]
    fn test_tie_goes_to_first_entry() {
        let g = gallery(&[("first", &[1.0, 0.0]), ("second", &[-1.0, 0.0])]);
        for _ in 0..3 {
            let r = EuclideanMatcher.compare(&fv(&[0.0, 0.0]), &g, 2.0);
            assert_eq!(r.label.as_deref(), Some("first"));
            assert_eq!(r.index, Some(0));
        }
    }

    #[test]
    fn test_nan_entry_never_wins() {
        let g = gallery(&[("broken", &[f32::NAN, 0.0]), ("ok", &[0.1, 0.0])]);
        let r = EuclideanMatcher.compare(&fv(&[0.0, 0.0]), &g, 0.5);
        assert_eq!(r.label.as_deref(), Some("ok"));
    }

    #[test]
    fn test_acceptance_is_monotonic_in_tolerance() {
        let g = gallery(&[
            ("a", &[0.0, 0.0]),
            ("b", &[0.7, 0.0]),
            ("c", &[0.0, 1.5]),
        ]);
        let probes = [fv(&[0.2, 0.1]), fv(&[0.6, 0.2]), fv(&[0.1, 1.2]), fv(&[3.0, 3.0])];
        let tolerances = [0.0, 0.1, 0.25, 0.5, 1.0, 5.0];

        for probe in &probes {
            for (i, &t1) in tolerances.iter().enumerate() {
                for &t2 in &tolerances[i + 1..] {
                    let low = EuclideanMatcher.compare(probe, &g, t1);
                    let high = EuclideanMatcher.compare(probe, &g, t2);
                    if let Some(label) = low.label {
                        assert_eq!(high.label.as_deref(), Some(label.as_str()));
                    }
                }
            }
        }
    }
}
