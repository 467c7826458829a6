// src/candidate.rs - Cheap centroid pre-filter for cross-channel object pairs

use std::collections::HashMap;

use crate::segmentation::SegmentedObject;

/// Above this many A x B combinations the grid-bucketed search is used
pub const BUCKETING_THRESHOLD: usize = 4096;

/// Two objects of the same frame whose centroids are close enough
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePair {
    /// Index into the channel A object list
    pub a: usize,
    /// Index into the channel B object list
    pub b: usize,
    /// Squared centroid distance in pixels
    pub distance_sq: f64,
}

/// Convert a physical distance budget to squared pixels
pub fn max_distance_px_sq(max_distance: f64, x_y_ratio: f64) -> f64 {
    let px = max_distance / x_y_ratio;
    px * px
}

/// Squared centroid distance of two objects
#[inline]
pub fn centroid_distance_sq(a: &SegmentedObject, b: &SegmentedObject) -> f64 {
    let dr = (a.centroid.0 - b.centroid.0).abs();
    let dc = (a.centroid.1 - b.centroid.1).abs();
    dr * dr + dc * dc
}

/// Every A x B combination with squared centroid distance `< d_max_sq`.
///
/// Results are ordered by A index, then B index.
pub fn find_candidates(
    a: &[SegmentedObject],
    b: &[SegmentedObject],
    d_max_sq: f64,
) -> Vec<CandidatePair> {
    let mut pairs = Vec::new();
    if !(d_max_sq > 0.0) {
        return pairs;
    }

    for (ia, object_a) in a.iter().enumerate() {
        for (ib, object_b) in b.iter().enumerate() {
            if object_a.frame != object_b.frame {
                continue;
            }
            let distance_sq = centroid_distance_sq(object_a, object_b);
            if distance_sq < d_max_sq {
                pairs.push(CandidatePair {
                    a: ia,
                    b: ib,
                    distance_sq,
                });
            }
        }
    }

    pairs
}

/// Same result as [`find_candidates`], with B centroids bucketed on a grid
/// whose cell side is the distance budget.
pub fn find_candidates_bucketed(
    a: &[SegmentedObject],
    b: &[SegmentedObject],
    d_max_sq: f64,
) -> Vec<CandidatePair> {
    let mut pairs = Vec::new();
    if !(d_max_sq > 0.0) || a.is_empty() || b.is_empty() {
        return pairs;
    }

    // Slightly enlarged so rounding in sqrt cannot push a neighbour two cells away
    let cell = (d_max_sq.sqrt() * 1.000_001).max(1.0);
    let cell_of = |centroid: (f64, f64)| -> (i64, i64) {
        ((centroid.0 / cell).floor() as i64, (centroid.1 / cell).floor() as i64)
    };

    let mut grid: HashMap<(usize, i64, i64), Vec<usize>> = HashMap::new();
    for (ib, object_b) in b.iter().enumerate() {
        let (r, c) = cell_of(object_b.centroid);
        grid.entry((object_b.frame, r, c)).or_default().push(ib);
    }

    for (ia, object_a) in a.iter().enumerate() {
        let (r, c) = cell_of(object_a.centroid);
        let mut hits: Vec<CandidatePair> = Vec::new();

        for dr in -1..=1 {
            for dc in -1..=1 {
                let Some(bucket) = grid.get(&(object_a.frame, r + dr, c + dc)) else {
                    continue;
                };
                for &ib in bucket {
                    let distance_sq = centroid_distance_sq(object_a, &b[ib]);
                    if distance_sq < d_max_sq {
                        hits.push(CandidatePair {
                            a: ia,
                            b: ib,
                            distance_sq,
                        });
                    }
                }
            }
        }

        // Restore brute-force discovery order
        hits.sort_by_key(|pair| pair.b);
        pairs.extend(hits);
    }

    pairs
}

/// Pick the brute-force or bucketed search depending on the workload
pub fn find_candidates_auto(
    a: &[SegmentedObject],
    b: &[SegmentedObject],
    d_max_sq: f64,
) -> Vec<CandidatePair> {
    if a.len().saturating_mul(b.len()) > BUCKETING_THRESHOLD {
        find_candidates_bucketed(a, b, d_max_sq)
    } else {
        find_candidates(a, b, d_max_sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::BoundingBox;
    use assert_approx_eq::assert_approx_eq;

    fn object(label: u32, frame: usize, row: f64, col: f64) -> SegmentedObject {
        SegmentedObject {
            label,
            frame,
            centroid: (row, col),
            area: 1,
            bbox: BoundingBox::new(row as u32, col as u32, row as u32 + 1, col as u32 + 1),
        }
    }

    #[test]
    fn budget_conversion_uses_pixel_ratio() {
        assert_approx_eq!(max_distance_px_sq(0.2, 0.008), 625.0, 1e-6);
    }

    #[test]
    fn threshold_is_strict() {
        let a = vec![object(1, 0, 5.0, 5.0)];
        let b = vec![object(1, 0, 5.0, 8.0), object(2, 0, 5.0, 7.0)];

        let pairs = find_candidates(&a, &b, 9.0);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].b, 1);
        assert_approx_eq!(pairs[0].distance_sq, 4.0);
    }

    #[test]
    fn zero_budget_yields_nothing() {
        let a = vec![object(1, 0, 5.0, 5.0)];
        let b = vec![object(1, 0, 5.0, 5.0), object(2, 0, 6.0, 5.0)];
        assert!(find_candidates(&a, &b, 0.0).is_empty());
        assert!(find_candidates_bucketed(&a, &b, 0.0).is_empty());
    }

    #[test]
    fn different_frames_never_pair() {
        let a = vec![object(1, 0, 5.0, 5.0)];
        let b = vec![object(1, 1, 5.0, 5.0)];
        assert!(find_candidates(&a, &b, 100.0).is_empty());
        assert!(find_candidates_bucketed(&a, &b, 100.0).is_empty());
    }

    #[test]
    fn bucketed_search_matches_brute_force() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        // Deterministic scatter, including points exactly on cell borders
        for i in 0..60u32 {
            let row = ((i * 37) % 97) as f64 + if i % 3 == 0 { 0.5 } else { 0.0 };
            let col = ((i * 53) % 89) as f64;
            a.push(object(i + 1, 0, row, col));
            b.push(object(i + 1, 0, (row + (i % 7) as f64 * 1.7) % 100.0, (col * 1.3) % 90.0));
        }

        for d_max_sq in [1.0, 25.0, 100.0, 400.0, 10_000.0] {
            let brute = find_candidates(&a, &b, d_max_sq);
            let bucketed = find_candidates_bucketed(&a, &b, d_max_sq);
            assert_eq!(brute, bucketed, "d_max_sq = {}", d_max_sq);
        }
    }
}
