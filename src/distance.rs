// src/distance.rs - Overlap test and exact nearest-point distances between two objects

use std::collections::{BinaryHeap, HashSet};

use crate::errors::{ProximityError, Result};

/// Pixel coordinate as (row, col)
pub type Pixel = (u32, u32);

/// Closest point pair of two disjoint pixel sets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoints {
    pub nearest_a: Pixel,
    pub nearest_b: Pixel,
    /// Minimum Euclidean distance in pixels
    pub min_distance: f64,
    /// Mean of the `k` smallest pairwise distances in pixels
    pub average_distance: f64,
}

/// How two objects relate once their pixels are compared
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Separation {
    /// The pixel sets intersect
    Overlap { shared_pixels: usize },
    /// Disjoint sets whose minimum distance is exactly zero
    Contact,
    Apart(NearestPoints),
}

impl Separation {
    /// Perimeter distance in pixels, `None` for the sentinel cases
    pub fn min_distance(&self) -> Option<f64> {
        match self {
            Separation::Apart(points) => Some(points.min_distance),
            _ => None,
        }
    }

    pub fn average_distance(&self) -> Option<f64> {
        match self {
            Separation::Apart(points) => Some(points.average_distance),
            _ => None,
        }
    }

    pub fn nearest_points(&self) -> Option<&NearestPoints> {
        match self {
            Separation::Apart(points) => Some(points),
            _ => None,
        }
    }

    pub fn is_overlap(&self) -> bool {
        matches!(self, Separation::Overlap { .. })
    }
}

/// Pixels present in both sets, sorted
pub fn overlap_pixels(a: &[Pixel], b: &[Pixel]) -> Vec<Pixel> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let lookup: HashSet<Pixel> = small.iter().copied().collect();

    let mut shared: Vec<Pixel> = large
        .iter()
        .copied()
        .filter(|p| lookup.contains(p))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    shared.sort_unstable();
    shared
}

/// Squared Euclidean distance of two pixels, exact in integers
#[inline]
fn pixel_distance_sq(p: Pixel, q: Pixel) -> u64 {
    let dr = p.0.abs_diff(q.0) as u64;
    let dc = p.1.abs_diff(q.1) as u64;
    dr * dr + dc * dc
}

/// Exhaustive nearest-point search over every `(p, q)` with `p` in `a`, `q` in `b`.
///
/// Ties on the minimum keep the first pair encountered. Fails when fewer than
/// `k` point pairs exist instead of averaging over a shorter list.
pub fn nearest_points(a: &[Pixel], b: &[Pixel], k: usize) -> Result<NearestPoints> {
    let available = a.len().saturating_mul(b.len());
    if k == 0 || available < k {
        return Err(ProximityError::InsufficientPairs { available, k });
    }

    let mut best_sq = u64::MAX;
    let mut best = (a[0], b[0]);
    // Max-heap holding the k smallest squared distances seen so far
    let mut smallest: BinaryHeap<u64> = BinaryHeap::with_capacity(k + 1);

    for &p in a {
        for &q in b {
            let d_sq = pixel_distance_sq(p, q);

            if d_sq < best_sq {
                best_sq = d_sq;
                best = (p, q);
            }

            if smallest.len() < k {
                smallest.push(d_sq);
            } else if smallest.peek().map_or(false, |&top| d_sq < top) {
                smallest.pop();
                smallest.push(d_sq);
            }
        }
    }

    let sum: f64 = smallest.iter().map(|&d| (d as f64).sqrt()).sum();

    Ok(NearestPoints {
        nearest_a: best.0,
        nearest_b: best.1,
        min_distance: (best_sq as f64).sqrt(),
        average_distance: sum / k as f64,
    })
}

/// Straight-line distance between two centroids
pub fn centroid_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dr = (a.0 - b.0).abs();
    let dc = (a.1 - b.1).abs();
    (dr * dr + dc * dc).sqrt()
}

/// Classify a pair: overlap first, then exact distances.
pub fn resolve_pair(a: &[Pixel], b: &[Pixel], k: usize) -> Result<Separation> {
    let shared = overlap_pixels(a, b);
    if !shared.is_empty() {
        return Ok(Separation::Overlap {
            shared_pixels: shared.len(),
        });
    }

    let points = nearest_points(a, b, k)?;
    if points.min_distance == 0.0 {
        return Ok(Separation::Contact);
    }

    Ok(Separation::Apart(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn square(row: u32, col: u32, size: u32) -> Vec<Pixel> {
        let mut pixels = Vec::new();
        for r in row..row + size {
            for c in col..col + size {
                pixels.push((r, c));
            }
        }
        pixels
    }

    fn reference_distances(a: &[Pixel], b: &[Pixel]) -> Vec<f64> {
        let mut all: Vec<f64> = a
            .iter()
            .flat_map(|p| {
                b.iter().map(move |q| {
                    let dr = p.0 as f64 - q.0 as f64;
                    let dc = p.1 as f64 - q.1 as f64;
                    (dr * dr + dc * dc).sqrt()
                })
            })
            .collect();
        all.sort_by(|x, y| x.partial_cmp(y).unwrap());
        all
    }

    #[test]
    fn single_pixels_k_apart() {
        for gap in 1..6u32 {
            let a = vec![(3, 3)];
            let b = vec![(3, 3 + gap)];
            let points = nearest_points(&a, &b, 1).unwrap();
            assert_approx_eq!(points.min_distance, gap as f64);
            assert_approx_eq!(points.average_distance, gap as f64);
            assert_approx_eq!(centroid_distance((3.0, 3.0), (3.0, 3.0 + gap as f64)), gap as f64);
        }
    }

    #[test]
    fn squares_match_brute_force_reference() {
        let a = square(0, 0, 2);
        let cases = [square(0, 5, 2), square(4, 4, 2), square(7, 1, 3)];
        for b in &cases {
            let reference = reference_distances(&a, b);
            let points = nearest_points(&a, b, 3).unwrap();
            assert_approx_eq!(points.min_distance, reference[0]);
            assert_approx_eq!(points.average_distance, reference[..3].iter().sum::<f64>() / 3.0);
        }
    }

    #[test]
    fn nearest_points_realize_the_minimum() {
        let a = square(0, 0, 3);
        let b = square(2, 6, 2);
        let points = nearest_points(&a, &b, 1).unwrap();
        assert_approx_eq!(points.min_distance, 4.0);
        let (p, q) = (points.nearest_a, points.nearest_b);
        let d = ((p.0 as f64 - q.0 as f64).powi(2) + (p.1 as f64 - q.1 as f64).powi(2)).sqrt();
        assert_approx_eq!(d, points.min_distance);
    }

    #[test]
    fn k_of_one_equals_minimum() {
        let a = square(0, 0, 2);
        let b = square(5, 5, 2);
        let points = nearest_points(&a, &b, 1).unwrap();
        assert_approx_eq!(points.average_distance, points.min_distance);
    }

    #[test]
    fn too_few_pairs_fails_loudly() {
        let err = nearest_points(&[(0, 0)], &[(0, 4), (0, 5)], 3).unwrap_err();
        assert!(matches!(err, ProximityError::InsufficientPairs { available: 2, k: 3 }));
        assert!(nearest_points(&[(0, 0)], &[(0, 4)], 0).is_err());
        assert!(nearest_points(&[], &[(0, 4)], 1).is_err());
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = square(0, 0, 3);
        let b = square(2, 2, 3);
        let ab = overlap_pixels(&a, &b);
        let ba = overlap_pixels(&b, &a);
        assert_eq!(ab, vec![(2, 2)]);
        assert_eq!(ab, ba);

        assert!(resolve_pair(&a, &b, 3).unwrap().is_overlap());
        assert!(resolve_pair(&b, &a, 3).unwrap().is_overlap());
        assert_eq!(
            resolve_pair(&a, &b, 3).unwrap(),
            Separation::Overlap { shared_pixels: 1 }
        );
    }

    #[test]
    fn disjoint_sets_resolve_apart() {
        let a = square(0, 0, 2);
        let b = square(0, 4, 2);
        let separation = resolve_pair(&a, &b, 3).unwrap();
        assert!(!separation.is_overlap());
        assert_approx_eq!(separation.min_distance().unwrap(), 3.0);
        assert!(separation.average_distance().unwrap() >= 3.0);

        let swapped = resolve_pair(&b, &a, 3).unwrap();
        assert_approx_eq!(swapped.min_distance().unwrap(), 3.0);
        assert_approx_eq!(
            swapped.average_distance().unwrap(),
            separation.average_distance().unwrap()
        );
    }

    #[test]
    fn centroid_distance_is_euclidean() {
        assert_approx_eq!(centroid_distance((1.0, 1.0), (4.0, 5.0)), 5.0);
        assert_approx_eq!(centroid_distance((4.0, 5.0), (1.0, 1.0)), 5.0);
    }
}
