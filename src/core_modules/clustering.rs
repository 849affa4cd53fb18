// THEORY:
// Clustering turns a cloud of above-threshold pixels into a handful of subject
// positions. It sits behind the `Clusterer` trait so the extractor does not depend on
// one numeric routine; anything that can map `(points, k)` to at most `k` centroids
// can be plugged in.
//
// The default is plain k-means (Lloyd's algorithm):
// 1.  **Seeding**: `k` distinct input points are drawn at random as the initial
//     centroids.
// 2.  **Refinement**: points are assigned to their nearest centroid and every centroid
//     moves to the mean of its members. Clusters that lose all members are dropped,
//     so fewer than `k` centroids can come back.
// 3.  **Stopping**: iteration ends when the mean point-to-centroid distance improves
//     by no more than `tolerance`, or after `max_iterations`.
// 4.  **Restarts**: the whole run is repeated `restarts` times and the lowest
//     distortion wins, which makes an unlucky seed much less likely to split one
//     subject in two.
//
// With a fixed `seed` the output is fully deterministic, which tests and the parallel
// extractor rely on.

use crate::config::KMeansConfig;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

pub type Coordinate = (f64, f64);

/// Groups points into at most `k` clusters and returns their centers.
pub trait Clusterer: Send + Sync {
    fn cluster(&self, points: &[Coordinate], k: usize) -> Vec<Coordinate>;
}

#[derive(Debug, Clone, Default)]
pub struct KMeans {
    config: KMeansConfig,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(KMeansConfig {
            seed: Some(seed),
            ..KMeansConfig::default()
        })
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// One Lloyd run from the given seeds. Returns the centroids and their distortion.
    fn refine(&self, points: &[Coordinate], mut centroids: Vec<Coordinate>) -> (Vec<Coordinate>, f64) {
        let mut distortion = f64::INFINITY;

        for _ in 0..self.config.max_iterations.max(1) {
            let mut sums = vec![(0.0, 0.0, 0usize); centroids.len()];
            let mut total_distance = 0.0;
            for p in points {
                let (nearest, dist) = nearest_centroid(p, &centroids);
                sums[nearest].0 += p.0;
                sums[nearest].1 += p.1;
                sums[nearest].2 += 1;
                total_distance += dist;
            }
            let new_distortion = total_distance / points.len() as f64;

            centroids = sums
                .into_iter()
                .filter(|&(_, _, n)| n > 0)
                .map(|(sx, sy, n)| (sx / n as f64, sy / n as f64))
                .collect();

            let improvement = distortion - new_distortion;
            distortion = new_distortion;
            if improvement <= self.config.tolerance {
                break;
            }
        }

        (centroids, distortion)
    }
}

impl Clusterer for KMeans {
    fn cluster(&self, points: &[Coordinate], k: usize) -> Vec<Coordinate> {
        let k = k.min(points.len());
        if k == 0 {
            return Vec::new();
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut best: Option<(Vec<Coordinate>, f64)> = None;
        for _ in 0..self.config.restarts.max(1) {
            let seeds = index::sample(&mut rng, points.len(), k)
                .into_iter()
                .map(|i| points[i])
                .collect();
            let (centroids, distortion) = self.refine(points, seeds);
            let improved = match &best {
                Some((_, best_distortion)) => distortion < *best_distortion,
                None => true,
            };
            if improved {
                best = Some((centroids, distortion));
            }
        }

        best.map(|(centroids, _)| centroids).unwrap_or_default()
    }
}

fn nearest_centroid(point: &Coordinate, centroids: &[Coordinate]) -> (usize, f64) {
    let mut nearest = 0;
    let mut best = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let dist = ((point.0 - c.0).powi(2) + (point.1 - c.1).powi(2)).sqrt();
        if dist < best {
            best = dist;
            nearest = i;
        }
    }
    (nearest, best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(cx: f64, cy: f64, half: i32) -> Vec<Coordinate> {
        let mut pts = Vec::new();
        for dy in -half..=half {
            for dx in -half..=half {
                pts.push((cx + dx as f64, cy + dy as f64));
            }
        }
        pts
    }

    #[test]
    fn single_cluster_is_the_mean() {
        let pts = square(12.0, 30.0, 2);
        let centers = KMeans::seeded(7).cluster(&pts, 1);
        assert_eq!(centers.len(), 1);
        assert_relative_eq!(centers[0].0, 12.0, epsilon = 1e-9);
        assert_relative_eq!(centers[0].1, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn separates_two_distant_blobs() {
        let mut pts = square(10.0, 10.0, 2);
        pts.extend(square(80.0, 60.0, 2));
        let mut centers = KMeans::seeded(3).cluster(&pts, 2);
        centers.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(centers.len(), 2);
        assert_relative_eq!(centers[0].0, 10.0, epsilon = 1e-9);
        assert_relative_eq!(centers[0].1, 10.0, epsilon = 1e-9);
        assert_relative_eq!(centers[1].0, 80.0, epsilon = 1e-9);
        assert_relative_eq!(centers[1].1, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn k_is_clamped_to_the_point_count() {
        let pts = vec![(1.0, 1.0), (50.0, 50.0)];
        let centers = KMeans::seeded(1).cluster(&pts, 5);
        assert_eq!(centers.len(), 2);
    }

    #[test]
    fn empty_input_gives_no_centroids() {
        assert!(KMeans::seeded(1).cluster(&[], 3).is_empty());
        assert!(KMeans::seeded(1).cluster(&[(1.0, 2.0)], 0).is_empty());
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut pts = square(5.0, 5.0, 3);
        pts.extend(square(20.0, 8.0, 1));
        pts.extend(square(40.0, 40.0, 2));
        let a = KMeans::seeded(42).cluster(&pts, 3);
        let b = KMeans::seeded(42).cluster(&pts, 3);
        assert_eq!(a, b);
    }
}
