//! K-means clustering of RGB pixel vectors.
//!
//! k-means++ seeding from a fixed-seed `StdRng`, then Lloyd iterations. The
//! same seed and input always give the same labels.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::SegmenterConfig;
use crate::error::{LesionError, Result};
use crate::maybe_rayon::*;

pub type ColorVector = [f32; 3];

#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub max_iterations: usize,
    /// Largest centroid shift that still counts as converged
    pub tolerance: f32,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub centroids: Vec<ColorVector>,
    /// Cluster index per input point
    pub labels: Vec<usize>,
    pub iterations: usize,
    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::from_config(&SegmenterConfig::default())
    }
}

impl KMeans {
    pub fn from_config(config: &SegmenterConfig) -> Self {
        Self {
            k: config.clusters,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }

    pub fn fit(&self, points: &[ColorVector]) -> Result<KMeansFit> {
        if self.k == 0 {
            return Err(LesionError::Segmentation("k-means requires k >= 1".into()));
        }
        if points.len() < self.k {
            return Err(LesionError::Segmentation(format!(
                "not enough pixels ({}) for {} clusters",
                points.len(),
                self.k
            )));
        }

        let mut centroids = self.initialize(points);
        let mut labels = vec![0usize; points.len()];
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            assign(points, &centroids, &mut labels);

            let mut sums = vec![[0.0f64; 3]; self.k];
            let mut counts = vec![0usize; self.k];
            for (point, label) in points.iter().zip(&labels) {
                for c in 0..3 {
                    sums[*label][c] += point[c] as f64;
                }
                counts[*label] += 1;
            }

            let mut max_shift = 0.0f32;
            for k in 0..self.k {
                // Empty clusters keep their previous centroid
                if counts[k] == 0 {
                    continue;
                }
                let updated = [
                    (sums[k][0] / counts[k] as f64) as f32,
                    (sums[k][1] / counts[k] as f64) as f32,
                    (sums[k][2] / counts[k] as f64) as f32,
                ];
                max_shift = max_shift.max(squared_distance(&updated, &centroids[k]).sqrt());
                centroids[k] = updated;
            }

            if max_shift <= self.tolerance {
                break;
            }
        }

        assign(points, &centroids, &mut labels);
        let inertia = points
            .iter()
            .zip(&labels)
            .map(|(point, label)| squared_distance(point, &centroids[*label]) as f64)
            .sum();

        Ok(KMeansFit {
            centroids,
            labels,
            iterations,
            inertia,
        })
    }

    /// k-means++ seeding
    fn initialize(&self, points: &[ColorVector]) -> Vec<ColorVector> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(points[rng.gen_range(0..points.len())]);

        let mut nearest: Vec<f32> = points
            .iter()
            .map(|p| squared_distance(p, &centroids[0]))
            .collect();

        while centroids.len() < self.k {
            let total: f64 = nearest.iter().map(|d| *d as f64).sum();
            let next = if total > 0.0 {
                let target = rng.gen_range(0.0..total);
                let mut cumulative = 0.0f64;
                let mut chosen = points.len() - 1;
                for (i, d) in nearest.iter().enumerate() {
                    cumulative += *d as f64;
                    if cumulative > target {
                        chosen = i;
                        break;
                    }
                }
                points[chosen]
            } else {
                // Every point coincides with a centroid already
                points[rng.gen_range(0..points.len())]
            };

            for (d, p) in nearest.iter_mut().zip(points) {
                *d = d.min(squared_distance(p, &next));
            }
            centroids.push(next);
        }

        centroids
    }
}

fn assign(points: &[ColorVector], centroids: &[ColorVector], labels: &mut [usize]) {
    labels.par_iter_mut().enumerate().for_each(|(i, label)| {
        let mut best = 0;
        let mut best_distance = f32::INFINITY;
        for (k, centroid) in centroids.iter().enumerate() {
            let distance = squared_distance(&points[i], centroid);
            if distance < best_distance {
                best_distance = distance;
                best = k;
            }
        }
        *label = best;
    });
}

fn squared_distance(a: &ColorVector, b: &ColorVector) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}
