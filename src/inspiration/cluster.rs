//! Density-based grouping of embedding vectors.

use std::collections::VecDeque;

/// Column-wise standardization statistics of a set of vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl Standardizer {
    /// Fits mean and standard deviation per dimension. Constant dimensions get a scale of 1.
    ///
    /// Returns `None` for an empty input.
    pub fn fit(points: &[&[f32]]) -> Option<Self> {
        let dimension = points.first()?.len();
        let n = points.len() as f32;

        let mut mean = vec![0.0f32; dimension];
        for point in points {
            for (m, v) in mean.iter_mut().zip(point.iter()) {
                *m += v / n;
            }
        }
        let mut scale = vec![0.0f32; dimension];
        for point in points {
            for ((s, v), m) in scale.iter_mut().zip(point.iter()).zip(&mean) {
                *s += (v - m) * (v - m) / n;
            }
        }
        for s in scale.iter_mut() {
            *s = s.sqrt();
            if *s == 0.0 || !s.is_finite() {
                *s = 1.0;
            }
        }

        Some(Self { mean, scale })
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, point: &[f32]) -> Vec<f32> {
        point
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// `1 - cos(a, b)`. A zero vector is at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a * norm_b)
    }
}

/// DBSCAN over cosine distance.
///
/// A point is a core point when at least `min_samples` points (itself included) lie within
/// `eps`. Returns one label per point; `None` marks noise.
pub fn dbscan(points: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<Option<usize>> {
    let n = points.len();
    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| cosine_distance(&points[i], &points[j]) <= eps)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= min_samples).collect();

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut next_label = 0;
    for start in 0..n {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }
        labels[start] = Some(next_label);
        let mut frontier = VecDeque::from([start]);
        while let Some(point) = frontier.pop_front() {
            if !is_core[point] {
                continue;
            }
            for &other in &neighbours[point] {
                if labels[other].is_none() {
                    labels[other] = Some(next_label);
                    frontier.push_back(other);
                }
            }
        }
        next_label += 1;
    }

    labels
}

/// Turns DBSCAN labels into group ids where every noise point is a group of its own.
///
/// If no cluster was found at all, every point is its own group.
pub fn groups_from_labels(labels: &[Option<usize>]) -> Vec<usize> {
    let clusters = labels.iter().flatten().max().map_or(0, |max| max + 1);
    let mut next_singleton = clusters;
    labels
        .iter()
        .map(|label| match label {
            Some(cluster) => *cluster,
            None => {
                next_singleton += 1;
                next_singleton - 1
            }
        })
        .collect()
}
