//! # Inspiration Memory
//!
//! A bounded store of ideas distilled from lineages that improved. Retrieved records are
//! shown to the oracle in later prompts.
//!
//! Retrieval groups similar records so a prompt does not receive five paraphrases of the
//! same idea. Embeddings are standardized per dimension; when the memory holds more than
//! twice the number of requested records and clustering is enabled, records are grouped
//! with DBSCAN over cosine distance. Every unclustered record counts as its own group, and
//! so does every record when no cluster is found or clustering does not apply. One
//! representative per group is returned, the one nearest to the query if there is one.
//!
//! Retrieval never fails: embedding problems are logged and yield no records.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use lineage::inspiration::{HashingEmbedder, InspirationMemory, InspirationRecord};
//! use lineage::rng::RandomNumberGenerator;
//!
//! let mut memory = InspirationMemory::new(Arc::new(HashingEmbedder::default()), 100);
//! memory.add(InspirationRecord::new(
//!     "Saturating growth",
//!     "Growth slows as the population nears a ceiling",
//!     "y = K / (1 + exp(-r * t))",
//! ));
//!
//! let mut rng = RandomNumberGenerator::from_seed(3);
//! let picked = memory.retrieve(&[], 5, &mut rng);
//! assert_eq!(picked.len(), 1);
//! ```

pub mod cluster;
pub mod embedding;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::candidate::Idea;
use crate::rng::RandomNumberGenerator;
use cluster::{dbscan, euclidean_distance, groups_from_labels, Standardizer};
pub use embedding::{Embedder, HashingEmbedder};

/// A distilled, reusable idea.
///
/// The embedding is derived state: it is never serialized and is recomputed on load.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct InspirationRecord {
    pub name: String,
    pub definition: String,
    pub example: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub embedding: Option<Vec<f32>>,
}

impl InspirationRecord {
    pub fn new(
        name: impl Into<String>,
        definition: impl Into<String>,
        example: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            example: example.into(),
            embedding: None,
        }
    }

    /// The text that gets embedded.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}\n{}", self.name, self.definition, self.example)
    }
}

/// Capacity-bounded, FIFO-evicted store of [`InspirationRecord`]s.
#[derive(Clone)]
pub struct InspirationMemory {
    embedder: Arc<dyn Embedder>,
    records: VecDeque<InspirationRecord>,
    capacity: usize,
    cluster_eps: Option<f32>,
}

impl std::fmt::Debug for InspirationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspirationMemory")
            .field("records", &self.records.len())
            .field("capacity", &self.capacity)
            .field("cluster_eps", &self.cluster_eps)
            .finish_non_exhaustive()
    }
}

impl InspirationMemory {
    /// An empty memory with clustering enabled at `eps = 0.6`.
    pub fn new(embedder: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            embedder,
            records: VecDeque::with_capacity(capacity),
            capacity,
            cluster_eps: Some(0.6),
        }
    }

    /// Sets the DBSCAN radius, or disables clustering with `None`.
    pub fn with_clustering(mut self, eps: Option<f32>) -> Self {
        self.cluster_eps = eps;
        self
    }

    /// Rebuilds a memory from a snapshot, recomputing every embedding.
    pub fn from_records<I>(embedder: Arc<dyn Embedder>, capacity: usize, records: I) -> Self
    where
        I: IntoIterator<Item = InspirationRecord>,
    {
        let mut memory = Self::new(embedder, capacity);
        for mut record in records {
            record.embedding = None;
            memory.add(record);
        }
        memory
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &InspirationRecord> {
        self.records.iter()
    }

    /// Copies of all records, oldest first, for persisting.
    pub fn snapshot(&self) -> Vec<InspirationRecord> {
        self.records.iter().cloned().collect()
    }

    /// Stores `record`, evicting the oldest records beyond capacity.
    ///
    /// Returns `false` (and stores nothing) when the record cannot be embedded or its
    /// embedding does not match the dimension of the stored ones.
    pub fn add(&mut self, mut record: InspirationRecord) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if record.embedding.is_none() {
            match self.embedder.embed(&record.embedding_text()) {
                Ok(embedding) => record.embedding = Some(embedding),
                Err(err) => {
                    warn!(name = %record.name, error = %err, "could not embed inspiration");
                    return false;
                }
            }
        }

        let dimension = record.embedding.as_ref().map_or(0, Vec::len);
        if let Some(expected) = self.dimension() {
            if dimension != expected {
                warn!(
                    name = %record.name,
                    dimension,
                    expected,
                    "inspiration embedding has the wrong dimension"
                );
                return false;
            }
        }

        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        true
    }

    fn dimension(&self) -> Option<usize> {
        self.records
            .front()
            .and_then(|r| r.embedding.as_ref())
            .map(Vec::len)
    }

    /// Picks up to `count` diverse records, optionally steered by `queries`.
    ///
    /// Each query contributes its nearest representative of every group; the union is
    /// deduplicated and `count` records are drawn from it uniformly.
    pub fn retrieve(
        &self,
        queries: &[Idea],
        count: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Vec<InspirationRecord> {
        if count == 0 || self.records.is_empty() {
            return Vec::new();
        }

        let embeddings: Vec<&[f32]> = self
            .records
            .iter()
            .filter_map(|r| r.embedding.as_deref())
            .collect();
        if embeddings.len() != self.records.len() {
            warn!("inspiration memory holds records without embeddings");
            return Vec::new();
        }
        let Some(standardizer) = Standardizer::fit(&embeddings) else {
            return Vec::new();
        };
        let points: Vec<Vec<f32>> = embeddings.iter().map(|e| standardizer.transform(e)).collect();
        let groups = self.group(&points, count);

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        if queries.is_empty() {
            let order: Vec<usize> = (0..points.len()).collect();
            for idx in representatives(&order, &groups) {
                if seen.insert(idx) {
                    candidates.push(idx);
                }
            }
        }
        for query in queries {
            let text = format!("{}: {}", query.name, query.definition);
            let embedding = match self.embedder.embed(&text) {
                Ok(embedding) if embedding.len() == standardizer.dimension() => embedding,
                Ok(embedding) => {
                    warn!(
                        dimension = embedding.len(),
                        expected = standardizer.dimension(),
                        "query embedding has the wrong dimension"
                    );
                    return Vec::new();
                }
                Err(err) => {
                    warn!(error = %err, "could not embed inspiration query");
                    return Vec::new();
                }
            };
            let target = standardizer.transform(&embedding);

            let mut order: Vec<usize> = (0..points.len()).collect();
            order.sort_by(|&a, &b| {
                euclidean_distance(&points[a], &target)
                    .total_cmp(&euclidean_distance(&points[b], &target))
            });
            for idx in representatives(&order, &groups) {
                if seen.insert(idx) {
                    candidates.push(idx);
                }
            }
        }

        debug!(
            records = self.records.len(),
            candidates = candidates.len(),
            count,
            "retrieved inspirations"
        );
        rng.sample_indices(candidates.len(), count)
            .into_iter()
            .map(|i| self.records[candidates[i]].clone())
            .collect()
    }

    fn group(&self, points: &[Vec<f32>], count: usize) -> Vec<usize> {
        let n = points.len();
        match self.cluster_eps {
            Some(eps) if n > 2 * count => {
                let min_samples = (n / count / 2).max(1);
                groups_from_labels(&dbscan(points, eps, min_samples))
            }
            _ => (0..n).collect(),
        }
    }
}

/// The first point of every group, walking `order`.
fn representatives(order: &[usize], groups: &[usize]) -> Vec<usize> {
    let mut taken = HashSet::new();
    order
        .iter()
        .copied()
        .filter(|&idx| taken.insert(groups[idx]))
        .collect()
}
