//! # Persistence
//!
//! JSON snapshots of a run, laid out as:
//!
//! ```text
//! <root>/gen_0/lineage_0.json       one file per survivor, best ranked first
//! <root>/gen_0/inspirations.json    memory snapshot, [{name, definition, example}]
//! <root>/history/lineage_17.json    every lineage ever created (optional)
//! ```
//!
//! A lineage file is an array of candidate records, root first. Embeddings are never written;
//! they are recomputed when a snapshot is loaded into an [`InspirationMemory`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use lineage::persistence::{load_inspirations, load_population};
//!
//! let population = load_population("runs/a/gen_9").unwrap();
//! let records = load_inspirations("runs/a/gen_9/inspirations.json").unwrap();
//! // OrchestratorBuilder::new()
//! //     .with_initial_population(population)
//! //     .with_inspirations(records)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::candidate::Lineage;
use crate::error::{Result, ResultExt};
use crate::evolution::observer::EvolutionObserver;
use crate::evolution::pipeline::GrownLineage;
use crate::evolution::report::GenerationReport;
use crate::inspiration::{InspirationMemory, InspirationRecord};

const LINEAGE_PREFIX: &str = "lineage_";
const INSPIRATIONS_FILE: &str = "inspirations.json";

fn generation_dir(root: &Path, generation: usize) -> PathBuf {
    root.join(format!("gen_{}", generation))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).context(format!("Failed to write {}", path.display()))
}

/// Writes `population` to `<root>/gen_<generation>/lineage_<i>.json`.
///
/// Returns the generation directory.
pub fn save_generation(
    root: impl AsRef<Path>,
    generation: usize,
    population: &[Lineage],
) -> Result<PathBuf> {
    let dir = generation_dir(root.as_ref(), generation);
    fs::create_dir_all(&dir).context(format!("Failed to create {}", dir.display()))?;

    for (idx, lineage) in population.iter().enumerate() {
        write_json(&dir.join(format!("{}{}.json", LINEAGE_PREFIX, idx)), lineage)?;
    }
    debug!(path = %dir.display(), lineages = population.len(), "saved generation");
    Ok(dir)
}

/// Writes the memory snapshot to `<root>/gen_<generation>/inspirations.json`.
pub fn save_inspirations(
    root: impl AsRef<Path>,
    generation: usize,
    records: &[InspirationRecord],
) -> Result<PathBuf> {
    let dir = generation_dir(root.as_ref(), generation);
    fs::create_dir_all(&dir).context(format!("Failed to create {}", dir.display()))?;

    let path = dir.join(INSPIRATIONS_FILE);
    write_json(&path, records)?;
    Ok(path)
}

/// Writes one lineage to `<root>/history/lineage_<index>.json`.
pub fn save_history(root: impl AsRef<Path>, index: usize, lineage: &Lineage) -> Result<PathBuf> {
    let dir = root.as_ref().join("history");
    fs::create_dir_all(&dir).context(format!("Failed to create {}", dir.display()))?;

    let path = dir.join(format!("{}{}.json", LINEAGE_PREFIX, index));
    write_json(&path, lineage)?;
    Ok(path)
}

/// Index encoded in a `lineage_<i>.json` file name.
fn lineage_index(path: &Path) -> Option<usize> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(LINEAGE_PREFIX)?
        .parse()
        .ok()
}

/// Loads every `lineage_<i>.json` in `dir`, ordered by `i` numerically.
///
/// Other files are ignored.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or a lineage file is malformed
/// (including an empty array).
pub fn load_population(dir: impl AsRef<Path>) -> Result<Vec<Lineage>> {
    let dir = dir.as_ref();
    let mut indexed = Vec::new();
    for entry in fs::read_dir(dir).context(format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if let Some(idx) = lineage_index(&path) {
            indexed.push((idx, path));
        }
    }
    indexed.sort_by_key(|(idx, _)| *idx);

    let mut population = Vec::with_capacity(indexed.len());
    for (_, path) in indexed {
        let json =
            fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))?;
        population.push(serde_json::from_str(&json)?);
    }
    debug!(path = %dir.display(), lineages = population.len(), "loaded population");
    Ok(population)
}

/// Loads a memory snapshot. The records carry no embeddings yet.
pub fn load_inspirations(path: impl AsRef<Path>) -> Result<Vec<InspirationRecord>> {
    let path = path.as_ref();
    let json =
        fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&json)?)
}

/// Observer that archives a run under a root directory.
///
/// After every generation the survivors and the memory snapshot are written. With
/// [`ArchiveObserver::with_history`], every created lineage is also written, numbered in
/// creation order.
#[derive(Debug, Clone)]
pub struct ArchiveObserver {
    root: PathBuf,
    history: bool,
    pending: Vec<Lineage>,
    written: usize,
}

impl ArchiveObserver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            history: false,
            pending: Vec::new(),
            written: 0,
        }
    }

    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl EvolutionObserver for ArchiveObserver {
    fn on_lineage(&mut self, _generation: usize, grown: &GrownLineage) {
        if self.history {
            self.pending.push(grown.lineage.clone());
        }
    }

    fn on_generation(
        &mut self,
        report: &GenerationReport,
        population: &[Lineage],
        memory: Option<&InspirationMemory>,
    ) -> Result<()> {
        save_generation(&self.root, report.generation, population)?;
        if let Some(memory) = memory {
            save_inspirations(&self.root, report.generation, &memory.snapshot())?;
        }

        for lineage in std::mem::take(&mut self.pending) {
            save_history(&self.root, self.written, &lineage)?;
            self.written += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_index() {
        assert_eq!(lineage_index(Path::new("gen_0/lineage_12.json")), Some(12));
        assert_eq!(lineage_index(Path::new("gen_0/inspirations.json")), None);
        assert_eq!(lineage_index(Path::new("gen_0/lineage_x.json")), None);
        assert_eq!(lineage_index(Path::new("gen_0/lineage_3.txt")), None);
    }
}
