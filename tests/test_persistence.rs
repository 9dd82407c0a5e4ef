#![cfg(feature = "serde")]

use std::fs;
use std::sync::Arc;

use lineage::{
    candidate::{Candidate, Lineage},
    error::Result,
    evaluator::Evaluation,
    evolution::{EvolutionOptions, InspirationOptions, OrchestratorBuilder},
    extract::{Representation, ResponseSchema},
    inspiration::{HashingEmbedder, InspirationMemory, InspirationRecord},
    oracle::Message,
    persistence::{
        load_inspirations, load_population, save_generation, save_inspirations, ArchiveObserver,
    },
};
use tempfile::TempDir;

fn schema() -> ResponseSchema {
    ResponseSchema::new(vec![Representation::new("Code", "A number.")], "Code").unwrap()
}

fn builder() -> OrchestratorBuilder {
    OrchestratorBuilder::new()
        .with_task("Find the smallest number.")
        .with_schema(schema())
        .with_oracle(|messages: &[Message]| -> Result<String> {
            let continuation = messages
                .iter()
                .any(|m| m.content.contains("previous solutions"));
            let value = if continuation { 1 } else { 50 };
            Ok(format!("## Solutions\n### Code\n{}\n", value))
        })
        .with_distiller(|_: &[Message]| -> Result<String> {
            Ok(concat!(
                "## New Ideas\n- Idea 1:\n  - Reasoning: r\n  - Name: Go low\n",
                "  - Definition: pick a small number\n  - Example: 1\n"
            )
            .to_string())
        })
        .with_evaluator(|code: &str| match code.trim().parse::<f64>() {
            Ok(v) => Evaluation::success(vec![v, 0.0], "ok"),
            Err(e) => Evaluation::failure(e.to_string()),
        })
        .with_options(
            EvolutionOptions::builder()
                .num_generations(2)
                .population_size(2)
                .max_layers(2)
                .num_threads(2)
                .inspiration(InspirationOptions {
                    enabled: true,
                    ..Default::default()
                })
                .build(),
        )
}

#[test]
fn test_population_round_trip_in_index_order() {
    let dir = TempDir::new().unwrap();
    let mut failed_tail = Lineage::new(Candidate::scored(vec![3.0, 0.5]));
    failed_tail.push(Candidate::failed("Evaluation timed out after 1.0 seconds"));
    let population: Vec<Lineage> = (0..12)
        .map(|i| Lineage::new(Candidate::scored(vec![i as f64, 0.0])))
        .chain(std::iter::once(failed_tail))
        .collect();

    let gen_dir = save_generation(dir.path(), 4, &population).unwrap();
    assert!(gen_dir.ends_with("gen_4"));
    fs::write(gen_dir.join("notes.txt"), "ignored").unwrap();

    let loaded = load_population(&gen_dir).unwrap();
    assert_eq!(loaded, population);
}

#[test]
fn test_lineage_file_is_array_of_candidates() {
    let dir = TempDir::new().unwrap();
    let mut lineage = Lineage::new(Candidate::scored(vec![2.0, 1.0]));
    lineage.push(Candidate::scored(vec![1.0, 1.0]));
    save_generation(dir.path(), 0, &[lineage]).unwrap();

    let json = fs::read_to_string(dir.path().join("gen_0").join("lineage_0.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value.as_array().map(Vec::len), Some(2));
}

#[test]
fn test_candidate_records_carry_fitness_and_error_inline() {
    let dir = TempDir::new().unwrap();
    let mut lineage = Lineage::new(Candidate::scored(vec![2.0, 1.0]));
    lineage.push(Candidate::failed("Evaluation crashed: overflow"));
    save_generation(dir.path(), 0, &[lineage]).unwrap();

    let json = fs::read_to_string(dir.path().join("gen_0").join("lineage_0.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let root = &value[0];
    assert_eq!(root["fitness"], serde_json::json!([2.0, 1.0]));
    assert!(root.get("error").is_none());
    assert!(root.get("outcome").is_none());

    let failed = &value[1];
    assert_eq!(failed["error"], "Evaluation crashed: overflow");
    assert_eq!(failed["error_kind"], "evaluation_failure");
    assert!(failed.get("fitness").is_none());
}

#[test]
fn test_empty_lineage_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("lineage_0.json"), "[]").unwrap();

    assert!(load_population(dir.path()).is_err());
}

#[test]
fn test_inspiration_snapshot_has_no_embeddings() {
    let dir = TempDir::new().unwrap();
    let mut memory = InspirationMemory::new(Arc::new(HashingEmbedder::default()), 10);
    memory.add(InspirationRecord::new("Offset", "add a constant", "y + c"));

    let path = save_inspirations(dir.path(), 1, &memory.snapshot()).unwrap();
    let json = fs::read_to_string(&path).unwrap();
    assert!(!json.contains("embedding"));

    let loaded = load_inspirations(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "Offset");
    assert!(loaded[0].embedding.is_none());

    let restored =
        InspirationMemory::from_records(Arc::new(HashingEmbedder::default()), 10, loaded);
    assert!(restored.records().all(|r| r.embedding.is_some()));
}

#[test]
fn test_archive_observer_and_resume() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = builder()
        .with_observer(ArchiveObserver::new(dir.path()).with_history(true))
        .build()
        .unwrap();

    let result = orchestrator.run().unwrap();

    let last = dir.path().join("gen_1");
    assert!(dir.path().join("gen_0").join("lineage_1.json").exists());
    assert!(last.join("inspirations.json").exists());
    // 4 initial lineages, then 1 fresh and 4 offspring
    let history = fs::read_dir(dir.path().join("history")).unwrap().count();
    assert_eq!(history, 9);

    let population = load_population(&last).unwrap();
    assert_eq!(population, result.population);
    let records = load_inspirations(last.join("inspirations.json")).unwrap();
    assert!(!records.is_empty());

    let resumed = builder()
        .with_initial_population(population)
        .with_inspirations(records.clone())
        .build()
        .unwrap();
    assert_eq!(resumed.memory().unwrap().len(), records.len());
}
