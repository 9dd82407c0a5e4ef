use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use lineage::{
    candidate::FailureKind,
    error::{EvolutionError, Result},
    evaluator::{Evaluation, EvaluationGuard},
    evolution::{CandidatePipeline, EvolutionOptions, InspirationOptions, Origin, Seed},
    extract::{Representation, ResponseExtractor, ResponseSchema},
    inspiration::{HashingEmbedder, InspirationMemory},
    oracle::{Message, Oracle},
    prompt::{DefaultPromptBuilder, OffspringMode},
    rng::RandomNumberGenerator,
    Candidate, Lineage, Outcome,
};

fn schema() -> ResponseSchema {
    ResponseSchema::new(
        vec![
            Representation::new("Natural Language English", "Verbal description."),
            Representation::new("Code", "A single number standing in for a program."),
        ],
        "Code",
    )
    .unwrap()
}

fn response(value: impl std::fmt::Display) -> String {
    format!(
        "## Ideas\n- Idea 1:\n  - Name: shift\n  - Reasoning: lower is better\n  - Definition: move down\n## Thoughts\ntry {value}\n## Solutions\n### Natural Language English\nA constant.\n### Code\n```\n{value}\n```\n"
    )
}

/// Replies with queued responses in order and records every prompt it saw.
#[derive(Clone, Default)]
struct ScriptedOracle {
    replies: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedOracle {
    fn new<I: IntoIterator<Item = String>>(replies: I) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            prompts: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn reply(&self, messages: &[Message]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| EvolutionError::Transport("script exhausted".to_string()))
    }
}

fn number_evaluator() -> EvaluationGuard {
    EvaluationGuard::new(Arc::new(|code: &str| match code.trim().parse::<f64>() {
        Ok(value) => Evaluation::success(vec![value, 0.0], format!("value {}", value)),
        Err(e) => Evaluation::failure(format!("ValueError: {}", e)),
    }))
}

struct Fixture {
    extractor: ResponseExtractor,
    evaluator: EvaluationGuard,
    prompts: DefaultPromptBuilder,
    options: EvolutionOptions,
}

impl Fixture {
    fn new(options: EvolutionOptions) -> Self {
        Self {
            extractor: ResponseExtractor::new(schema()),
            evaluator: number_evaluator(),
            prompts: DefaultPromptBuilder::new(),
            options,
        }
    }

    fn pipeline<'a>(
        &'a self,
        oracle: &'a ScriptedOracle,
        distiller: &'a ScriptedOracle,
        memory: Option<&'a InspirationMemory>,
    ) -> CandidatePipeline<'a> {
        CandidatePipeline {
            task: "Find the smallest number.",
            oracle,
            distiller,
            extractor: &self.extractor,
            evaluator: &self.evaluator,
            prompts: &self.prompts,
            memory,
            known_inspirations: &[],
            options: &self.options,
        }
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        self.reply(messages)
    }
}

fn primaries(lineage: &Lineage) -> Vec<f64> {
    lineage
        .layers()
        .iter()
        .map(|c| c.fitness().unwrap().values()[0])
        .collect()
}

#[test]
fn test_lineage_stops_when_improvement_is_below_epsilon() {
    let fixture = Fixture::new(EvolutionOptions::builder().max_layers(3).build());
    let oracle = ScriptedOracle::new([response(10.0), response(10.0 - 1e-9), response(5.0)]);
    let unused = ScriptedOracle::default();
    let mut rng = RandomNumberGenerator::from_seed(1);

    let grown = fixture
        .pipeline(&oracle, &unused, None)
        .grow(&Seed::Fresh, &mut rng)
        .unwrap();

    assert_eq!(grown.origin, Origin::Fresh);
    assert_eq!(primaries(&grown.lineage), vec![10.0, 10.0 - 1e-9]);
    assert_eq!(oracle.calls(), 2);
    assert!(grown.distilled.is_empty());
}

#[test]
fn test_lineage_is_capped_at_max_layers() {
    let fixture = Fixture::new(EvolutionOptions::builder().max_layers(3).build());
    let oracle = ScriptedOracle::new([10.0, 8.0, 5.0, 1.0].map(response));
    let unused = ScriptedOracle::default();
    let mut rng = RandomNumberGenerator::from_seed(1);

    let grown = fixture
        .pipeline(&oracle, &unused, None)
        .grow(&Seed::Fresh, &mut rng)
        .unwrap();

    assert_eq!(primaries(&grown.lineage), vec![10.0, 8.0, 5.0]);
    // ideas without quote and implication are dropped from continuation layers
    assert!(grown.lineage.layers()[1].ideas.is_empty());
}

#[test]
fn test_parse_failure_terminates_lineage() {
    let fixture = Fixture::new(
        EvolutionOptions::builder()
            .max_layers(3)
            .oracle_attempts(2)
            .build(),
    );
    let oracle = ScriptedOracle::new([
        response(10.0),
        "I refuse to follow the format.".to_string(),
        "Still no solutions section.".to_string(),
    ]);
    let unused = ScriptedOracle::default();
    let mut rng = RandomNumberGenerator::from_seed(1);

    let grown = fixture
        .pipeline(&oracle, &unused, None)
        .grow(&Seed::Fresh, &mut rng)
        .unwrap();

    assert_eq!(grown.lineage.len(), 2);
    assert!(!grown.lineage.is_ok());
    match &grown.lineage.last().outcome {
        Outcome::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::ParseFailure);
            assert!(message.starts_with("ParseFailure"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_evaluation_failure_is_recorded_not_raised() {
    let fixture = Fixture::new(EvolutionOptions::default());
    let oracle = ScriptedOracle::new([response("not a number")]);
    let unused = ScriptedOracle::default();
    let mut rng = RandomNumberGenerator::from_seed(1);

    let grown = fixture
        .pipeline(&oracle, &unused, None)
        .grow(&Seed::Fresh, &mut rng)
        .unwrap();

    assert_eq!(grown.lineage.len(), 1);
    assert!(grown.lineage.root().error().unwrap().contains("ValueError"));
}

#[test]
fn test_transport_failure_propagates() {
    let fixture = Fixture::new(EvolutionOptions::default());
    let oracle = ScriptedOracle::new([response(3.0)]);
    let unused = ScriptedOracle::default();
    let mut rng = RandomNumberGenerator::from_seed(1);

    let result = fixture
        .pipeline(&oracle, &unused, None)
        .grow(&Seed::Fresh, &mut rng);

    assert!(matches!(result, Err(EvolutionError::Transport(_))));
}

#[test]
fn test_improving_lineage_is_distilled() {
    let options = EvolutionOptions::builder()
        .max_layers(3)
        .inspiration(InspirationOptions {
            enabled: true,
            ..Default::default()
        })
        .build();
    let fixture = Fixture::new(options);
    let memory = InspirationMemory::new(Arc::new(HashingEmbedder::default()), 10);
    let oracle = ScriptedOracle::new([10.0, 8.0, 5.0].map(response));
    let distiller = ScriptedOracle::new([
        "## Analysis\nforgot the section".to_string(),
        "## New Ideas\n- Idea 1:\n  - Reasoning: it kept dropping\n  - Name: Descend\n  - Definition: subtract a constant\n  - Example: x - 1\n".to_string(),
    ]);
    let mut rng = RandomNumberGenerator::from_seed(1);

    let grown = fixture
        .pipeline(&oracle, &distiller, Some(&memory))
        .grow(&Seed::Fresh, &mut rng)
        .unwrap();

    assert_eq!(distiller.calls(), 2);
    assert_eq!(grown.distilled.len(), 1);
    assert_eq!(grown.distilled[0].name, "Descend");
    assert_eq!(grown.distilled[0].example, "x - 1");
}

#[test]
fn test_offspring_worse_than_parent_is_not_distilled() {
    let options = EvolutionOptions::builder()
        .max_layers(1)
        .inspiration(InspirationOptions {
            enabled: true,
            ..Default::default()
        })
        .build();
    let fixture = Fixture::new(options);
    let memory = InspirationMemory::new(Arc::new(HashingEmbedder::default()), 10);
    let oracle = ScriptedOracle::new([response(4.0)]);
    let distiller = ScriptedOracle::default();
    let mut rng = RandomNumberGenerator::from_seed(1);
    let mut parent = Candidate::scored(vec![2.0, 0.0]);
    parent
        .representations
        .insert("Code".to_string(), "parent code".to_string());
    let seed = Seed::Offspring {
        mode: OffspringMode::MutationPositive,
        parents: vec![Lineage::new(parent)],
    };

    let grown = fixture
        .pipeline(&oracle, &distiller, Some(&memory))
        .grow(&seed, &mut rng)
        .unwrap();

    assert_eq!(grown.origin, Origin::Offspring(OffspringMode::MutationPositive));
    assert_eq!(distiller.calls(), 0);
    assert!(grown.distilled.is_empty());

    // the parent appears in the offspring prompt
    let prompt = &oracle.prompts.lock().unwrap()[0];
    assert!(prompt.iter().any(|m| m.content.contains("parent code")));
}

#[test]
fn test_offspring_of_failed_parents_is_distilled() {
    let options = EvolutionOptions::builder()
        .max_layers(1)
        .inspiration(InspirationOptions {
            enabled: true,
            ..Default::default()
        })
        .build();
    let fixture = Fixture::new(options);
    let memory = InspirationMemory::new(Arc::new(HashingEmbedder::default()), 10);
    let oracle = ScriptedOracle::new([response(4.0)]);
    let distiller = ScriptedOracle::new([concat!(
        "## New Ideas\n- Idea 1:\n  - Reasoning: the parents crashed\n  - Name: Stay numeric\n",
        "  - Definition: return a plain number\n  - Example: 4\n"
    )
    .to_string()]);
    let mut rng = RandomNumberGenerator::from_seed(1);
    let seed = Seed::Offspring {
        mode: OffspringMode::CrossoverPositive,
        parents: vec![
            Lineage::new(Candidate::failed("ZeroDivisionError")),
            Lineage::new(Candidate::failed("NameError: y")),
        ],
    };

    let grown = fixture
        .pipeline(&oracle, &distiller, Some(&memory))
        .grow(&seed, &mut rng)
        .unwrap();

    assert!(grown.lineage.is_ok());
    assert_eq!(distiller.calls(), 1);
    assert_eq!(grown.distilled.len(), 1);
    assert_eq!(grown.distilled[0].name, "Stay numeric");
}
