//! # Response Extraction
//!
//! Turns raw oracle text into a [`CandidateDraft`]. A well-formed response has three
//! level-2 sections, in order:
//!
//! ````text
//! ## Ideas
//! - Idea 1:
//!   - Name: ...
//!   - Reasoning: ...
//!   - Definition: ...
//! ## Thoughts
//! ...
//! ## Solutions
//! ### Python Code
//! ```python
//! ...
//! ```
//! ````
//!
//! Continuation layers prefix each idea with `Quote` and `Implication` fields. Only the
//! representation slot used for evaluation is mandatory; everything else degrades to
//! empty values.
//!
//! Oracle requests that keep producing unusable text are retried through
//! [`request_until_valid`], which bounds the number of attempts.

pub mod scanner;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateDraft, Idea};
use crate::error::{EvolutionError, Result};
use crate::inspiration::InspirationRecord;
use crate::oracle::{Message, Oracle};
use scanner::{assemble_records, title_matches, tokenize, Field, Token};

/// Why a response could not be turned into a draft.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("No solution found: {0}")]
    NoSolutionFound(String),
}

/// A named representation slot the oracle must fill.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub name: String,
    pub description: String,
}

impl Representation {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Level-2 section titles expected in oracle responses.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeadings {
    pub ideas: String,
    pub rationale: String,
    pub representations: String,
    /// Section holding distilled ideas in distillation responses.
    pub distilled: String,
}

impl Default for SectionHeadings {
    fn default() -> Self {
        Self {
            ideas: "Ideas".to_string(),
            rationale: "Thoughts".to_string(),
            representations: "Solutions".to_string(),
            distilled: "New Ideas".to_string(),
        }
    }
}

/// The structure oracle responses must follow.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    headings: SectionHeadings,
    representations: Vec<Representation>,
    evaluated: String,
}

impl ResponseSchema {
    /// Creates a schema whose `evaluated` slot is handed to the evaluator.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when `evaluated` is not one of `representations`, or when
    /// two slots share a name.
    pub fn new(representations: Vec<Representation>, evaluated: impl Into<String>) -> Result<Self> {
        Self::with_headings(SectionHeadings::default(), representations, evaluated)
    }

    pub fn with_headings(
        headings: SectionHeadings,
        representations: Vec<Representation>,
        evaluated: impl Into<String>,
    ) -> Result<Self> {
        let schema = Self {
            headings,
            representations,
            evaluated: evaluated.into(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Checks the schema invariants. Deserialized schemas should be validated before use.
    pub fn validate(&self) -> Result<()> {
        if !self
            .representations
            .iter()
            .any(|rep| rep.name == self.evaluated)
        {
            return Err(EvolutionError::Configuration(format!(
                "Evaluated representation '{}' is not part of the response schema",
                self.evaluated
            )));
        }
        for (idx, rep) in self.representations.iter().enumerate() {
            if rep.name.trim().is_empty() {
                return Err(EvolutionError::Configuration(
                    "Representation names cannot be empty".to_string(),
                ));
            }
            if self.representations[..idx]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&rep.name))
            {
                return Err(EvolutionError::Configuration(format!(
                    "Duplicate representation '{}'",
                    rep.name
                )));
            }
        }
        Ok(())
    }

    pub fn headings(&self) -> &SectionHeadings {
        &self.headings
    }

    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    /// Name of the slot handed to the evaluator.
    pub fn evaluated(&self) -> &str {
        &self.evaluated
    }
}

/// Which idea record shape a layer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// name / rationale / definition
    Root,
    /// quote / implication / name / rationale / definition
    Continuation,
}

impl LayerKind {
    pub fn for_layer(layer: usize) -> Self {
        if layer == 0 {
            LayerKind::Root
        } else {
            LayerKind::Continuation
        }
    }
}

const ROOT_IDEA: [Field; 3] = [Field::Name, Field::Rationale, Field::Definition];
const CONTINUATION_IDEA: [Field; 5] = [
    Field::Quote,
    Field::Implication,
    Field::Name,
    Field::Rationale,
    Field::Definition,
];
const DISTILLED_IDEA: [Field; 4] = [
    Field::Rationale,
    Field::Name,
    Field::Definition,
    Field::Example,
];

/// Parses oracle responses against a [`ResponseSchema`].
#[derive(Debug, Clone)]
pub struct ResponseExtractor {
    schema: ResponseSchema,
}

impl ResponseExtractor {
    pub fn new(schema: ResponseSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ResponseSchema {
        &self.schema
    }

    /// Extracts a candidate draft from `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoSolutionFound`] when the representations section or the
    /// evaluated slot is missing.
    pub fn extract(
        &self,
        text: &str,
        kind: LayerKind,
    ) -> std::result::Result<CandidateDraft, ExtractError> {
        let tokens = tokenize(text);
        let headings = &self.schema.headings;

        let solutions_at = find_section(&tokens, &headings.representations).ok_or_else(|| {
            ExtractError::NoSolutionFound(format!(
                "missing '{}' section",
                headings.representations
            ))
        })?;

        let preamble = &tokens[..solutions_at];
        let ideas = find_section(preamble, &headings.ideas)
            .map(|at| parse_ideas(section_body(preamble, at), kind))
            .unwrap_or_default();
        let rationale = find_section(preamble, &headings.rationale)
            .map(|at| join_body(section_body(preamble, at)))
            .unwrap_or_default();

        let representations = self.extract_representations(&tokens[solutions_at + 1..]);
        if !representations.contains_key(&self.schema.evaluated) {
            return Err(ExtractError::NoSolutionFound(format!(
                "missing '{}' representation",
                self.schema.evaluated
            )));
        }

        Ok(CandidateDraft {
            ideas,
            rationale,
            representations,
        })
    }

    /// Extracts distilled ideas from a distillation response.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoSolutionFound`] when the distilled-ideas section is missing.
    pub fn extract_distilled(
        &self,
        text: &str,
    ) -> std::result::Result<Vec<InspirationRecord>, ExtractError> {
        let tokens = tokenize(text);
        let at = find_section(&tokens, &self.schema.headings.distilled).ok_or_else(|| {
            ExtractError::NoSolutionFound(format!(
                "missing '{}' section",
                self.schema.headings.distilled
            ))
        })?;

        let lines = body_lines(section_body(&tokens, at));
        let records = assemble_records(lines, &DISTILLED_IDEA, true)
            .into_iter()
            .map(|mut fields| {
                let example = fields.pop().unwrap_or_default();
                let definition = fields.pop().unwrap_or_default();
                let name = fields.pop().unwrap_or_default();
                InspirationRecord::new(name, definition, example)
            })
            .collect();
        Ok(records)
    }

    fn extract_representations(&self, tokens: &[Token<'_>]) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        for rep in &self.schema.representations {
            let hit = tokens.iter().enumerate().find_map(|(idx, token)| match token {
                Token::Heading { level: 3, title } => {
                    slot_heading(title, &rep.name).map(|inline| (idx, inline))
                }
                _ => None,
            });
            let Some((idx, inline)) = hit else {
                continue;
            };

            let mut lines: Vec<&str> = Vec::new();
            if !inline.is_empty() {
                lines.push(inline);
            }
            // a slot runs until the next slot or section heading
            lines.extend(tokens[idx + 1..].iter().map_while(|token| match token {
                Token::Body(line) => Some(*line),
                Token::Heading { .. } => None,
            }));

            if let Some(content) = slot_content(&lines) {
                found.insert(rep.name.clone(), content);
            }
        }
        found
    }
}

/// Position of the first level-2 heading titled `keyword`.
fn find_section(tokens: &[Token<'_>], keyword: &str) -> Option<usize> {
    tokens.iter().position(|token| {
        matches!(token, Token::Heading { level: 2, title } if title_matches(title, keyword))
    })
}

/// Tokens after the heading at `at`, up to the next heading of the same or higher rank.
fn section_body<'t, 'a>(tokens: &'t [Token<'a>], at: usize) -> &'t [Token<'a>] {
    let level = match tokens[at] {
        Token::Heading { level, .. } => level,
        Token::Body(_) => return &[],
    };
    let rest = &tokens[at + 1..];
    let end = rest
        .iter()
        .position(|token| matches!(token, Token::Heading { level: l, .. } if *l <= level))
        .unwrap_or(rest.len());
    &rest[..end]
}

fn body_lines<'t, 'a>(tokens: &'t [Token<'a>]) -> impl Iterator<Item = &'a str> + 't {
    tokens.iter().map(|token| match token {
        Token::Body(line) => *line,
        // nested headings such as "### Idea 1" act as record separators
        Token::Heading { .. } => "---",
    })
}

fn join_body(tokens: &[Token<'_>]) -> String {
    tokens
        .iter()
        .filter_map(|token| match token {
            Token::Body(line) => Some(*line),
            Token::Heading { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn parse_ideas(tokens: &[Token<'_>], kind: LayerKind) -> Vec<Idea> {
    let sequence: &[Field] = match kind {
        LayerKind::Root => &ROOT_IDEA,
        LayerKind::Continuation => &CONTINUATION_IDEA,
    };
    assemble_records(body_lines(tokens), sequence, false)
        .into_iter()
        .filter_map(|fields| match kind {
            LayerKind::Root => {
                let [name, rationale, definition]: [String; 3] = fields.try_into().ok()?;
                Some(Idea::new(name, rationale, definition))
            }
            LayerKind::Continuation => {
                let [quote, implication, name, rationale, definition]: [String; 5] =
                    fields.try_into().ok()?;
                Some(Idea::new(name, rationale, definition).with_citation(quote, implication))
            }
        })
        .collect()
}

/// Matches a level-3 heading against a slot name, returning any content that follows
/// the name on the heading line itself.
fn slot_heading<'a>(title: &'a str, slot: &str) -> Option<&'a str> {
    let prefix = title.get(..slot.len())?;
    if !prefix.eq_ignore_ascii_case(slot) {
        return None;
    }
    let rest = title[slot.len()..].trim_start();
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix(':').map(str::trim)
}

/// The content of one representation slot, unwrapping a fenced block when present.
fn slot_content(lines: &[&str]) -> Option<String> {
    let text = lines.join("\n");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with("```") {
        return Some(trimmed.to_string());
    }

    let mut inner = trimmed.lines();
    // opening fence with optional language tag
    let opening = inner.next()?;
    if opening.trim_start_matches('`').contains('`') {
        return None;
    }
    let body: Vec<&str> = inner.take_while(|line| !line.trim_start().starts_with("```")).collect();
    let content = body.join("\n").trim().to_string();
    (!content.is_empty()).then_some(content)
}

/// Outcome of [`request_until_valid`].
#[derive(Debug, Clone)]
pub enum Attempt<T> {
    Parsed {
        value: T,
        raw: String,
        attempts: usize,
    },
    Exhausted {
        last_raw: String,
        last_error: ExtractError,
        attempts: usize,
    },
}

/// Queries `oracle` until `parse` accepts the response, at most `max_attempts` times.
///
/// Attempts run sequentially. Transport failures are returned immediately as errors;
/// parse failures are retried and reported through [`Attempt::Exhausted`].
pub fn request_until_valid<T, F>(
    oracle: &dyn Oracle,
    messages: &[Message],
    max_attempts: usize,
    mut parse: F,
) -> Result<Attempt<T>>
where
    F: FnMut(&str) -> std::result::Result<T, ExtractError>,
{
    let max_attempts = max_attempts.max(1);
    let mut last = None;

    for attempt in 1..=max_attempts {
        let raw = oracle.complete(messages)?;
        match parse(&raw) {
            Ok(value) => {
                debug!(attempt, "oracle response parsed");
                return Ok(Attempt::Parsed {
                    value,
                    raw,
                    attempts: attempt,
                });
            }
            Err(err) => {
                debug!(attempt, max_attempts, error = %err, "oracle response rejected");
                last = Some((raw, err));
            }
        }
    }

    let (last_raw, last_error) = last.unwrap_or_else(|| {
        (
            String::new(),
            ExtractError::NoSolutionFound("no attempt made".to_string()),
        )
    });
    warn!(max_attempts, error = %last_error, "giving up on oracle response");
    Ok(Attempt::Exhausted {
        last_raw,
        last_error,
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ResponseSchema {
        ResponseSchema::new(
            vec![
                Representation::new("Natural Language English", "Verbal description."),
                Representation::new("Python Code", "Runnable python code."),
            ],
            "Python Code",
        )
        .unwrap()
    }

    #[test]
    fn test_schema_requires_evaluated_slot() {
        let result = ResponseSchema::new(vec![Representation::new("Math", "LaTeX")], "Python Code");
        assert!(matches!(result, Err(EvolutionError::Configuration(_))));
    }

    #[test]
    fn test_schema_rejects_duplicate_slots() {
        let result = ResponseSchema::new(
            vec![Representation::new("Code", "a"), Representation::new("code", "b")],
            "Code",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_inline_slot_content_on_heading_line() {
        let extractor = ResponseExtractor::new(schema());
        let draft = extractor
            .extract("## Solutions\n### Python Code: return x\n", LayerKind::Root)
            .unwrap();
        assert_eq!(draft.representations["Python Code"], "return x");
        assert!(draft.ideas.is_empty());
        assert_eq!(draft.rationale, "");
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let extractor = ResponseExtractor::new(schema());
        let draft = extractor
            .extract(
                "## Solutions\n### Python Code\n```python\ndef f(x):\n    return x\n",
                LayerKind::Root,
            )
            .unwrap();
        assert_eq!(
            draft.representations["Python Code"],
            "def f(x):\n    return x"
        );
    }

    #[test]
    fn test_continuation_ideas_need_citations() {
        let extractor = ResponseExtractor::new(schema());
        let text = "## Ideas\n- Name: a\n- Reasoning: r\n- Definition: d\n## Thoughts\nt\n## Solutions\n### Python Code\nx = 1\n";

        let root = extractor.extract(text, LayerKind::Root).unwrap();
        assert_eq!(root.ideas.len(), 1);

        let continuation = extractor.extract(text, LayerKind::Continuation).unwrap();
        assert!(continuation.ideas.is_empty());
    }

    #[test]
    fn test_distilled_section_required() {
        let extractor = ResponseExtractor::new(schema());
        assert!(extractor.extract_distilled("## Analysis\nnothing").is_err());

        let records = extractor
            .extract_distilled(
                "## New Ideas\n- Idea 1:\n  - Reasoning: r\n  - Name: Log damping\n  - Definition: d\n  - Example: y = a*log(x)\n## Analysis\n...",
            )
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Log damping");
        assert_eq!(records[0].example, "y = a*log(x)");
    }
}
