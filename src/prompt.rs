//! # Prompts
//!
//! A [`PromptBuilder`] turns the task description, the lineage history and any retrieved
//! inspirations into the message list sent to the oracle. The task-specific wording is
//! owned by the caller; [`DefaultPromptBuilder`] provides a generic framing whose response
//! format matches what [`ResponseExtractor`](crate::extract::ResponseExtractor) parses.

use std::fmt::{self, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, Lineage};
use crate::extract::{ResponseSchema, SectionHeadings};
use crate::inspiration::InspirationRecord;
use crate::oracle::Message;

/// How an offspring relates to its parents. Modes differ only in prompt framing.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffspringMode {
    /// Different form from several parents, motivated by them.
    CrossoverPositive,
    /// Different form from several parents, unrelated to them.
    CrossoverNegative,
    /// A modified version of one parent.
    MutationPositive,
    /// Something entirely different from one parent.
    MutationNegative,
}

impl OffspringMode {
    pub const ALL: [OffspringMode; 4] = [
        OffspringMode::CrossoverPositive,
        OffspringMode::CrossoverNegative,
        OffspringMode::MutationPositive,
        OffspringMode::MutationNegative,
    ];

    pub fn is_crossover(&self) -> bool {
        matches!(
            self,
            OffspringMode::CrossoverPositive | OffspringMode::CrossoverNegative
        )
    }
}

impl fmt::Display for OffspringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OffspringMode::CrossoverPositive => "crossover_positive",
            OffspringMode::CrossoverNegative => "crossover_negative",
            OffspringMode::MutationPositive => "mutation_positive",
            OffspringMode::MutationNegative => "mutation_negative",
        };
        f.write_str(name)
    }
}

/// Everything a prompt may draw on besides the lineages themselves.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub task: &'a str,
    pub schema: &'a ResponseSchema,
    /// Minimum number of ideas to ask for.
    pub ideas_requested: usize,
    /// Retrieved inspirations, or the whole memory for distillation prompts.
    pub inspirations: &'a [InspirationRecord],
}

/// What a distillation prompt asks the oracle to explain.
#[derive(Debug, Clone, Copy)]
pub enum DistillSubject<'a> {
    /// A lineage whose last layer beat all its earlier layers.
    Lineage(&'a Lineage),
    /// An offspring that beat every parent it was created from.
    Offspring {
        parents: &'a [Lineage],
        offspring: &'a Lineage,
    },
}

/// Builds oracle requests.
pub trait PromptBuilder: Send + Sync {
    /// Request for the root layer of a fresh lineage.
    fn initial(&self, ctx: &PromptContext<'_>) -> Vec<Message>;

    /// Request for the next layer, given all previous layers of the lineage.
    fn continuation(&self, ctx: &PromptContext<'_>, history: &[Candidate]) -> Vec<Message>;

    /// Request for the root layer of an offspring of `parents`.
    fn offspring(
        &self,
        ctx: &PromptContext<'_>,
        mode: OffspringMode,
        parents: &[Lineage],
    ) -> Vec<Message>;

    /// Request asking why the subject improved, answered with distilled ideas.
    fn distill(&self, ctx: &PromptContext<'_>, subject: DistillSubject<'_>) -> Vec<Message>;
}

/// Generic prompt wording. The task description is inserted verbatim.
#[derive(Debug, Clone, Default)]
pub struct DefaultPromptBuilder {
    system: Option<String>,
}

impl DefaultPromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a system message to every request.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    fn messages(&self, body: String) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(body));
        messages
    }
}

const INSPIRATION_NOTE: &str = " You will be provided with some effective ideas for inspiration, which may be helpful for solving the task.";

impl PromptBuilder for DefaultPromptBuilder {
    fn initial(&self, ctx: &PromptContext<'_>) -> Vec<Message> {
        let mut body = format!("{}\n# How to Respond\n", ctx.task);
        body.push_str(
            "First brainstorm ideas, then write down your thought process for solving the task \
             using the ideas, and finally provide the solution to the task in the required formats.",
        );
        push_inspirations(&mut body, ctx.inspirations);
        push_hints(&mut body, ctx, false);
        push_response_format(&mut body, ctx.schema, false);
        self.messages(body)
    }

    fn continuation(&self, ctx: &PromptContext<'_>, history: &[Candidate]) -> Vec<Message> {
        let mut body = format!("{}\n# How to Respond\n", ctx.task);
        body.push_str(
            "First, reason about implications of the task and the previous solutions to derive \
             ideas. Then, write down your thought process for solving the task using the ideas. \
             Finally, provide the solution to the task in the required formats.",
        );
        push_inspirations(&mut body, ctx.inspirations);
        body.push_str("\nHere are the previous solutions to the task:\n");
        push_history(&mut body, ctx.schema, history);
        push_hints(&mut body, ctx, true);
        push_response_format(&mut body, ctx.schema, true);
        self.messages(body)
    }

    fn offspring(
        &self,
        ctx: &PromptContext<'_>,
        mode: OffspringMode,
        parents: &[Lineage],
    ) -> Vec<Message> {
        let mut body = format!("{}\n# How to Respond\n", ctx.task);
        body.push_str("You will be presented with some existing solutions to the task. ");
        body.push_str(match mode {
            OffspringMode::CrossoverPositive => {
                "Now create a new solution that has a totally different form from the given \
                 solutions but can be motivated by the existing ones. "
            }
            OffspringMode::CrossoverNegative => {
                "Now create a new solution that has a totally different form from the given solutions. "
            }
            OffspringMode::MutationPositive => {
                "Now create a solution in a different form that can be a modified version of the \
                 existing solution. "
            }
            OffspringMode::MutationNegative => {
                "Now create a totally different solution from the existing solution. "
            }
        });
        body.push_str(
            "First brainstorm ideas, then write down your thought process for solving the task \
             using the ideas, and finally provide the solution to the task in the required formats.",
        );
        push_inspirations(&mut body, ctx.inspirations);
        let _ = writeln!(
            body,
            "\nHere are {} existing solutions with their ideas and evaluation results:",
            parents.len()
        );
        push_solutions(&mut body, ctx.schema, parents, 0, None);
        push_hints(&mut body, ctx, false);
        push_response_format(&mut body, ctx.schema, false);
        self.messages(body)
    }

    fn distill(&self, ctx: &PromptContext<'_>, subject: DistillSubject<'_>) -> Vec<Message> {
        let mut body = String::from(
            "As a careful analyst, you will be presented with the task information and some \
             solutions to the task, each with a list of ideas and its evaluation results.\n\
             Your task is to analyze why the last solution performs best by comparing the \
             differences in the solutions' ideas, implementations and evaluation results.\n\
             You will also receive an idea pool holding all ideas summarized so far.\n",
        );
        let _ = writeln!(body, "Here is the task information:\n{}", ctx.task);
        body.push_str("Here are the previous solutions:\n");
        match subject {
            DistillSubject::Lineage(lineage) => {
                push_history(&mut body, ctx.schema, lineage.layers())
            }
            DistillSubject::Offspring { parents, offspring } => {
                push_solutions(&mut body, ctx.schema, parents, 0, None);
                push_solutions(
                    &mut body,
                    ctx.schema,
                    std::slice::from_ref(offspring),
                    parents.len(),
                    Some(parents.len()),
                );
            }
        }
        body.push_str("These are the ideas summarized so far:\n");
        push_pool(&mut body, ctx.inspirations);

        let headings = ctx.schema.headings();
        body.push_str(
            "Hints: Analyze why the last solution performs best and summarize the ideas that \
             improved the evaluation results, each as: Reasoning (why it helps solve the task or \
             improve performance), Name, Definition (brief description of the idea) and Example. \
             The example matters most for reusing the idea later, so keep it clear and concise.\n\n",
        );
        let _ = write!(
            body,
            "Response Format (Replace ...):\n\n## {}\n- Idea 1:\n  - Reasoning:...\n  - Name:...\n  \
             - Definition:...\n  - Example:...\n\n...\n\n## Analysis\n\n...\n",
            headings.distilled
        );
        self.messages(body)
    }
}

fn push_inspirations(body: &mut String, inspirations: &[InspirationRecord]) {
    if inspirations.is_empty() {
        body.push('\n');
        return;
    }
    body.push_str(INSPIRATION_NOTE);
    body.push_str("\n\nHere are some effective ideas which will help in solving the task:\n");
    push_pool(body, inspirations);
}

fn push_pool(body: &mut String, pool: &[InspirationRecord]) {
    if pool.is_empty() {
        body.push_str("(none yet)\n\n");
        return;
    }
    for (idx, record) in pool.iter().enumerate() {
        let _ = write!(
            body,
            "{}. {}:\n  Definition: {}\n  Example: {}\n\n",
            idx + 1,
            record.name,
            record.definition,
            record.example
        );
    }
}

fn push_hints(body: &mut String, ctx: &PromptContext<'_>, continuation: bool) {
    let headings: &SectionHeadings = ctx.schema.headings();
    body.push_str("\nHints:\n");
    if continuation {
        let _ = writeln!(
            body,
            "- {}: Reason about implications of the task and the previous solutions to derive at \
             least {} useful ideas. Each idea should be innovative, non-obvious and derived from the \
             previous solutions with clear reasoning and citations. Include the Quotes (directly \
             from the task or the previous solutions), Implications (your step-by-step reasoning), \
             name, definition (brief description) and reasoning for each idea.",
            headings.ideas, ctx.ideas_requested
        );
        let _ = writeln!(
            body,
            "- {}: Think step by step about solving the task using the ideas. Avoid the errors of \
             previous solutions.",
            headings.rationale
        );
    } else {
        let _ = writeln!(
            body,
            "- {}: Brainstorm at least {} potentially useful ideas for solving the task. Each idea \
             should be innovative and non-obvious. Include the name, definition (brief description) \
             and reasoning for each idea.",
            headings.ideas, ctx.ideas_requested
        );
        let _ = writeln!(
            body,
            "- {}: Think step by step about solving the task using the ideas.",
            headings.rationale
        );
    }
    let _ = writeln!(
        body,
        "- {}: Provide the solution in {} formats; [{}] will be evaluated without any edit. \
         The formats are:",
        headings.representations,
        ctx.schema.representations().len(),
        ctx.schema.evaluated()
    );
    for rep in ctx.schema.representations() {
        let _ = writeln!(body, "    [{}]: {}", rep.name, rep.description);
    }
}

fn push_response_format(body: &mut String, schema: &ResponseSchema, continuation: bool) {
    let headings = schema.headings();
    let _ = write!(body, "\nResponse Format (Replace ...):\n\n## {}\n- Idea 1:\n", headings.ideas);
    if continuation {
        body.push_str("  - Quotes:...\n  - Implications:...\n");
    }
    body.push_str("  - Name:...\n  - Reasoning:...\n  - Definition:...\n...\n\n");
    let _ = write!(body, "## {}\n...\n\n## {}\n", headings.rationale, headings.representations);
    for rep in schema.representations() {
        let _ = write!(body, "### {}:\n...\n", rep.name);
    }
}

fn push_evaluated(body: &mut String, schema: &ResponseSchema, candidate: &Candidate) {
    let content = candidate
        .representations
        .get(schema.evaluated())
        .map(String::as_str)
        .unwrap_or("(missing)");
    let _ = write!(
        body,
        "\n2. Its {}:\n{}\n\n3. Its Evaluation Results\n{}\n\n",
        schema.evaluated(),
        content,
        candidate.feedback()
    );
}

fn push_history(body: &mut String, schema: &ResponseSchema, history: &[Candidate]) {
    for (idx, layer) in history.iter().enumerate() {
        if idx == 0 {
            let _ = writeln!(body, "**Solution No.1**");
        } else {
            let _ = writeln!(
                body,
                "**Solution No.{}** (Continued from Solution No.{})",
                idx + 1,
                idx
            );
        }
        body.push_str("1. Its Ideas\n");
        for idea in &layer.ideas {
            let _ = writeln!(body, "- {}: {}", idea.name, idea.definition);
            if let (Some(quote), Some(implication)) = (&idea.quote, &idea.implication) {
                let _ = write!(body, "  Quotes: {}\n  Implications: {}\n\n", quote, implication);
            }
        }
        push_evaluated(body, schema, layer);
    }
}

/// Lists the last layer of each lineage, numbered from `offset + 1`.
fn push_solutions(
    body: &mut String,
    schema: &ResponseSchema,
    lineages: &[Lineage],
    offset: usize,
    offspring_of: Option<usize>,
) {
    for (idx, lineage) in lineages.iter().enumerate() {
        let layer = lineage.last();
        match offspring_of {
            Some(parents) => {
                let _ = writeln!(
                    body,
                    "**Solution No.{}** (Offspring of Solution No.1 - No.{})",
                    offset + idx + 1,
                    parents
                );
            }
            None => {
                let _ = writeln!(body, "**Solution No.{}**", offset + idx + 1);
            }
        }
        body.push_str("1. Its Ideas\n");
        for idea in &layer.ideas {
            let _ = writeln!(body, "- {}: {}", idea.name, idea.definition);
        }
        push_evaluated(body, schema, layer);
    }
}
