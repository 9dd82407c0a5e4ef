use lineage::{
    extract::{ExtractError, LayerKind, Representation, ResponseExtractor, ResponseSchema},
    inspiration::InspirationRecord,
    prompt::{DefaultPromptBuilder, PromptBuilder, PromptContext},
};

fn schema() -> ResponseSchema {
    ResponseSchema::new(
        vec![
            Representation::new("Natural Language English", "Verbal description."),
            Representation::new("Math Formula", "LaTeX formula."),
            Representation::new("Python Code", "Runnable python code."),
        ],
        "Python Code",
    )
    .unwrap()
}

const ROOT_RESPONSE: &str = r#"## Ideas
- Idea 1:
  - Name: Power law
  - Reasoning: growth slows down over time
  - Definition: y = a * x^b
- Idea 2:
  - Name: Offset
  - Reasoning: data does not start at zero
  - Definition: add a constant term

## Thoughts
Combine both ideas into one model.

## Solutions
### Natural Language English
A power law with an offset.
### Math Formula
$y = a x^b + c$
### Python Code
```python
def model(x, a, b, c):
    return a * x ** b + c
```
"#;

#[test]
fn test_full_root_response() {
    let extractor = ResponseExtractor::new(schema());
    let draft = extractor.extract(ROOT_RESPONSE, LayerKind::Root).unwrap();

    assert_eq!(draft.ideas.len(), 2);
    assert_eq!(draft.ideas[0].name, "Power law");
    assert_eq!(draft.ideas[1].definition, "add a constant term");
    assert_eq!(draft.rationale, "Combine both ideas into one model.");
    assert_eq!(draft.representations["Math Formula"], "$y = a x^b + c$");
    assert_eq!(
        draft.representations["Python Code"],
        "def model(x, a, b, c):\n    return a * x ** b + c"
    );
}

#[test]
fn test_continuation_ideas_carry_citations() {
    let text = r#"## Ideas
- Idea 1:
  - Quote: "the residuals grow with x"
  - Implication: the error is multiplicative
  - Name: Log scale
  - Reasoning: fit in log space
  - Definition: log(y) = log(a) + b log(x)
## Thoughts
Switch to a log-space fit.
## Solutions
### Python Code
import numpy as np
"#;
    let extractor = ResponseExtractor::new(schema());
    let draft = extractor.extract(text, LayerKind::Continuation).unwrap();

    assert_eq!(draft.ideas.len(), 1);
    let idea = &draft.ideas[0];
    assert_eq!(idea.name, "Log scale");
    assert_eq!(idea.quote.as_deref(), Some("\"the residuals grow with x\""));
    assert_eq!(idea.implication.as_deref(), Some("the error is multiplicative"));
    assert_eq!(draft.representations["Python Code"], "import numpy as np");
}

#[test]
fn test_unfenced_slot_keeps_comment_lines() {
    let text = "## Solutions\n### Python Code\nimport numpy as np\n# fit parameters\ndef model(x, a):\n    return a * x\n";
    let extractor = ResponseExtractor::new(schema());
    let draft = extractor.extract(text, LayerKind::Root).unwrap();

    let code = &draft.representations["Python Code"];
    assert!(code.contains("# fit parameters"));
    assert!(code.contains("def model"));
    assert!(code.ends_with("return a * x"));
}

#[test]
fn test_comment_lines_do_not_end_sections() {
    let text = r#"## Thoughts
Keep the offset.
# the slope is fitted separately
Then add the power term.
## Solutions
### Math Formula
$y = a x + c$
### Python Code
def model(x, a, c):
    # linear part
    return a * x + c
#### unused appendix
### Natural Language English
A line.
"#;
    let extractor = ResponseExtractor::new(schema());
    let draft = extractor.extract(text, LayerKind::Root).unwrap();

    assert!(draft.rationale.ends_with("Then add the power term."));
    assert!(draft.rationale.contains("# the slope is fitted separately"));
    let code = &draft.representations["Python Code"];
    assert!(code.contains("return a * x + c"));
    assert!(code.ends_with("#### unused appendix"));
    assert_eq!(draft.representations["Math Formula"], "$y = a x + c$");
    assert_eq!(draft.representations["Natural Language English"], "A line.");
}

#[test]
fn test_missing_evaluated_slot_is_no_solution() {
    let text = ROOT_RESPONSE.replace("### Python Code", "### Pseudo Code");
    let extractor = ResponseExtractor::new(schema());

    let err = extractor.extract(&text, LayerKind::Root).unwrap_err();
    assert!(matches!(err, ExtractError::NoSolutionFound(_)));
}

#[test]
fn test_missing_solutions_section_is_no_solution() {
    let extractor = ResponseExtractor::new(schema());
    let err = extractor
        .extract("## Ideas\n- Idea 1:\n  - Name: x\n", LayerKind::Root)
        .unwrap_err();
    assert!(matches!(err, ExtractError::NoSolutionFound(_)));
}

#[test]
fn test_optional_sections_degrade_to_empty() {
    let extractor = ResponseExtractor::new(schema());
    let draft = extractor
        .extract("## Solutions\n### Python Code\nreturn 1\n", LayerKind::Root)
        .unwrap();

    assert!(draft.ideas.is_empty());
    assert!(draft.rationale.is_empty());
    assert_eq!(draft.representations.len(), 1);
}

#[test]
fn test_prompt_format_matches_extractor_headings() {
    let schema = schema();
    let inspirations = vec![InspirationRecord::new(
        "Saturation",
        "growth approaches a ceiling",
        "a * (1 - exp(-b x))",
    )];
    let ctx = PromptContext {
        task: "Fit the curve.",
        schema: &schema,
        ideas_requested: 3,
        inspirations: &inspirations,
    };

    let messages = DefaultPromptBuilder::new().initial(&ctx);
    let body = &messages.last().unwrap().content;

    assert!(body.starts_with("Fit the curve."));
    assert!(body.contains("## Ideas"));
    assert!(body.contains("## Thoughts"));
    assert!(body.contains("## Solutions"));
    assert!(body.contains("### Python Code"));
    assert!(body.contains("Saturation"));
}
