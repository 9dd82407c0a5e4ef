//! Line scanner for oracle responses.
//!
//! Responses are split into a flat stream of [`Token`]s: markdown headings and body
//! lines. Only `## ` sections and `### ` slots count as headings. A `# comment` in an
//! unfenced listing stays body, and lines inside fenced code blocks are always body.

/// One scanned line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// A level 2 or 3 heading.
    Heading { level: usize, title: &'a str },
    Body(&'a str),
}

/// Level and title of a `## ` or `### ` heading line.
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if !(2..=3).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level, rest.trim()))
}

/// Splits `text` into heading and body tokens.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            tokens.push(Token::Body(line));
            continue;
        }
        match heading(trimmed) {
            Some((level, title)) if !in_fence => tokens.push(Token::Heading { level, title }),
            _ => tokens.push(Token::Body(line)),
        }
    }

    tokens
}

/// Normalizes a heading title for comparison: case, trailing colons and a plural `s`
/// are ignored.
pub fn normalize_title(title: &str) -> String {
    let lowered = title
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_')
        .trim_end_matches(':')
        .trim()
        .to_lowercase();
    match lowered.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lowered,
    }
}

/// Whether a heading `title` names the section `keyword`.
pub fn title_matches(title: &str, keyword: &str) -> bool {
    normalize_title(title) == normalize_title(keyword)
}

/// A labelled field line inside an ideas block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Rationale,
    Definition,
    Quote,
    Implication,
    Example,
}

impl Field {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "name" => Some(Field::Name),
            "reasoning" | "reasonings" | "reason" | "reasons" | "rationale" | "rationales" => {
                Some(Field::Rationale)
            }
            "definition" | "definitions" => Some(Field::Definition),
            "quote" | "quotes" | "citation" | "citations" => Some(Field::Quote),
            "implication" | "implications" => Some(Field::Implication),
            "example" | "examples" => Some(Field::Example),
            _ => None,
        }
    }
}

/// Classification of a body line inside an ideas block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Field(Field, &'a str),
    /// An `Idea 3:` style header or a horizontal rule.
    Separator,
    Text(&'a str),
    Blank,
}

fn strip_list_marker(line: &str) -> &str {
    let line =
        line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '*' | '+' | '#'));
    // numbered markers such as "1." or "2)"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
    }
    line
}

/// Classifies one body line.
pub fn classify(line: &str) -> Line<'_> {
    let raw = line.trim();
    if raw.is_empty() {
        return Line::Blank;
    }
    if raw.chars().all(|c| c == '-' || c == '=' || c == '*') {
        return Line::Separator;
    }

    let stripped = strip_list_marker(raw);
    if let Some((key, value)) = stripped.split_once(':') {
        let key = key
            .trim()
            .trim_matches(|c: char| c == '*' || c == '_')
            .trim()
            .to_lowercase();
        if let Some(field) = Field::from_key(&key) {
            let value = value
                .trim_start_matches(|c: char| c == '*' || c == '_')
                .trim();
            return Line::Field(field, value);
        }
    }

    let lowered = stripped
        .trim_start_matches(|c: char| c == '*' || c == '_')
        .to_lowercase();
    if lowered.starts_with("idea") || lowered.starts_with("new idea") {
        return Line::Separator;
    }

    Line::Text(raw)
}

fn close(current: &mut Vec<String>, open: &mut bool, records: &mut Vec<Vec<String>>) {
    if *open {
        let mut record = std::mem::take(current);
        if let Some(last) = record.last_mut() {
            *last = last.trim().trim_end_matches('-').trim().to_string();
        }
        records.push(record);
        *open = false;
    }
}

/// Assembles ordered field records out of classified lines.
///
/// `sequence` lists the fields of one record in the order they must appear. Out-of-order
/// fields are skipped, and a repeat of the first field restarts the record. When
/// `open_last` is set the last field keeps absorbing plain text lines until a separator or
/// another field shows up.
pub fn assemble_records<'a, I>(lines: I, sequence: &[Field], open_last: bool) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut records = Vec::new();
    let mut current: Vec<String> = Vec::with_capacity(sequence.len());
    let mut open = false;

    for line in lines {
        match classify(line) {
            Line::Field(field, value) => {
                close(&mut current, &mut open, &mut records);
                let expected = sequence[current.len()];
                if field == expected {
                    current.push(value.to_string());
                } else if field == sequence[0] {
                    current.clear();
                    current.push(value.to_string());
                } else {
                    continue;
                }
                if current.len() == sequence.len() {
                    if open_last {
                        open = true;
                    } else {
                        records.push(std::mem::take(&mut current));
                    }
                }
            }
            Line::Separator => close(&mut current, &mut open, &mut records),
            Line::Text(text) => {
                if open {
                    if let Some(last) = current.last_mut() {
                        if !last.is_empty() {
                            last.push('\n');
                        }
                        last.push_str(text);
                    }
                }
            }
            Line::Blank => {}
        }
    }
    close(&mut current, &mut open, &mut records);

    records
}
