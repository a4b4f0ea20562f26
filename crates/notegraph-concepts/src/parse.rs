//! Concept list parsing for LLM responses.
//!
//! Models return truncated, fenced or chatty JSON often enough that strict
//! parsing alone loses good concepts. Parsing runs in tiers:
//!
//! 1. **Strict**: the whole response (minus `<think>` blocks) is valid JSON.
//! 2. **Repaired**: fences and prose are dropped, the outermost JSON span is
//!    cut out, a value cut off mid-string is dropped, open brackets are
//!    closed, and trailing commas are removed.
//! 3. **Fragments**: each flat `{...}` object is parsed on its own, then a
//!    field-level regex picks up `name`/`confidence` pairs.
//!
//! When all tiers fail the result is empty. Parsing never errors.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use notegraph_core::{defaults, ExtractedConcept};

static THINK_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*").unwrap());
static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());
static FLAT_OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^{}]*\}").unwrap());
static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""(?:name|concept)"\s*:\s*"((?:[^"\\]|\\.)*)"\s*,\s*"confidence"\s*:\s*"?(-?\d*\.?\d+)"?(?:\s*,\s*"reason"\s*:\s*"((?:[^"\\]|\\.)*)")?"#,
    )
    .unwrap()
});

/// Which parsing tier produced the concepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    Strict,
    Repaired,
    Fragments,
    /// Nothing usable was found.
    Empty,
}

impl fmt::Display for ParseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Repaired => write!(f, "repaired"),
            Self::Fragments => write!(f, "fragments"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

/// Concepts recovered from a response, with the tier that recovered them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedConcepts {
    pub concepts: Vec<ExtractedConcept>,
    pub tier: ParseTier,
}

impl ParsedConcepts {
    fn new(concepts: Vec<ExtractedConcept>, tier: ParseTier) -> Self {
        Self { concepts, tier }
    }
}

/// Parse a concept list out of a raw model response.
pub fn parse_concepts(raw: &str) -> ParsedConcepts {
    let cleaned = strip_thinking(raw);
    let text = cleaned.trim();

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(concepts) = concepts_from_value(&value) {
            return ParsedConcepts::new(concepts, ParseTier::Strict);
        }
    }

    if let Some(concepts) = repair_json(text).as_ref().and_then(concepts_from_value) {
        return ParsedConcepts::new(concepts, ParseTier::Repaired);
    }

    let concepts = parse_fragments(text);
    if concepts.is_empty() {
        ParsedConcepts::new(concepts, ParseTier::Empty)
    } else {
        ParsedConcepts::new(concepts, ParseTier::Fragments)
    }
}

/// Remove `<think>...</think>` reasoning blocks. A closing tag without an
/// opening one (some models omit it) drops everything before it.
pub fn strip_thinking(raw: &str) -> String {
    let text = THINK_BLOCK_RE.replace_all(raw, "");
    match text.rfind("</think>") {
        Some(pos) => text[pos + "</think>".len()..].to_string(),
        None => text.into_owned(),
    }
}

/// Attempt to turn damaged JSON into a parseable value.
///
/// Two candidates are tried: the span up to the last closing brace (drops a
/// truncated trailing item), then the full remainder with any cut-off string
/// dropped and containers closed.
pub fn repair_json(text: &str) -> Option<Value> {
    let text = CODE_FENCE_RE.replace_all(text, "");
    let trimmed = text.trim_start();
    let start = if trimmed.starts_with('[') {
        text.find('[')?
    } else {
        text.find('{').or_else(|| text.find('['))?
    };
    let body = &text[start..];

    let cut = body
        .rfind(['}', ']'])
        .map(|end| &body[..=end])
        .filter(|span| !span.is_empty());
    if let Some(value) = cut.and_then(|span| reparse(&close_open_structures(span))) {
        return Some(value);
    }
    reparse(&close_open_structures(body))
}

fn reparse(candidate: &str) -> Option<Value> {
    let cleaned = TRAILING_COMMA_RE.replace_all(candidate, "$1");
    serde_json::from_str(&cleaned).ok()
}

/// Make truncated JSON parseable without inventing content.
///
/// A string cut off before its closing quote is dropped along with whatever
/// it belonged to: a dangling `,`, or a `"key":` whose value never arrived.
/// Open containers are then closed.
fn close_open_structures(text: &str) -> String {
    let (_, open_string) = scan_structure(text);
    let mut out = match open_string {
        Some(start) => text[..start].to_string(),
        None => text.to_string(),
    };
    drop_dangling_tail(&mut out);

    let (closers, _) = scan_structure(&out);
    out.extend(closers.iter().rev());
    out
}

/// Closers still owed by `text`, and the byte offset of the opening quote
/// of a string left unterminated at the end.
fn scan_structure(text: &str) -> (Vec<char>, Option<usize>) {
    let mut closers = Vec::new();
    let mut open_string = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if open_string.is_some() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                open_string = None;
            }
            continue;
        }
        match c {
            '"' => open_string = Some(i),
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.last() == Some(&c) {
                    closers.pop();
                }
            }
            _ => {}
        }
    }
    (closers, open_string)
}

fn drop_dangling_tail(out: &mut String) {
    loop {
        let len = out.trim_end().len();
        out.truncate(len);
        if out.ends_with(',') {
            out.pop();
        } else if out.ends_with(':') {
            out.pop();
            let len = out.trim_end().len();
            out.truncate(len);
            pop_trailing_string(out);
        } else {
            break;
        }
    }
}

/// Remove a complete `"..."` literal from the end of `out`.
fn pop_trailing_string(out: &mut String) {
    let bytes = out.as_bytes();
    if bytes.len() < 2 || bytes[bytes.len() - 1] != b'"' {
        return;
    }
    let opening = (0..bytes.len() - 1).rev().find(|&i| {
        let backslashes = bytes[..i].iter().rev().take_while(|&&b| b == b'\\').count();
        bytes[i] == b'"' && backslashes % 2 == 0
    });
    if let Some(i) = opening {
        out.truncate(i);
    }
}

/// Tier three: salvage individual concept objects from text that does not
/// parse as a whole.
fn parse_fragments(text: &str) -> Vec<ExtractedConcept> {
    let from_objects: Vec<ExtractedConcept> = FLAT_OBJECT_RE
        .find_iter(text)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter_map(|v| concept_from_item(&v))
        .collect();
    if !from_objects.is_empty() {
        return from_objects;
    }

    FIELD_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let name = unescape(caps.get(1)?.as_str());
            let confidence = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<f32>().ok())
                .unwrap_or(defaults::DEFAULT_CONCEPT_CONFIDENCE);
            let reason = caps.get(3).map(|m| unescape(m.as_str())).unwrap_or_default();
            let name = name.trim();
            (!name.is_empty()).then(|| ExtractedConcept::new(name, confidence, reason))
        })
        .collect()
}

fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

/// Accepted shapes: `{"concepts": [...]}`, a bare array, or an object with
/// some other array-valued field.
fn concepts_from_value(value: &Value) -> Option<Vec<ExtractedConcept>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("concepts") {
            Some(Value::Array(items)) => items,
            _ => map.values().find_map(Value::as_array)?,
        },
        _ => return None,
    };
    Some(items.iter().filter_map(concept_from_item).collect())
}

fn concept_from_item(item: &Value) -> Option<ExtractedConcept> {
    match item {
        Value::String(name) => {
            let name = name.trim();
            (!name.is_empty())
                .then(|| ExtractedConcept::new(name, defaults::DEFAULT_CONCEPT_CONFIDENCE, ""))
        }
        Value::Object(map) => {
            let name = ["name", "concept", "term"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))?
                .trim();
            if name.is_empty() {
                return None;
            }
            let confidence = match map.get("confidence") {
                Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
                Some(Value::String(s)) => s.trim().parse::<f32>().ok(),
                _ => None,
            }
            .filter(|c| c.is_finite())
            .unwrap_or(defaults::DEFAULT_CONCEPT_CONFIDENCE);
            let reason = map
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(ExtractedConcept::new(name, confidence, reason))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(parsed: &ParsedConcepts) -> Vec<&str> {
        parsed.concepts.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_strict_object_shape() {
        let raw = r#"{"concepts":[{"name":"Idempotency","confidence":0.9,"reason":"retries"}]}"#;
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert_eq!(names(&parsed), vec!["Idempotency"]);
        assert_eq!(parsed.concepts[0].reason, "retries");
    }

    #[test]
    fn test_strict_bare_array_of_strings() {
        let parsed = parse_concepts(r#"["Event Sourcing", "CQRS"]"#);
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert_eq!(names(&parsed), vec!["Event Sourcing", "CQRS"]);
        assert_eq!(
            parsed.concepts[0].confidence,
            defaults::DEFAULT_CONCEPT_CONFIDENCE
        );
    }

    #[test]
    fn test_strict_other_array_field_and_concept_key() {
        let parsed = parse_concepts(r#"{"topics":[{"concept":"Backpressure","confidence":"0.8"}]}"#);
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert_eq!(names(&parsed), vec!["Backpressure"]);
        assert!((parsed.concepts[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_strict_empty_list() {
        let parsed = parse_concepts(r#"{"concepts":[]}"#);
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert!(parsed.concepts.is_empty());
    }

    #[test]
    fn test_confidence_clamped() {
        let parsed = parse_concepts(r#"[{"name":"A1","confidence":3.5},{"name":"B1","confidence":-1}]"#);
        assert_eq!(parsed.concepts[0].confidence, 1.0);
        assert_eq!(parsed.concepts[1].confidence, 0.0);
    }

    #[test]
    fn test_think_block_removed() {
        let raw = "<think>the user wants concepts {oops</think>\n{\"concepts\":[\"Raft\"]}";
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Strict);
        assert_eq!(names(&parsed), vec!["Raft"]);
    }

    #[test]
    fn test_dangling_close_think_tag() {
        let parsed = parse_concepts("reasoning here</think>[\"Raft\"]");
        assert_eq!(names(&parsed), vec!["Raft"]);
    }

    #[test]
    fn test_fenced_json_with_prose_is_repaired() {
        let raw = "Here are the concepts:\n```json\n{\"concepts\":[{\"name\":\"Consensus\",\"confidence\":0.9}]}\n```\nHope this helps!";
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Repaired);
        assert_eq!(names(&parsed), vec!["Consensus"]);
    }

    #[test]
    fn test_truncated_mid_item_keeps_complete_items() {
        let raw = r#"{"concepts":[{"name":"Idempotency","confidence":0.9,"reason":"retries are safe"},{"name":"Message Queue","confidence":0.8,"reason":"Kafka deli"#;
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Repaired);
        assert_eq!(names(&parsed), vec!["Idempotency"]);
    }

    #[test]
    fn test_truncated_after_colon() {
        let raw = r#"{"concepts":[{"name":"Idempotency","confidence":"#;
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Repaired);
        assert_eq!(names(&parsed), vec!["Idempotency"]);
        assert_eq!(
            parsed.concepts[0].confidence,
            defaults::DEFAULT_CONCEPT_CONFIDENCE
        );
    }

    #[test]
    fn test_trailing_commas_removed() {
        let raw = r#"Result: {"concepts":[{"name":"Sharding","confidence":0.7,},],}"#;
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Repaired);
        assert_eq!(names(&parsed), vec!["Sharding"]);
    }

    #[test]
    fn test_fragments_from_broken_outer_structure() {
        let raw = r#"concepts: {"name":"Gossip Protocol","confidence":0.8} and also {"name":"Vector Clock","confidence":0.75} }}"#;
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Fragments);
        assert_eq!(names(&parsed), vec!["Gossip Protocol", "Vector Clock"]);
    }

    #[test]
    fn test_field_regex_last_resort() {
        let raw = r#"name list => "name": "Quorum", "confidence": 0.85, "reason": "majority" ; "name": "Lease", "confidence": "0.7""#;
        let parsed = parse_concepts(raw);
        assert_eq!(parsed.tier, ParseTier::Fragments);
        assert_eq!(names(&parsed), vec!["Quorum", "Lease"]);
        assert_eq!(parsed.concepts[0].reason, "majority");
    }

    #[test]
    fn test_garbage_yields_empty() {
        let parsed = parse_concepts("I could not find any concepts in this note.");
        assert_eq!(parsed.tier, ParseTier::Empty);
        assert!(parsed.concepts.is_empty());
    }

    #[test]
    fn test_cut_off_string_item_is_dropped() {
        let parsed = parse_concepts(r#"{"concepts":["Idempotency","Message Que"#);
        assert_eq!(parsed.tier, ParseTier::Repaired);
        assert_eq!(names(&parsed), vec!["Idempotency"]);
    }

    #[test]
    fn test_cut_off_name_yields_nothing() {
        let parsed = parse_concepts(r#"{"concepts":[{"name":"Idempot"#);
        assert!(parsed.concepts.is_empty());
    }

    #[test]
    fn test_cut_off_reason_keeps_complete_name() {
        let parsed =
            parse_concepts(r#"[{"name":"Backpressure","confidence":0.8,"reason":"slow consu"#);
        assert_eq!(names(&parsed), vec!["Backpressure"]);
        assert!(parsed.concepts[0].reason.is_empty());
    }

    #[test]
    fn test_close_open_structures_handles_escapes() {
        assert_eq!(
            close_open_structures(r#"{"a":"quote \" inside","b":"cut \" of"#),
            r#"{"a":"quote \" inside"}"#
        );
        assert_eq!(close_open_structures(r#"["one","tw"#), r#"["one"]"#);
        assert_eq!(close_open_structures(r#"{"a":"#), "{}");
    }
}
