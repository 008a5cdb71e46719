//! Robust JSON extraction and repair for free-text model responses
//!
//! Model completions wrap their JSON in prose, fence it in markdown, drop
//! closing braces, or emit invalid escape sequences. Parsing runs as an
//! ordered list of strategies; the first that decodes wins:
//!
//! 1. Extraction: ```` ```json ```` fence, ```` ```JSON ```` fence, any ```` ``` ````
//!    fence, then the first-`{`-to-last-`}` span (or `[`..`]` when an array
//!    opens first), else the trimmed text itself
//! 2. Repair of the extracted copy: brace balancing, then escape repair when
//!    an invalid backslash escape is present
//! 3. Primary decode of the repaired text
//! 4. Last-resort decode of the first-`{`-to-last-`}` span of the *original* text
//!
//! The caller's text is never modified; every repair works on an owned copy.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::errors::{preview, ParseError};

/// How the JSON payload was located in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractionMethod {
    /// ```` ```json ```` fenced block
    FencedJson,
    /// ```` ```JSON ```` fenced block
    FencedJsonUpper,
    /// Any other ```` ``` ```` fenced block
    Fenced,
    /// Outermost brace (or bracket) span
    BraceSpan,
    /// No structure found, whole text used
    Raw,
}

/// A repair applied to the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Repair {
    /// Appended this many `}`
    AppendedBraces(usize),
    /// Prepended this many `{`
    PrependedBraces(usize),
    /// Invalid backslash escapes, raw control characters and raw quotes escaped
    Escapes,
}

/// Which decode attempt produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecodeStage {
    Primary,
    LastResort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
}

/// A decoded value plus a record of how it was obtained.
#[derive(Debug)]
pub struct Parsed<T> {
    pub value: T,
    pub extraction: ExtractionMethod,
    pub repairs: Vec<Repair>,
    pub stage: DecodeStage,
}

static FENCED_JSON_REGEX: OnceLock<Regex> = OnceLock::new();
static FENCED_JSON_UPPER_REGEX: OnceLock<Regex> = OnceLock::new();
static FENCED_ANY_REGEX: OnceLock<Regex> = OnceLock::new();

fn fenced_json_regex() -> &'static Regex {
    FENCED_JSON_REGEX.get_or_init(|| {
        Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("Invalid json fence regex")
    })
}

fn fenced_json_upper_regex() -> &'static Regex {
    FENCED_JSON_UPPER_REGEX.get_or_init(|| {
        Regex::new(r"```JSON\s*([\s\S]*?)\s*```").expect("Invalid JSON fence regex")
    })
}

fn fenced_any_regex() -> &'static Regex {
    FENCED_ANY_REGEX
        .get_or_init(|| Regex::new(r"```\s*([\s\S]*?)\s*```").expect("Invalid fence regex"))
}

/// Parse a model response into `T`.
pub fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    parse_response_detailed(text).map(|parsed| parsed.value)
}

/// Same as [`parse_response`] for a possibly-missing response.
pub fn parse_optional<T: DeserializeOwned>(text: Option<&str>) -> Result<T, ParseError> {
    match text {
        Some(t) => parse_response(t),
        None => Err(ParseError::EmptyInput),
    }
}

/// Parse and report which extraction, repairs and decode stage succeeded.
pub fn parse_response_detailed<T: DeserializeOwned>(text: &str) -> Result<Parsed<T>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let extraction = extract_payload(text);
    let (repaired, repairs) = repair(&extraction.text);
    debug!(
        "Extracted response payload via {:?} ({} chars, repairs: {:?})",
        extraction.method,
        repaired.len(),
        repairs
    );

    let attempts: [(DecodeStage, Option<&str>); 2] = [
        (DecodeStage::Primary, Some(repaired.as_str())),
        (DecodeStage::LastResort, outer_object_span(text)),
    ];

    let mut first_error: Option<serde_json::Error> = None;
    let mut tried = 0;
    for (stage, candidate) in attempts {
        let Some(candidate) = candidate else {
            continue;
        };
        tried += 1;
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => {
                if stage == DecodeStage::LastResort {
                    warn!("Primary decode failed, recovered response from raw object span");
                }
                return Ok(Parsed {
                    value,
                    extraction: extraction.method,
                    repairs,
                    stage,
                });
            }
            Err(e) => {
                debug!("Decode attempt {:?} failed: {}", stage, e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(source) => Err(ParseError::Unrecoverable {
            attempts: tried,
            source,
            preview: preview(&repaired),
        }),
        // The primary attempt always runs, so an error is always recorded.
        None => Err(ParseError::EmptyInput),
    }
}

/// Locate the JSON payload in `text` (first strategy that matches wins).
pub fn extract_payload(text: &str) -> Extraction {
    let fences: [(fn() -> &'static Regex, ExtractionMethod); 3] = [
        (fenced_json_regex, ExtractionMethod::FencedJson),
        (fenced_json_upper_regex, ExtractionMethod::FencedJsonUpper),
        (fenced_any_regex, ExtractionMethod::Fenced),
    ];

    for (regex, method) in fences {
        if let Some(cap) = regex().captures(text) {
            return Extraction {
                text: cap[1].to_string(),
                method,
            };
        }
    }

    if let Some(span) = outer_span(text) {
        return Extraction {
            text: span.to_string(),
            method: ExtractionMethod::BraceSpan,
        };
    }

    Extraction {
        text: text.trim().to_string(),
        method: ExtractionMethod::Raw,
    }
}

/// First `{` through last `}`.
fn outer_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Like [`outer_object_span`], but takes the `[`..`]` span when an array
/// opens first and encloses the first `{` (or there is no object at all).
/// A bracketed aside such as `[1]` ahead of the object is skipped.
fn outer_span(text: &str) -> Option<&str> {
    let brace = text.find('{');
    if let Some(b) = text.find('[') {
        let end = matching_bracket(text, b).or_else(|| text.rfind(']'));
        if let Some(end) = end {
            let encloses = brace.map_or(true, |o| b < o && end > o);
            if encloses && end > b {
                return Some(&text[b..=end]);
            }
        }
    }
    outer_object_span(text)
}

/// Byte offset of the `]` closing the `[` at `open`, counting naively.
fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Apply brace balancing and escape repair to a copy of `text`.
pub fn repair(text: &str) -> (String, Vec<Repair>) {
    let mut repairs = Vec::new();
    let mut out = balance_braces(text, &mut repairs);

    if has_invalid_escape(&out) {
        out = repair_escapes(&out);
        repairs.push(Repair::Escapes);
    }

    (out, repairs)
}

/// Count `{` against `}` and pad the short side.
///
/// Counting is naive (braces inside strings count too); this is a
/// best-effort nudge before decoding, not a validator.
fn balance_braces(text: &str, repairs: &mut Vec<Repair>) -> String {
    let opens = text.matches('{').count();
    let closes = text.matches('}').count();

    if opens > closes {
        let missing = opens - closes;
        repairs.push(Repair::AppendedBraces(missing));
        format!("{}{}", text, "}".repeat(missing))
    } else if closes > opens {
        let missing = closes - opens;
        repairs.push(Repair::PrependedBraces(missing));
        format!("{}{}", "{".repeat(missing), text)
    } else {
        text.to_string()
    }
}

fn is_valid_escape(c: char) -> bool {
    matches!(c, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')
}

/// True when some backslash is not followed by a JSON escape character.
pub fn has_invalid_escape(text: &str) -> bool {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) if is_valid_escape(next) => {}
                _ => return true,
            }
        }
    }
    false
}

/// Escape stray backslashes, then raw control characters and raw quotes
/// inside string literals.
fn repair_escapes(text: &str) -> String {
    escape_string_contents(&escape_stray_backslashes(text))
}

fn escape_stray_backslashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if is_valid_escape(next) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

/// Walk the text tracking string state. Inside a string, literal newlines,
/// carriage returns and tabs become escapes, and a `"` that is not followed
/// by a structural character (`, : } ]` or end of text) is taken as a raw
/// quote and escaped.
fn escape_string_contents(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => {
                let next_structural = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                match next_structural {
                    None | Some(',') | Some(':') | Some('}') | Some(']') => {
                        in_string = false;
                        out.push('"');
                    }
                    Some(_) => out.push_str("\\\""),
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}
