//! Turns raw model output into speakable text.
//!
//! Pipeline, in order:
//! 1. strip reasoning spans and lead-in phrases to a fixed point (max 10 passes)
//! 2. keep only what follows a stray closing delimiter
//! 3. collapse whitespace
//! 4. drop duplicate and fragment sentences
//! 5. recover something from the raw text if too little is left
//! 6. cut back to the last full sentence when the token budget was exhausted
//! 7. cap the length for speech
//!
//! `normalize` never fails and never returns an empty string.

use regex::Regex;
use reachy_core::{is_presumed_truncated, truncate_chars};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Spoken when nothing usable survives normalization
pub const FALLBACK_APOLOGY: &str = "I'm sorry, I didn't receive a valid response.";

pub const DEFAULT_MAX_SPEECH_CHARS: usize = 3000;
pub const DEFAULT_TRUNCATION_RATIO: f64 = 0.9;

const MAX_STRIP_PASSES: usize = 10;
const MIN_SENTENCE_CHARS: usize = 5;
const MIN_USABLE_CHARS: usize = 10;
const RECOVERED_SENTENCES: usize = 3;
/// Truncation repair only cuts if the kept part is at least this share of the text
const MIN_REPAIR_FRACTION: f64 = 0.3;
/// The length cap only cuts at a sentence end found in the last 30% of the window
const MIN_CAP_FRACTION: f64 = 0.7;
const ELLIPSIS: &str = "...";
const SENTENCE_END: [char; 3] = ['.', '!', '?'];
const REASONING_WORDS: &[&str] = &["thinking", "reasoning", "considering", "<think", "</think"];

/// One named pattern removed during reasoning stripping
pub struct StripRule {
    pub name: &'static str,
    pattern: Regex,
}

impl StripRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("strip rule pattern is valid"),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

impl fmt::Debug for StripRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Ordered rules: paired spans first, then unterminated spans, then lead-in phrases
pub fn strip_rules() -> &'static [StripRule] {
    static RULES: OnceLock<Vec<StripRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            StripRule::new("bracket_span", r"(?is)\[thinking\].*?\[/thinking\]"),
            StripRule::new("think_tag_span", r"(?is)<think>.*?</think>"),
            StripRule::new("thinking_tag_span", r"(?is)<thinking>.*?</thinking>"),
            StripRule::new("fenced_span", r"(?is)```thinking.*?```"),
            StripRule::new("bracket_open_to_end", r"(?is)\[thinking\].*"),
            StripRule::new("thinking_tag_open_to_end", r"(?is)<thinking>.*"),
            StripRule::new("think_tag_open_to_end", r"(?is)<think>.*"),
            StripRule::new("let_me_think", r"(?i)\blet me think[^.!?]*[.!?]?\s*"),
            StripRule::new("thinking_label", r"(?i)\bthinking:[^.!?]*[.!?]?\s*"),
            StripRule::new("reasoning_label", r"(?i)\breasoning:[^.!?]*[.!?]?\s*"),
            StripRule::new("considering_label", r"(?i)\bconsidering:[^.!?]*[.!?]?\s*"),
            StripRule::new(
                "user_is_asking",
                r"(?i)\bokay,?\s+the\s+user\s+is\s+asking[^.!?]*[.!?]?\s*",
            ),
            StripRule::new("need_to_define", r"(?i)\bi\s+need\s+to\s+define[^.!?]*[.!?]?\s*"),
            StripRule::new("start_by", r"(?i)\blet\s+me\s+start\s+by[^.!?]*[.!?]?\s*"),
            StripRule::new(
                "should_also_consider",
                r"(?i)\bi\s+should\s+also\s+consider[^.!?]*[.!?]?\s*",
            ),
        ]
    })
}

fn closing_delimiters() -> &'static Regex {
    static CLOSERS: OnceLock<Regex> = OnceLock::new();
    CLOSERS.get_or_init(|| {
        Regex::new(r"(?i)\[/thinking\]|</thinking>|</think>").expect("closer pattern is valid")
    })
}

fn any_delimiter() -> &'static Regex {
    static MARKERS: OnceLock<Regex> = OnceLock::new();
    MARKERS.get_or_init(|| {
        Regex::new(r"(?i)\[/?thinking\]|</?think(?:ing)?>|```thinking").expect("marker pattern is valid")
    })
}

fn sentence_pattern() -> &'static Regex {
    static SENTENCES: OnceLock<Regex> = OnceLock::new();
    SENTENCES.get_or_init(|| {
        // Terminal punctuation only ends a sentence before whitespace or the end of text
        Regex::new(r"(?s).*?[.!?]+(?:\s+|$)|.+").expect("sentence pattern is valid")
    })
}

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Speakable text: non-empty, free of reasoning delimiters, within the length cap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the pipeline did to a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalization {
    pub text: NormalizedText,
    pub reasoning_removed: bool,
    pub recovered_from_raw: bool,
    pub repaired_truncation: bool,
    pub length_capped: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseNormalizer {
    max_chars: usize,
    truncation_ratio: f64,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SPEECH_CHARS, DEFAULT_TRUNCATION_RATIO)
    }
}

impl ResponseNormalizer {
    pub fn new(max_chars: usize, truncation_ratio: f64) -> Self {
        Self {
            max_chars: max_chars.max(ELLIPSIS.len() + 1),
            truncation_ratio,
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn normalize(&self, raw: &str, completion_tokens: Option<u32>, max_tokens: u32) -> NormalizedText {
        self.normalize_detailed(raw, completion_tokens, max_tokens).text
    }

    pub fn normalize_detailed(
        &self,
        raw: &str,
        completion_tokens: Option<u32>,
        max_tokens: u32,
    ) -> Normalization {
        let (stripped, passes) = strip_reasoning(raw);
        let after_residual = keep_after_last_closer(&stripped);
        let reasoning_removed = after_residual != raw;
        let collapsed = collapse_whitespace(&after_residual);
        let mut text = dedupe_sentences(&collapsed);

        let mut recovered_from_raw = false;
        if text.chars().count() < MIN_USABLE_CHARS {
            if let Some(recovered) = recover_from_raw(raw) {
                if recovered.chars().count() > text.chars().count() {
                    text = recovered;
                    recovered_from_raw = true;
                }
            }
            if text.is_empty() {
                text = scrub_delimiters(raw);
                recovered_from_raw = !text.is_empty();
            }
        }

        let mut repaired_truncation = false;
        if is_presumed_truncated(completion_tokens, max_tokens, self.truncation_ratio) {
            if let Some(repaired) = cut_at_last_sentence(&text) {
                text = repaired;
                repaired_truncation = true;
            }
        }

        let (capped, length_capped) = self.cap_length(text);
        let text = if capped.trim().is_empty() {
            FALLBACK_APOLOGY.to_string()
        } else {
            capped
        };

        debug!(
            passes,
            reasoning_removed,
            recovered_from_raw,
            repaired_truncation,
            length_capped,
            chars = text.chars().count(),
            "Normalized response"
        );

        Normalization {
            text: NormalizedText(text),
            reasoning_removed,
            recovered_from_raw,
            repaired_truncation,
            length_capped,
        }
    }

    fn cap_length(&self, text: String) -> (String, bool) {
        if text.chars().count() <= self.max_chars {
            return (text, false);
        }

        let window = truncate_chars(&text, self.max_chars);
        if let Some(end) = last_sentence_end(&text, window.len()) {
            let kept = &text[..=end];
            if kept.chars().count() as f64 > self.max_chars as f64 * MIN_CAP_FRACTION {
                return (kept.to_string(), true);
            }
        }

        let body = truncate_chars(&text, self.max_chars - ELLIPSIS.len()).trim_end();
        (format!("{}{}", body, ELLIPSIS), true)
    }
}

/// Apply every strip rule until nothing changes; returns the text and passes used
pub fn strip_reasoning(text: &str) -> (String, usize) {
    let mut current = text.to_string();
    for pass in 1..=MAX_STRIP_PASSES {
        let before = current.clone();
        for rule in strip_rules() {
            current = rule.apply(&current);
        }
        if current == before {
            return (current, pass);
        }
    }
    (current, MAX_STRIP_PASSES)
}

/// Reasoning always precedes the answer, so a stray closer means the answer follows it
fn keep_after_last_closer(text: &str) -> String {
    match closing_delimiters().find_iter(text).last() {
        Some(closer) => text[closer.end()..].to_string(),
        None => text.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    whitespace().replace_all(text, " ").trim().to_string()
}

fn scrub_delimiters(text: &str) -> String {
    collapse_whitespace(&any_delimiter().replace_all(text, " "))
}

fn split_sentences(text: &str) -> Vec<&str> {
    sentence_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn dedupe_sentences(text: &str) -> String {
    let sentences = split_sentences(text);
    if sentences.len() < 2 {
        return text.to_string();
    }

    let mut seen = HashSet::new();
    let kept: Vec<&str> = sentences
        .into_iter()
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect();

    if kept.is_empty() {
        text.to_string()
    } else {
        kept.join(" ")
    }
}

/// Last few raw sentences that carry no reasoning vocabulary
fn recover_from_raw(raw: &str) -> Option<String> {
    let clean: Vec<&str> = split_sentences(raw)
        .into_iter()
        .filter(|s| {
            let lower = s.to_lowercase();
            !REASONING_WORDS.iter().any(|word| lower.contains(word))
        })
        .collect();

    let start = clean.len().saturating_sub(RECOVERED_SENTENCES);
    let joined = scrub_delimiters(&clean[start..].join(" "));
    (!joined.is_empty()).then_some(joined)
}

/// Byte offset of the last `.`, `!` or `?` before `limit` that is followed by
/// whitespace or the end of `text`. Decimal points and version dots never qualify.
fn last_sentence_end(text: &str, limit: usize) -> Option<usize> {
    text[..limit]
        .char_indices()
        .rev()
        .find(|&(i, c)| {
            SENTENCE_END.contains(&c)
                && text[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, _)| i)
}

fn cut_at_last_sentence(text: &str) -> Option<String> {
    let end = last_sentence_end(text, text.len())?;
    let kept = end + 1;
    if kept == text.len() || (kept as f64) < text.len() as f64 * MIN_REPAIR_FRACTION {
        return None;
    }
    Some(text[..kept].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> String {
        ResponseNormalizer::default().normalize(raw, None, 200).into_string()
    }

    fn rule(name: &str) -> &'static StripRule {
        strip_rules().iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_bracket_span_answer() {
        assert_eq!(
            normalize("[thinking]considering options[/thinking]The answer is 42."),
            "The answer is 42."
        );
    }

    #[test]
    fn test_think_tag_answer_is_trimmed() {
        assert_eq!(
            normalize("<think>\nThe user wants a capital.\n</think>\n\n  Paris is the capital of France.  "),
            "Paris is the capital of France."
        );
    }

    #[test]
    fn test_reasoning_only_is_never_empty() {
        let out = normalize("<think>reasoning...</think>");
        assert!(!out.trim().is_empty());
        assert!(!out.contains("<think>"));
        assert!(!out.contains("</think>"));
    }

    #[test]
    fn test_multiple_and_nested_spans() {
        let raw = "<think>a <think>b</think> c</think>First answer. [thinking]x[/thinking]Second part.";
        assert_eq!(normalize(raw), "First answer. Second part.");
    }

    #[test]
    fn test_unterminated_span_removed_to_end() {
        assert_eq!(
            normalize("Here is the summary you asked for. [thinking]and now I wander off"),
            "Here is the summary you asked for."
        );
    }

    #[test]
    fn test_stray_closer_keeps_tail() {
        assert_eq!(
            normalize("so the user wants a number, 42 seems right</think>The number is 42."),
            "The number is 42."
        );
    }

    #[test]
    fn test_duplicate_sentences_removed() {
        assert_eq!(
            normalize("The sky is blue. The sky is blue. It scatters light!  the sky is BLUE."),
            "The sky is blue. It scatters light!"
        );
    }

    #[test]
    fn test_already_normalized_is_unchanged() {
        let clean = "Kubernetes schedules pods onto nodes. It restarts failed containers automatically.";
        assert_eq!(normalize(clean), clean);
        assert_eq!(normalize(&normalize(clean)), clean);
    }

    #[test]
    fn test_decimals_and_versions_are_not_sentence_breaks() {
        for clean in [
            "The price is 3.50 dollars. It rose today.",
            "Pi is roughly 3.14159 in most uses.",
            "Version 1.2 is out now.",
            "Upgrade from 2.0.1 to 2.1.0 tonight. The rollout takes 1.5 hours.",
        ] {
            assert_eq!(normalize(clean), clean);
        }
        assert_eq!(
            split_sentences("It costs 3.50 today. Version 1.2 ships!"),
            vec!["It costs 3.50 today.", "Version 1.2 ships!"]
        );
    }

    #[test]
    fn test_truncation_repair_skips_decimal_point() {
        let result = ResponseNormalizer::default().normalize_detailed(
            "Disk usage is at 87.5 percent. The largest volume holds 14.2 terabytes and",
            Some(199),
            200,
        );
        assert_eq!(result.text.as_str(), "Disk usage is at 87.5 percent.");
        assert!(result.repaired_truncation);
    }

    #[test]
    fn test_lead_in_phrase_removed() {
        assert_eq!(
            normalize("Let me think about this. The deployment finished at noon."),
            "The deployment finished at noon."
        );
    }

    #[test]
    fn test_fragment_sentences_dropped() {
        let raw = "<think>I am considering options.</think> Ok. The release is on Friday.";
        let out = normalize(raw);
        assert_eq!(out, "The release is on Friday.");
    }

    #[test]
    fn test_short_result_recovers_from_raw() {
        let result = ResponseNormalizer::default().normalize_detailed(
            "<think>The cache is warm. Hits are high.</think>Yes.",
            None,
            200,
        );
        assert_eq!(result.text.as_str(), "Hits are high.");
        assert!(result.recovered_from_raw);
    }

    #[test]
    fn test_truncation_repair_cuts_partial_sentence() {
        let normalizer = ResponseNormalizer::default();
        let result = normalizer.normalize_detailed(
            "The cluster has three nodes. Each node runs the agent and",
            Some(195),
            200,
        );
        assert_eq!(result.text.as_str(), "The cluster has three nodes.");
        assert!(result.repaired_truncation);

        let untouched = normalizer.normalize(
            "The cluster has three nodes. Each node runs the agent and",
            Some(50),
            200,
        );
        assert_eq!(
            untouched.as_str(),
            "The cluster has three nodes. Each node runs the agent and"
        );
    }

    #[test]
    fn test_truncation_repair_ignores_early_boundary() {
        let normalizer = ResponseNormalizer::default();
        let text = "Hi there. and this answer keeps going without any further sentence boundary at all";
        assert_eq!(normalizer.normalize(text, Some(200), 200).as_str(), text);
    }

    #[test]
    fn test_length_cap_without_boundary_adds_ellipsis() {
        let normalizer = ResponseNormalizer::new(100, 0.9);
        let raw = "word ".repeat(60);
        let result = normalizer.normalize_detailed(&raw, None, 200);
        let out = result.text.as_str();
        assert!(out.chars().count() <= 100);
        assert!(out.ends_with("..."));
        assert!(result.length_capped);
    }

    #[test]
    fn test_length_cap_prefers_sentence_end() {
        let normalizer = ResponseNormalizer::new(100, 0.9);
        let raw = format!("{}. {}", "a".repeat(80), "b".repeat(60));
        let out = normalizer.normalize(&raw, None, 200);
        assert_eq!(out.as_str(), format!("{}.", "a".repeat(80)));
    }

    #[test]
    fn test_default_cap_is_respected() {
        let raw = (0..400)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let out = normalize(&raw);
        assert!(out.chars().count() <= DEFAULT_MAX_SPEECH_CHARS);
        assert!(out.ends_with('.'));
    }

    #[test]
    fn test_non_empty_for_assorted_inputs() {
        for raw in ["?", "...", "<think></think>", "[thinking]", "   x   ", "</think>", "a"] {
            assert!(!normalize(raw).trim().is_empty(), "empty output for {:?}", raw);
        }
    }

    #[test]
    fn test_whitespace_only_falls_back_to_apology() {
        assert_eq!(normalize("   \n\t "), FALLBACK_APOLOGY);
    }

    #[test]
    fn test_rules_individually() {
        assert_eq!(rule("fenced_span").apply("```thinking\nhidden\n```Shown."), "Shown.");
        assert_eq!(rule("think_tag_open_to_end").apply("Answer. <think>never closed"), "Answer. ");
        assert_eq!(rule("reasoning_label").apply("Reasoning: check docs. Done."), "Done.");
        assert!(rule("user_is_asking").matches("Okay, the user is asking about pods."));
        assert!(!rule("bracket_span").matches("no markers here"));
    }

    #[test]
    fn test_strip_reaches_fixed_point() {
        let (out, passes) = strip_reasoning("plain text");
        assert_eq!(out, "plain text");
        assert_eq!(passes, 1);

        let (out, passes) = strip_reasoning("<think>x</think>Let me think. Answer.");
        assert_eq!(out, "Answer.");
        assert!(passes >= 2 && passes <= MAX_STRIP_PASSES);
    }
}
