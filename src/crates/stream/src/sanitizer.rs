//! Control-marker scrubbing for model output
//!
//! Both entry points are pure and idempotent: each pass only removes text,
//! and is repeated until nothing changes.

use regex::Regex;
use std::sync::OnceLock;

/// Stop/control markers that must never reach user-visible text.
const CONTROL_MARKERS: &[&str] = &[
    "<|im_end|>",
    "<|im_start|>",
    "<|endoftext|>",
    "<|end_of_text|>",
    "<|begin_of_text|>",
    "<|eot_id|>",
    "<|end|>",
    "<|pad|>",
    "<|eos|>",
    "<|bos|>",
    "<pad>",
    "<eos>",
    "<bos>",
    "<s>",
    "</s>",
    "[PAD]",
];

/// Language codes the model appends as `/xx` tags.
const LANGUAGE_CODES: &[&str] = &[
    "en", "zh", "ja", "ko", "fr", "de", "es", "ru", "pt", "it", "ar", "hi",
];

fn language_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(^|\s)/(?:{})(\s|$)", LANGUAGE_CODES.join("|"));
        Regex::new(&pattern).expect("language tag pattern is valid")
    })
}

fn bracket_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\|[^\n]*?\|>").expect("bracket tag pattern is valid"))
}

fn blank_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("blank run pattern is valid"))
}

fn is_control_marker(text: &str) -> bool {
    CONTROL_MARKERS.contains(&text)
}

fn strip_control_markers(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let mut next = current.clone();
        for marker in CONTROL_MARKERS {
            if next.contains(marker) {
                next = next.replace(marker, "");
            }
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Scrub one streamed fragment.
///
/// A fragment that is nothing but a marker (ignoring surrounding whitespace)
/// becomes empty; otherwise markers are cut out and whitespace is kept so
/// that word spacing between fragments survives.
pub fn sanitize_fragment(text: &str) -> String {
    if is_control_marker(text.trim()) {
        return String::new();
    }
    strip_control_markers(text)
}

fn final_pass(text: &str) -> String {
    let text = strip_control_markers(text);
    let text = language_tag_regex().replace_all(&text, "${1}${2}");
    let text = bracket_tag_regex().replace_all(&text, "");
    let text = blank_run_regex().replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Scrub a complete answer before it is handed off.
pub fn sanitize_final(text: &str) -> String {
    let mut current = final_pass(text);
    loop {
        let next = final_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
