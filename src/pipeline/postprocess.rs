//! Post-processing: deterministic cleanup of a model reply before JSON parsing.
//!
//! Gemini in JSON mode returns a bare object, but providers without a native
//! JSON mode (and Gemini itself, occasionally) wrap it in a ```` ```json ````
//! fence or prefix a BOM. These rules undo exactly that and nothing more: the
//! inside of the object is never touched, and the original reply is what ends
//! up in the fallback `raw_text` when parsing still fails.
//!
//! ## Rule Order
//!
//! 1. Strip leading/trailing invisible characters (BOM, zero-width spaces)
//! 2. Normalise line endings so the fence pattern matches CRLF replies
//! 3. Strip one outer code fence (```` ``` ````, ```` ```json ````)
//! 4. Trim surrounding whitespace

use once_cell::sync::Lazy;
use regex::Regex;

/// Prepare a raw model reply for `serde_json`.
pub fn clean_json_reply(input: &str) -> String {
    let s = trim_invisible(input);
    let s = normalise_line_endings(s);
    let s = strip_code_fence(&s);
    s.trim().to_string()
}

// ── Rule 1: Trim invisible characters ────────────────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

fn trim_invisible(input: &str) -> &str {
    input.trim_matches(|c: char| c.is_whitespace() || INVISIBLE.contains(&c))
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer code fence ───────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```$").unwrap());

fn strip_code_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}
