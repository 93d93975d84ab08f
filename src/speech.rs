//! # Spoken Text Cleanup
//!
//! Assistant replies are written as markdown. Before such a reply is read aloud
//! its formatting is removed so the voice does not pronounce symbols.
//!
//! ## Rules (applied in this order):
//! - Fenced code blocks are dropped entirely
//! - Line-leading headings (`#`..`######`), list bullets (`-`, `*`, `+`) and quote markers (`>`) go
//! - `**bold**`, `*italic*` and `` `code` `` keep only their text
//! - `[label](url)` keeps only the label
//! - Blank-line paragraph breaks become `. `, single newlines a space

use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\s\S]*?```").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]?").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").unwrap());
static QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*>[ \t]?").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// Strip markdown from `text` so it can be spoken. Returns an empty string when
/// nothing speakable is left.
pub fn clean_markdown(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = FENCED_CODE.replace_all(&text, "");
    let text = HEADING.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = QUOTE.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    // Trim first so leftover edges do not turn into stray periods
    let text = PARAGRAPH_BREAK.replace_all(text.trim(), ". ");
    text.replace('\n', " ").trim().to_string()
}
