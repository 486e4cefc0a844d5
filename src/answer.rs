//! Extract the chosen option letter from a free-text model reply.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::items::OptionKey;

// Ordered by precedence; the first pattern that matches anywhere wins.
static PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        // "the answer is B", "I choose: c", "Final answer: D"
        Regex::new(r"(?i)(?:answer|select|choose|pick)(?:\s+is)?[:\s]+([ABCD])\b"),
        // "B) is the correct answer", "C is best"
        Regex::new(r"(?i)\b([ABCD])\)?\s*(?:is\s+)?(?:the\s+)?(?:correct|right|best)\b"),
        // a letter opening a line: "B) ...", "C. ...", "D"
        Regex::new(r"(?m)^([ABCD])(?:\)|\.|\s|$)"),
        // a lone letter closing the text
        Regex::new(r"\b([ABCD])\b\s*$"),
    ]
    .map(|r| r.expect("static answer pattern"))
});

static STANDALONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([ABCD])\b").expect("static answer pattern"));

/// Parse the selected option out of `text`, or `None` when no letter can be
/// found.
pub fn parse_answer(text: &str) -> Option<OptionKey> {
    let from_patterns = PATTERNS
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)));

    let letter = match from_patterns {
        Some(m) => m.as_str(),
        None => STANDALONE.captures_iter(text).last()?.get(1)?.as_str(),
    };

    letter.chars().next().and_then(OptionKey::from_letter)
}
