//! Heuristic token estimation.
//!
//! Ideographs cost roughly one token each, while alphabetic text averages
//! about four characters per token. The estimate only drives budgeting, so a
//! cheap deterministic count beats pulling in a real tokenizer.

/// Characters per token for non-CJK text.
const CHARS_PER_TOKEN: usize = 4;

fn is_cjk(c: char) -> bool {
    ('\u{3400}'..='\u{9fff}').contains(&c)
}

/// Estimate the token cost of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });

    cjk + other.div_ceil(CHARS_PER_TOKEN)
}
