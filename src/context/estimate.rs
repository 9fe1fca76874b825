//! Token estimation heuristic.
//!
//! Not a guarantee of provider agreement — only a local, consistent
//! budget gate. ASCII text costs roughly 4 characters per token; CJK text
//! is much denser (roughly 1.5 characters per token), so it is weighted
//! separately.

use crate::message::AgentMessage;

const ASCII_CHARS_PER_TOKEN: f64 = 4.0;
const CJK_CHARS_PER_TOKEN: f64 = 1.5;
const PER_MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count of a single string.
pub fn estimate_tokens(text: &str) -> usize {
    let mut ascii_chars = 0usize;
    let mut cjk_chars = 0usize;

    for ch in text.chars() {
        if is_cjk(ch) {
            cjk_chars += 1;
        } else {
            ascii_chars += 1;
        }
    }

    let tokens = (ascii_chars as f64 / ASCII_CHARS_PER_TOKEN) + (cjk_chars as f64 / CJK_CHARS_PER_TOKEN);
    tokens.ceil() as usize + PER_MESSAGE_OVERHEAD
}

/// Estimate the token count of a whole message list.
pub fn estimate_messages(messages: &[AgentMessage]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4e00}'..='\u{9fff}'   // CJK Unified Ideographs
        | '\u{3400}'..='\u{4dbf}' // CJK Extension A
        | '\u{3000}'..='\u{303f}' // CJK punctuation
        | '\u{ff00}'..='\u{ffef}' // Fullwidth forms
    )
}
