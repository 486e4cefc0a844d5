//! Prompt token counting for cost estimates.

use once_cell::sync::Lazy;
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::items::Item;
use crate::personas::Persona;

static BPE: Lazy<Option<CoreBPE>> = Lazy::new(|| match cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!(error = %e, "cl100k_base tokenizer unavailable, approximating");
        None
    }
});

/// Count tokens in text using the cl100k_base tokenizer.
///
/// Falls back to one token per four characters if the tokenizer cannot load.
pub fn count_tokens(text: &str) -> usize {
    match BPE.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// Mean prompt size over every item/persona pairing, in tokens.
///
/// Returns `None` when there is nothing to average.
pub fn average_prompt_tokens(items: &[Item], personas: &[Persona]) -> Option<u32> {
    if items.is_empty() || personas.is_empty() {
        return None;
    }
    let item_tokens: usize = items.iter().map(|i| count_tokens(&i.render_prompt())).sum();
    let persona_tokens: usize = personas
        .iter()
        .map(|p| count_tokens(&p.system_prompt))
        .sum();
    // Every item is paired with every persona, so the cross-term averages out.
    let avg = item_tokens as f64 / items.len() as f64
        + persona_tokens as f64 / personas.len() as f64;
    Some(avg.round() as u32)
}
