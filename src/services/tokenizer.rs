use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

/// Lazily-built BPE tokenizer shared process-wide. `cl100k_base` is a
/// reasonable standard-BPE stand-in for whichever model is configured;
/// token counts are used for budgeting, not exact provider billing.
fn bpe() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary is bundled"))
}

/// Count tokens in `text` using the standard BPE-compatible tokenizer
/// (sec 4.7: "sum of input query and output message tokens").
pub fn count_tokens(text: &str) -> u32 {
    bpe().encode_with_special_tokens(text).len() as u32
}

/// Truncate `text` to at most `max_tokens` tokens, returning the original
/// string unchanged if it already fits.
pub fn truncate_to_tokens(text: &str, max_tokens: u32) -> String {
    let tokens = bpe().encode_with_special_tokens(text);
    if tokens.len() as u32 <= max_tokens {
        return text.to_string();
    }
    let truncated = &tokens[..max_tokens as usize];
    bpe().decode(truncated.to_vec()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tokens_empty_is_zero() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn count_tokens_nonempty_is_positive() {
        assert!(count_tokens("hello world") > 0);
    }

    #[test]
    fn truncate_shrinks_long_text() {
        let long = "word ".repeat(5000);
        let truncated = truncate_to_tokens(&long, 10);
        assert!(count_tokens(&truncated) <= 10);
    }

    #[test]
    fn truncate_is_noop_under_budget() {
        let text = "short text";
        assert_eq!(truncate_to_tokens(text, 1000), text);
    }
}
