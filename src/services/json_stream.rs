//! Tolerant streaming JSON extraction (sec 9 "Streaming JSON extraction").
//!
//! The chat orchestrator streams raw text deltas from the LLM that,
//! together, form one JSON object. This scanner extracts the `response`
//! string field's value incrementally, without waiting for the object to
//! close, by locating the key, then the opening quote, then accumulating
//! characters while honoring `\"`/`\\` escapes until an unescaped closing
//! quote arrives (or more input is needed).

#[derive(Debug, Default)]
pub struct ResponseFieldScanner {
    raw: String,
    emitted_len: usize,
    in_value: bool,
    value_closed: bool,
    value_start: Option<usize>,
}

impl ResponseFieldScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next raw text delta. Returns the newly available,
    /// unescaped slice of the `response` field's value, if any.
    pub fn feed(&mut self, delta: &str) -> Option<String> {
        self.raw.push_str(delta);

        if !self.in_value && !self.value_closed {
            if let Some(key_pos) = self.raw.find("\"response\"") {
                if let Some(quote_pos) = find_opening_quote(&self.raw, key_pos) {
                    self.in_value = true;
                    self.value_start = Some(quote_pos + 1);
                }
            }
        }

        let start = self.value_start?;
        if self.value_closed {
            return None;
        }

        let (value_so_far, closed) = scan_value(&self.raw[start..]);
        if value_so_far.len() <= self.emitted_len {
            if closed {
                self.in_value = false;
                self.value_closed = true;
            }
            return None;
        }

        let new_part = value_so_far[self.emitted_len..].to_string();
        self.emitted_len = value_so_far.len();
        if closed {
            self.in_value = false;
            self.value_closed = true;
        }
        if new_part.is_empty() {
            None
        } else {
            Some(new_part)
        }
    }

    /// Attempts a full parse of everything fed so far — the "attempt
    /// full parse first" step, run once the stream has completed.
    pub fn finalize(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.raw).ok()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

fn find_opening_quote(raw: &str, key_pos: usize) -> Option<usize> {
    let after_key = key_pos + "\"response\"".len();
    let rest = raw.get(after_key..)?;
    let colon_rel = rest.find(':')?;
    let after_colon = rest.get(colon_rel + 1..)?;
    let quote_rel = after_colon.find('"')?;
    Some(after_key + colon_rel + 1 + quote_rel)
}

/// Returns (unescaped value accumulated so far, whether an unescaped
/// closing quote was found).
fn scan_value(s: &str) -> (String, bool) {
    let mut out = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            out.push(unescape_char(c));
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return (out, true),
            other => out.push(other),
        }
    }
    (out, false)
}

fn unescape_char(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'f' => '\u{000C}',
        'b' => '\u{0008}',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_value_across_chunk_boundaries() {
        let mut scanner = ResponseFieldScanner::new();
        let mut emitted = String::new();
        for delta in ["{\"respo", "nse\": \"Hel", "lo, world\", \"answered\":true}"] {
            if let Some(part) = scanner.feed(delta) {
                emitted.push_str(&part);
            }
        }
        assert_eq!(emitted, "Hello, world");
    }

    #[test]
    fn unescapes_newline_and_quote_escapes_split_across_deltas() {
        let mut scanner = ResponseFieldScanner::new();
        let mut emitted = String::new();
        for delta in ["{\"response\": \"line one\\", "nline two with \\\"quote\\\"\"}"] {
            if let Some(part) = scanner.feed(delta) {
                emitted.push_str(&part);
            }
        }
        assert_eq!(emitted, "line one\nline two with \"quote\"");
    }

    #[test]
    fn finalize_parses_completed_object() {
        let mut scanner = ResponseFieldScanner::new();
        scanner.feed(r#"{"response": "hi", "answered": true, "confidence": 5}"#);
        let value = scanner.finalize().expect("should parse");
        assert_eq!(value["response"], "hi");
        assert_eq!(value["confidence"], 5);
    }

    #[test]
    fn ignores_response_key_inside_an_unrelated_nested_object_value() {
        let mut scanner = ResponseFieldScanner::new();
        let emitted = scanner.feed(r#"{"documents": ["no response here"], "response": "actual""#);
        assert_eq!(emitted, Some("actual".to_string()));
    }
}
