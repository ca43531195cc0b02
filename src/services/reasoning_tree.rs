use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured per-request trace: `{data, children, elapsedMs}` (sec 9).
/// Built as an owned tree of nodes rather than an in-memory pointer graph,
/// since it is write-once during a request and serialized afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningTree {
    pub data: Value,
    pub children: Vec<ReasoningTree>,
    pub elapsed_ms: Option<u64>,
}

impl ReasoningTree {
    pub fn leaf(data: Value) -> Self {
        Self {
            data,
            children: Vec::new(),
            elapsed_ms: None,
        }
    }

    pub fn with_children(data: Value, children: Vec<ReasoningTree>) -> Self {
        Self {
            data,
            children,
            elapsed_ms: None,
        }
    }

    /// Serialize to JSON then Brotli-compress for persistence (sec 4.5,
    /// sec 9). Original chunk text is never embedded here — only ids.
    pub fn compress(&self) -> Vec<u8> {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let mut out = Vec::new();
        let params = brotli::enc::BrotliEncoderParams::default();
        let mut reader = std::io::Cursor::new(json);
        brotli::BrotliCompress(&mut reader, &mut out, &params)
            .expect("in-memory brotli compression cannot fail");
        out
    }

    pub fn decompress(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut out = Vec::new();
        let mut reader = std::io::Cursor::new(bytes);
        brotli::BrotliDecompress(&mut reader, &mut out)?;
        Ok(serde_json::from_slice(&out)?)
    }
}

/// Measures one stage's wall-clock duration and records it, along with
/// per-stage `data`, as a finished `ReasoningTree` node once dropped
/// explicitly via `finish`.
pub struct Measure {
    start: Instant,
    data: Value,
}

impl Measure {
    pub fn start(data: Value) -> Self {
        Self {
            start: Instant::now(),
            data,
        }
    }

    pub fn finish(self, children: Vec<ReasoningTree>) -> ReasoningTree {
        ReasoningTree {
            data: self.data,
            children,
            elapsed_ms: Some(self.start.elapsed().as_millis() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compress_then_decompress_round_trips() {
        let tree = ReasoningTree::with_children(
            json!({"stage": "retrieval"}),
            vec![ReasoningTree::leaf(json!({"stage": "lexical", "ids": ["a", "b"]}))],
        );
        let compressed = tree.compress();
        let restored = ReasoningTree::decompress(&compressed).unwrap();
        assert_eq!(restored.data, tree.data);
        assert_eq!(restored.children.len(), 1);
    }

    #[test]
    fn measure_records_elapsed_time() {
        let measure = Measure::start(json!({"stage": "rerank"}));
        std::thread::sleep(std::time::Duration::from_millis(1));
        let node = measure.finish(vec![]);
        assert!(node.elapsed_ms.is_some());
    }
}
