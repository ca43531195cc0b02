//! Markdown chunking (sec 4.6 step 5): recursively split on heading
//! depths 1..6 until each section is small enough, then pack sentences
//! into overlapping windows. Pure functions, fully unit-testable without
//! a database.

const DEFAULT_CHUNK_SIZE_WORDS: usize = 200;
const DEFAULT_CHUNK_WINDOW_WORDS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size_words: usize,
    pub chunk_window_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_words: DEFAULT_CHUNK_SIZE_WORDS,
            chunk_window_words: DEFAULT_CHUNK_WINDOW_WORDS,
        }
    }
}

/// One chunk of markdown with the heading path leading to it, e.g.
/// `["Setup", "Install"]` for a chunk under `# Setup` / `## Install`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownChunk {
    pub heading_path: Vec<String>,
    pub body: String,
}

impl MarkdownChunk {
    /// Content prepended with its heading path (" - " joined), ready for
    /// embedding (sec 4.6 step 5: "Prepend the heading path... before
    /// embedding").
    pub fn content_for_embedding(&self) -> String {
        if self.heading_path.is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.heading_path.join(" - "), self.body)
        }
    }
}

struct Section {
    heading_path: Vec<String>,
    body: String,
}

/// Splits markdown into heading-bounded sections, then packs each
/// section's body into word-bounded, overlapping windows.
pub fn chunk_markdown(markdown: &str, config: &ChunkingConfig) -> Vec<MarkdownChunk> {
    let sections = split_by_headings(markdown);
    let mut chunks = Vec::new();

    for section in sections {
        let word_count = section.body.split_whitespace().count();
        if word_count <= config.chunk_size_words {
            if !section.body.trim().is_empty() {
                chunks.push(MarkdownChunk {
                    heading_path: section.heading_path,
                    body: section.body.trim().to_string(),
                });
            }
            continue;
        }

        for window in pack_sentences(&section.body, config.chunk_size_words, config.chunk_window_words) {
            chunks.push(MarkdownChunk {
                heading_path: section.heading_path.clone(),
                body: window,
            });
        }
    }

    chunks
}

/// Splits markdown on heading lines (`#`..`######`), tracking the
/// heading-path stack as depth changes. Each returned section's `body`
/// is the text following its heading up to the next heading at any depth.
fn split_by_headings(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current_body = String::new();
    let mut has_content = false;

    for line in markdown.lines() {
        if let Some((depth, title)) = parse_heading(line) {
            if has_content || !stack.is_empty() {
                sections.push(Section {
                    heading_path: stack.clone(),
                    body: std::mem::take(&mut current_body),
                });
            }
            stack.truncate(depth.saturating_sub(1));
            stack.push(title);
            has_content = false;
        } else {
            current_body.push_str(line);
            current_body.push('\n');
            if !line.trim().is_empty() {
                has_content = true;
            }
        }
    }

    if has_content || sections.is_empty() {
        sections.push(Section {
            heading_path: stack,
            body: current_body,
        });
    }

    sections
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let depth = trimmed.chars().take_while(|c| *c == '#').count();
    if depth == 0 || depth > 6 {
        return None;
    }
    let rest = trimmed[depth..].trim();
    if rest.is_empty() || !trimmed[depth..].starts_with(' ') {
        return None;
    }
    Some((depth, rest.to_string()))
}

/// Splits `text` into sentences, then greedily packs them into windows
/// of at most `chunk_size` words with a trailing overlap of at most
/// `chunk_window` words carried into the next window.
fn pack_sentences(text: &str, chunk_size: usize, chunk_window: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    let mut windows = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for sentence in &sentences {
        let sentence_words = sentence.split_whitespace().count();
        if current_words + sentence_words > chunk_size && !current.is_empty() {
            windows.push(current.join(" "));
            let overlap_start = overlap_start_index(&current, chunk_window);
            current = current[overlap_start..].to_vec();
            current_words = current.iter().map(|s| s.split_whitespace().count()).sum();
        }
        current.push(sentence);
        current_words += sentence_words;
    }
    if !current.is_empty() {
        windows.push(current.join(" "));
    }
    windows
}

fn overlap_start_index(sentences: &[&str], chunk_window: usize) -> usize {
    let mut words = 0usize;
    for (i, sentence) in sentences.iter().enumerate().rev() {
        words += sentence.split_whitespace().count();
        if words > chunk_window {
            return i + 1;
        }
    }
    0
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'?' | b'!') && (i + 1 == bytes.len() || bytes[i + 1] == b' ' || bytes[i + 1] == b'\n') {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_by_heading_depth() {
        let markdown = "# Setup\nInstall steps.\n## Install\nRun the installer.\n";
        let sections = split_by_headings(markdown);
        assert!(sections.iter().any(|s| s.heading_path == vec!["Setup".to_string()]));
        assert!(sections
            .iter()
            .any(|s| s.heading_path == vec!["Setup".to_string(), "Install".to_string()]));
    }

    #[test]
    fn short_section_stays_a_single_chunk() {
        let markdown = "# Title\nShort body text.\n";
        let config = ChunkingConfig::default();
        let chunks = chunk_markdown(markdown, &config);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path, vec!["Title".to_string()]);
    }

    #[test]
    fn long_section_splits_into_overlapping_windows() {
        let sentence = "This is one sentence with several words in it. ";
        let body = sentence.repeat(30);
        let markdown = format!("# Long\n{body}\n");
        let config = ChunkingConfig {
            chunk_size_words: 50,
            chunk_window_words: 10,
        };
        let chunks = chunk_markdown(&markdown, &config);
        assert!(chunks.len() > 1, "expected multiple windows, got {}", chunks.len());
        for chunk in &chunks {
            assert_eq!(chunk.heading_path, vec!["Long".to_string()]);
        }
    }

    #[test]
    fn content_for_embedding_prepends_heading_path() {
        let chunk = MarkdownChunk {
            heading_path: vec!["Setup".to_string(), "Install".to_string()],
            body: "Run the installer.".to_string(),
        };
        let content = chunk.content_for_embedding();
        assert!(content.starts_with("Setup - Install"));
        assert!(content.contains("Run the installer."));
    }

    #[test]
    fn heading_parser_requires_space_after_hashes() {
        assert!(parse_heading("#no-space").is_none());
        assert!(parse_heading("## Has space").is_some());
        assert!(parse_heading("####### too deep").is_none());
    }
}
