use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::blocks::Block;
use crate::utils::count_words;

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["'\u{201D}\u{2019})\]]*\s+"#).unwrap());

/// A word-budgeted group of blocks shown as one reading slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub blocks: Vec<Block>,
    pub word_count: usize,
    /// Plain text of every block, space-joined.
    pub text: String,
}

#[derive(Default)]
struct ChunkBuilder {
    blocks: Vec<Block>,
    words: usize,
    parts: Vec<String>,
}

impl ChunkBuilder {
    fn push(&mut self, block: Block) {
        let text = block.plain_text();
        self.words += count_words(&text);
        if !text.is_empty() {
            self.parts.push(text);
        }
        self.blocks.push(block);
    }

    fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn over_half(&self, max_words: usize) -> bool {
        self.words * 2 > max_words
    }

    fn finish(self) -> Chunk {
        Chunk {
            blocks: self.blocks,
            word_count: self.words,
            text: self.parts.join(" "),
        }
    }
}

fn flush(chunks: &mut Vec<Chunk>, current: &mut ChunkBuilder) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current).finish());
    }
}

/// Greedily pack blocks into chunks of at most `max_words` words.
///
/// Headings always open a chunk. Paragraphs longer than the budget are split at
/// sentence boundaries; lists, quotes, code, math and images are never split.
pub fn chunk(blocks: &[Block], max_words: usize) -> Vec<Chunk> {
    let max_words = max_words.max(1);
    let mut chunks = Vec::new();
    let mut current = ChunkBuilder::default();

    for block in blocks {
        let words = block.word_count();
        match block {
            Block::Heading { .. } => {
                flush(&mut chunks, &mut current);
                current.push(block.clone());
            }
            Block::Paragraph { text, .. } => {
                if words > max_words {
                    flush(&mut chunks, &mut current);
                    current = split_paragraph(text, max_words, &mut chunks);
                } else {
                    if current.words + words > max_words {
                        flush(&mut chunks, &mut current);
                    }
                    current.push(block.clone());
                }
            }
            Block::List { .. } | Block::Quote { .. } | Block::Code { .. } => {
                if current.words + words > max_words {
                    flush(&mut chunks, &mut current);
                }
                current.push(block.clone());
            }
            Block::Math { .. } => {
                if current.over_half(max_words) || current.words + words > max_words {
                    flush(&mut chunks, &mut current);
                }
                current.push(block.clone());
            }
            Block::Image { .. } => {
                if current.over_half(max_words) {
                    flush(&mut chunks, &mut current);
                }
                current.push(block.clone());
            }
        }
    }

    flush(&mut chunks, &mut current);
    chunks
}

/// Pack the sentences of an oversized paragraph; every full sub-chunk is emitted and
/// the last one is returned as the new current chunk.
fn split_paragraph(text: &str, max_words: usize, chunks: &mut Vec<Chunk>) -> ChunkBuilder {
    let mut current = ChunkBuilder::default();
    for sentence in split_sentences(text) {
        let words = count_words(&sentence);
        if current.words + words > max_words {
            flush(chunks, &mut current);
        }
        current.push(Block::paragraph(&sentence));
    }
    current
}

/// Split after terminal punctuation. Text after the last terminator is kept.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}
