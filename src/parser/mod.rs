pub mod blocks;
pub mod extract;
pub mod segment;
pub mod thread;

use scraper::Html;

use crate::error::ReaderError;
use blocks::Block;
use segment::Chunk;

/// Title and excerpt shown on the title slide.
#[derive(Debug, Clone)]
pub struct ArticleMeta {
    pub title: String,
    pub excerpt: String,
}

/// Page → blocks, through the thread source when `url` is a thread, else the extractor.
pub fn page_blocks(html: &str, url: Option<&str>) -> Result<(ArticleMeta, Vec<Block>), ReaderError> {
    let doc = Html::parse_document(html);

    if let Some(url) = url.filter(|u| thread::is_thread_url(u)) {
        // A thread page that yields no posts falls back to article extraction.
        if let Some(thread) = thread::extract_thread(&doc, url) {
            let meta = ArticleMeta {
                title: thread.title,
                excerpt: format!("{} - {} tweets", thread.author, thread.tweet_count),
            };
            return Ok((meta, thread.blocks));
        }
    }

    let article = extract::extract_article(&doc)?;
    let blocks = blocks::parse_content(&article.content);
    let meta = ArticleMeta {
        title: article.title,
        excerpt: article.excerpt,
    };
    Ok((meta, blocks))
}

/// Full pipeline: page → blocks → chunks. Zero chunks is `EmptyContent`.
pub fn process_page(
    html: &str,
    url: Option<&str>,
    max_words: usize,
) -> Result<(ArticleMeta, Vec<Chunk>), ReaderError> {
    let (meta, blocks) = page_blocks(html, url)?;
    let chunks = segment::chunk(&blocks, max_words);
    if chunks.is_empty() {
        return Err(ReaderError::EmptyContent);
    }
    Ok((meta, chunks))
}
