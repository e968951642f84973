use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::blocks::{inline_html, Block};
use crate::utils::{element_text, truncate_chars};

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://([^/?#:]+)(?::\d+)?(/[^?#]*)?").unwrap());
static STATUS_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([^/]+)/status/\d+").unwrap());
static IMAGE_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&name=\w+").unwrap());

static TWEET_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid="tweet"]"#).unwrap());
static USER_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid="User-Name"] a[href^="/"]"#).unwrap());
static TWEET_TEXT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid="tweetText"]"#).unwrap());
static PHOTO_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-testid="tweetPhoto"] img"#).unwrap());

const TITLE_MAX_CHARS: usize = 100;

/// A thread rendered as the same block variants the article path produces.
#[derive(Debug, Clone)]
pub struct Thread {
    pub title: String,
    pub author: String,
    pub tweet_count: usize,
    pub blocks: Vec<Block>,
}

struct Tweet {
    author: String,
    text: String,
    html: String,
    images: Vec<(String, String)>,
}

fn host_and_path(url: &str) -> Option<(String, String)> {
    let caps = URL_RE.captures(url.trim())?;
    let host = caps[1].to_ascii_lowercase();
    let path = caps.get(2).map(|m| m.as_str()).unwrap_or("/").to_string();
    Some((host, path))
}

/// True for twitter.com / x.com status pages.
pub fn is_thread_url(url: &str) -> bool {
    let Some((host, path)) = host_and_path(url) else {
        return false;
    };
    let known_host = host == "twitter.com"
        || host == "x.com"
        || host.ends_with(".twitter.com")
        || host.ends_with(".x.com");
    known_host && STATUS_PATH_RE.is_match(&path)
}

fn thread_author(url: &str) -> Option<String> {
    let (_, path) = host_and_path(url)?;
    STATUS_PATH_RE
        .captures(&path)
        .map(|caps| caps[1].to_lowercase())
}

fn is_nested_tweet(el: &ElementRef) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().attr("data-testid") == Some("tweet"))
}

fn parse_tweet(el: &ElementRef) -> Tweet {
    let author = el
        .select(&USER_LINK_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| href.trim_start_matches('/').split('/').next())
        .unwrap_or("")
        .to_lowercase();

    let (text, html) = match el.select(&TWEET_TEXT_SEL).next() {
        Some(t) => (element_text(&t), inline_html(&t, true)),
        None => (String::new(), String::new()),
    };

    let images = el
        .select(&PHOTO_SEL)
        .filter_map(|img| {
            let src = img.value().attr("src")?;
            if src.is_empty() || src.contains("profile_images") {
                return None;
            }
            let src = IMAGE_SIZE_RE.replace(src, "&name=large").to_string();
            let alt = img.value().attr("alt").unwrap_or("").to_string();
            Some((src, alt))
        })
        .collect();

    Tweet {
        author,
        text,
        html,
        images,
    }
}

/// Collect the thread owner's posts from a status page, deduplicated by text.
pub fn extract_thread(doc: &Html, url: &str) -> Option<Thread> {
    let owner = thread_author(url)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut tweets = Vec::new();
    for el in doc.select(&TWEET_SEL) {
        if is_nested_tweet(&el) {
            continue;
        }
        let tweet = parse_tweet(&el);
        if tweet.author != owner {
            debug!("Skipping reply by @{}", tweet.author);
            continue;
        }
        if tweet.text.is_empty() && tweet.images.is_empty() {
            continue;
        }
        if !tweet.text.is_empty() && !seen.insert(tweet.text.clone()) {
            continue;
        }
        tweets.push(tweet);
    }

    if tweets.is_empty() {
        return None;
    }

    let first = &tweets[0].text;
    let title = if first.chars().count() > TITLE_MAX_CHARS {
        format!("{}...", truncate_chars(first, TITLE_MAX_CHARS))
    } else if !first.is_empty() {
        first.clone()
    } else {
        format!("@{} thread", owner)
    };

    let mut blocks = Vec::new();
    for tweet in &tweets {
        if !tweet.text.is_empty() {
            blocks.push(Block::Paragraph {
                text: tweet.text.clone(),
                inline_html: tweet.html.clone(),
            });
        }
        for (src, alt) in &tweet.images {
            blocks.push(Block::Image {
                src: src.clone(),
                alt: alt.clone(),
                caption: None,
            });
        }
    }

    info!("Extracted thread by @{} ({} posts)", owner, tweets.len());
    Some(Thread {
        title,
        author: format!("@{}", owner),
        tweet_count: tweets.len(),
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://x.com/alice/status/1234567890";

    fn fixture() -> Html {
        Html::parse_document(&std::fs::read_to_string("tests/fixtures/thread.html").unwrap())
    }

    #[test]
    fn thread_urls() {
        assert!(is_thread_url(URL));
        assert!(is_thread_url("https://mobile.twitter.com/bob/status/42?s=20"));
        assert!(!is_thread_url("https://x.com/alice"));
        assert!(!is_thread_url("https://example.com/alice/status/1"));
        assert!(!is_thread_url("not a url"));
    }

    #[test]
    fn owner_posts_only_deduplicated() {
        let thread = extract_thread(&fixture(), URL).unwrap();
        assert_eq!(thread.author, "@alice");
        assert_eq!(thread.tweet_count, 3);
        let texts: Vec<_> = thread
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts.len(), 3);
        assert!(texts[0].starts_with("1/ Rust ownership"));
        assert!(!texts.iter().any(|t| t.contains("great thread")));
        assert!(!texts.iter().any(|t| t.contains("Quoted post")));
    }

    #[test]
    fn images_follow_their_post() {
        let thread = extract_thread(&fixture(), URL).unwrap();
        let pos = thread
            .blocks
            .iter()
            .position(|b| matches!(b, Block::Image { .. }))
            .unwrap();
        assert!(matches!(&thread.blocks[pos - 1], Block::Paragraph { text, .. } if text.starts_with("2/")));
        match &thread.blocks[pos] {
            Block::Image { src, .. } => assert!(src.ends_with("&name=large")),
            _ => unreachable!(),
        }
        assert_eq!(
            thread.blocks.iter().filter(|b| matches!(b, Block::Image { .. })).count(),
            1
        );
    }

    #[test]
    fn tco_links_resolved_and_emoji_kept() {
        let thread = extract_thread(&fixture(), URL).unwrap();
        match &thread.blocks[0] {
            Block::Paragraph { inline_html, .. } => {
                assert!(inline_html.contains(r#"href="https://doc.rust-lang.org/book""#));
                assert!(inline_html.contains("🦀"));
            }
            other => panic!("expected paragraph, got {:?}", other),
        }
    }

    #[test]
    fn title_truncated() {
        let thread = extract_thread(&fixture(), URL).unwrap();
        assert!(thread.title.ends_with("..."));
        assert_eq!(thread.title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn wrong_owner_yields_none() {
        assert!(extract_thread(&fixture(), "https://x.com/nobody/status/1").is_none());
    }
}
