use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info};

use crate::error::ReaderError;
use crate::utils::{class_and_id, element_text, escape_html, has_class, norm_ws};

static UNLIKELY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)-ad-|ai2html|banner|breadcrumbs|combx|comment|community|cover-wrap|disqus|extra|footer|gdpr|header|legends|menu|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|yom-hierarchical-navigation").unwrap()
});
static MAYBE_CANDIDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)and|article|body|column|content|main|shadow").unwrap());
static POSITIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|body|content|entry|hentry|h-entry|main|page|pagination|post|text|blog|story").unwrap()
});
static NEGATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)hidden|^hid$| hid$| hid |^hid |banner|combx|comment|com-|contact|foot|footer|footnote|gdpr|masthead|media|meta|outbrain|promo|related|scroll|share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|tool|widget").unwrap()
});
static DISPLAY_NONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)display\s*:\s*none").unwrap());

static SEMANTIC_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"article, [role="article"], main, [role="main"]"#).unwrap()
});
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static OG_TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static DESCRIPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static OG_DESCRIPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());

const MIN_PARAGRAPH_CHARS: usize = 25;

const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "button", "input", "textarea", "select",
    "nav", "aside", "footer", "header",
];
const TABLE_TAGS: &[&str] = &["table", "thead", "tbody", "tr", "th", "td"];
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];
const MATH_CLASSES: &[&str] = &[
    "katex", "katex-display", "katex-html", "katex-mathml", "math", "MathJax",
    "MathJax_Display", "mjx-container",
];

/// The cleaned main-content subtree, serialized.
#[derive(Debug, Clone)]
pub struct ContentRoot {
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Article {
    pub title: String,
    pub excerpt: String,
    pub content: ContentRoot,
}

pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}

/// Locate the main article body of a page and return it cleaned, with title and excerpt.
pub fn extract_article(doc: &Html) -> Result<Article, ReaderError> {
    let title = article_title(doc);
    let excerpt = article_excerpt(doc);

    let root = match doc.select(&SEMANTIC_SEL).next() {
        Some(el) => {
            debug!("Using semantic <{}> element as content root", el.value().name());
            Some(el)
        }
        None => best_candidate(doc).or_else(|| doc.select(&BODY_SEL).next()),
    };
    let root = root.ok_or(ReaderError::NoArticleFound)?;

    let content = clean(root);
    if content.text.is_empty() {
        return Err(ReaderError::NoArticleFound);
    }

    info!(
        "Extracted article \"{}\" ({} chars of text)",
        title,
        content.text.chars().count()
    );
    Ok(Article {
        title,
        excerpt,
        content,
    })
}

struct Candidate<'a> {
    element: ElementRef<'a>,
    paragraphs: usize,
    text_len: usize,
}

/// Score every parent of a qualifying paragraph; highest score wins, ties keep the first.
fn best_candidate(doc: &Html) -> Option<ElementRef<'_>> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut index = HashMap::new();

    for p in doc.select(&P_SEL) {
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        if matches!(parent.value().name(), "html" | "body") {
            continue;
        }
        if is_unlikely(&class_and_id(&parent)) {
            continue;
        }

        let text_len = p.text().collect::<String>().trim().chars().count();
        if text_len < MIN_PARAGRAPH_CHARS {
            continue;
        }

        let slot = *index.entry(parent.id()).or_insert_with(|| {
            candidates.push(Candidate {
                element: parent,
                paragraphs: 0,
                text_len: 0,
            });
            candidates.len() - 1
        });
        candidates[slot].paragraphs += 1;
        candidates[slot].text_len += text_len;
    }

    let mut best: Option<ElementRef> = None;
    let mut best_score = 0.0;
    for c in &candidates {
        let score = candidate_score(c.paragraphs, c.text_len, &class_and_id(&c.element));
        if score > best_score {
            best_score = score;
            best = Some(c.element);
        }
    }

    if let Some(el) = best {
        debug!(
            "Best candidate <{}> scored {:.2} of {} candidates",
            el.value().name(),
            best_score,
            candidates.len()
        );
    }
    best
}

pub(crate) fn candidate_score(paragraphs: usize, text_len: usize, class_id: &str) -> f64 {
    let mut score = paragraphs as f64 + text_len as f64 / 100.0;
    if POSITIVE_RE.is_match(class_id) {
        score *= 1.5;
    }
    if NEGATIVE_RE.is_match(class_id) {
        score *= 0.5;
    }
    score
}

fn is_unlikely(class_id: &str) -> bool {
    UNLIKELY_RE.is_match(class_id) && !MAYBE_CANDIDATE_RE.is_match(class_id)
}

/// Elements rendered by KaTeX/MathJax keep their inline styles and hidden parts.
fn is_math_element(el: &ElementRef) -> bool {
    if el.value().name() == "math" {
        return true;
    }
    if MATH_CLASSES.iter().any(|c| has_class(el, c)) {
        return true;
    }
    let class = el.value().attr("class").unwrap_or("");
    if class.contains("katex") || class.contains("math") || class.contains("MathJax") {
        return true;
    }
    el.value()
        .attr("data-testid")
        .is_some_and(|t| t.contains("katex"))
}

fn is_hidden(el: &ElementRef) -> bool {
    el.value().attr("hidden").is_some()
        || el
            .value()
            .attr("style")
            .is_some_and(|s| DISPLAY_NONE_RE.is_match(s))
}

fn clean(root: ElementRef) -> ContentRoot {
    let mut html = String::new();
    let mut text = String::new();
    let in_math = is_math_element(&root);
    write_children(root, in_math, &mut html, &mut text);
    ContentRoot {
        html,
        text: norm_ws(&text),
    }
}

fn write_children(el: ElementRef, in_math: bool, html: &mut String, text: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                html.push_str(&escape_html(t));
                text.push_str(t);
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, in_math, html, text);
                }
            }
            _ => {}
        }
    }
}

fn write_element(el: ElementRef, in_math: bool, html: &mut String, text: &mut String) {
    let name = el.value().name();
    if STRIPPED_TAGS.contains(&name) {
        return;
    }

    let math = in_math || is_math_element(&el);
    if !math && (is_hidden(&el) || is_unlikely(&class_and_id(&el))) {
        return;
    }

    let keep_style = math || TABLE_TAGS.contains(&name);
    html.push('<');
    html.push_str(name);
    for (key, value) in el.value().attrs() {
        if key == "style" && !keep_style {
            continue;
        }
        html.push_str(&format!(" {}=\"{}\"", key, escape_html(value)));
    }
    html.push('>');

    if VOID_TAGS.contains(&name) {
        return;
    }

    write_children(el, math, html, text);
    // Keep adjacent block texts from running together in the flattened text.
    text.push(' ');
    html.push_str(&format!("</{}>", name));
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

fn first_content_attr(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(norm_ws)
        .filter(|t| !t.is_empty())
}

/// `<h1>` matching the document title, else `og:title`, else the document title.
fn article_title(doc: &Html) -> String {
    let doc_title = first_text(doc, &TITLE_SEL).unwrap_or_default();

    if let Some(h1) = first_text(doc, &H1_SEL) {
        if titles_match(&h1, &doc_title) {
            return h1;
        }
    }
    if let Some(og) = first_content_attr(doc, &OG_TITLE_SEL) {
        return og;
    }
    doc_title
}

fn titles_match(h1: &str, doc_title: &str) -> bool {
    if doc_title.is_empty() {
        return false;
    }
    let h1 = h1.to_lowercase();
    let doc_title = doc_title.to_lowercase();
    doc_title.contains(&h1) || h1.contains(&doc_title)
}

fn article_excerpt(doc: &Html) -> String {
    first_content_attr(doc, &DESCRIPTION_SEL)
        .or_else(|| first_content_attr(doc, &OG_DESCRIPTION_SEL))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Result<Article, ReaderError> {
        extract_article(&parse_document(html))
    }

    #[test]
    fn semantic_fast_path() {
        let html = r#"<html><body><div class="sidebar"><p>Sidebar text that is long enough to count.</p></div>
            <main><h2>Intro</h2><p>Body paragraph.</p></main></body></html>"#;
        let article = extract(html).unwrap();
        assert!(article.content.text.contains("Body paragraph."));
        assert!(!article.content.text.contains("Sidebar"));
    }

    #[test]
    fn scoring_prefers_dense_content() {
        let html = std::fs::read_to_string("tests/fixtures/scored.html").unwrap();
        let article = extract(&html).unwrap();
        assert!(article.content.text.contains("The first real paragraph"));
        assert!(!article.content.text.contains("Related links promo"));
        assert!(!article.content.text.contains("console.log"));
    }

    #[test]
    fn unlikely_candidates_excluded_unless_rescued() {
        let html = r#"<html><body>
            <div class="disqus"><p>This comment thread text is long enough to be scored.</p>
            <p>Another long comment paragraph that should never be chosen.</p>
            <p>And a third long comment paragraph for a high raw score.</p></div>
            <div class="story"><p>The real story paragraph is also long enough.</p></div>
            </body></html>"#;
        let article = extract(html).unwrap();
        assert!(article.content.text.contains("real story"));
        assert!(!article.content.text.contains("comment thread"));
    }

    #[test]
    fn unlikely_descendants_removed_from_root() {
        let html = r#"<html><body><article>
            <p>Main story text.</p>
            <div class="comment-list"><p>First!</p></div>
            <div class="sidebar content"><p>Rescued aside.</p></div>
            <div class="math-footer">x + y = z</div>
            <span class="katex"><span class="related">a^2</span></span>
            </article></body></html>"#;
        let text = extract(html).unwrap().content.text;
        assert!(text.contains("Main story text."));
        assert!(!text.contains("First!"));
        assert!(text.contains("Rescued aside."));
        assert!(text.contains("x + y = z"));
        assert!(text.contains("a^2"));
    }

    #[test]
    fn score_multipliers() {
        assert_eq!(candidate_score(2, 300, ""), 5.0);
        assert_eq!(candidate_score(2, 300, "post-body"), 7.5);
        assert_eq!(candidate_score(2, 300, "widget"), 2.5);
    }

    #[test]
    fn ties_keep_first() {
        let html = r#"<html><body>
            <div id="a"><p>Exactly the same paragraph text here, twice.</p></div>
            <div id="b"><p>Exactly the same paragraph text here, twice.</p></div>
            </body></html>"#;
        let article = extract(html).unwrap();
        assert!(article.content.html.contains("Exactly the same"));
        // only the first div's paragraph is in the content
        assert_eq!(article.content.html.matches("Exactly").count(), 1);
    }

    #[test]
    fn cleaning_strips_styles_and_hidden() {
        let html = r#"<html><body><article>
            <p style="color: red">Visible text.</p>
            <p hidden>Hidden text.</p>
            <div style="display: none">Also hidden.</div>
            <table style="width: 100%"><tr><td>cell</td></tr></table>
            <span class="katex" style="height: 1em"><span aria-hidden="true" style="display:none">x^2</span></span>
            <nav>Menu</nav><script>var a = 1;</script>
            </article></body></html>"#;
        let article = extract(html).unwrap();
        let content = &article.content;
        assert!(content.html.contains("<p>Visible text.</p>"));
        assert!(!content.text.contains("Hidden text"));
        assert!(!content.text.contains("Also hidden"));
        assert!(content.html.contains(r#"<table style="width: 100%">"#));
        assert!(content.html.contains(r#"style="height: 1em""#));
        assert!(content.text.contains("x^2"));
        assert!(!content.text.contains("Menu"));
        assert!(!content.text.contains("var a"));
    }

    #[test]
    fn title_resolution() {
        let matching = r#"<html><head><title>Great Essay | Site</title>
            <meta property="og:title" content="OG Title"></head>
            <body><article><h1>Great Essay</h1><p>text</p></article></body></html>"#;
        assert_eq!(extract(matching).unwrap().title, "Great Essay");

        let og = r#"<html><head><title>Site</title>
            <meta property="og:title" content="OG Title"></head>
            <body><article><h1>Unrelated</h1><p>text</p></article></body></html>"#;
        assert_eq!(extract(og).unwrap().title, "OG Title");

        let plain = r#"<html><head><title>Doc Title</title></head>
            <body><article><p>text</p></article></body></html>"#;
        assert_eq!(extract(plain).unwrap().title, "Doc Title");
    }

    #[test]
    fn excerpt_from_meta() {
        let html = r#"<html><head><meta property="og:description" content="OG desc">
            </head><body><article><p>text</p></article></body></html>"#;
        assert_eq!(extract(html).unwrap().excerpt, "OG desc");
    }

    #[test]
    fn empty_page_is_no_article() {
        let html = "<html><body><script>only()</script><nav>links</nav></body></html>";
        assert_eq!(extract(html).unwrap_err(), ReaderError::NoArticleFound);
    }
}
