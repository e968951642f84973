use scraper::{ElementRef, Html, Node};
use serde::Serialize;

use super::extract::ContentRoot;
use crate::utils::{count_words, element_text, escape_html, has_class, norm_ws};

const MATH_BLOCK_CLASSES: &[&str] = &[
    "katex", "katex-display", "katex-html", "MathJax", "MathJax_Display", "mjx-container",
];
const MATH_WRAPPER_CLASSES: &[&str] = &["report-math-block", "math-display", "equation-block"];
const MATH_CHILD_CLASSES: &[&str] = &["katex", "katex-display", "MathJax"];
const LAZY_SRC_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub text: String,
    pub inline_html: String,
}

/// One semantic unit of extracted content.
///
/// `inline_html` only ever holds escaped text, `<a href>` and `<br>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { text: String, inline_html: String },
    List { ordered: bool, items: Vec<ListItem> },
    Quote { text: String, inline_html: String },
    Code { text: String },
    Image { src: String, alt: String, caption: Option<String> },
    Math { markup: String, text: String },
}

impl Block {
    pub fn paragraph(text: &str) -> Self {
        Block::Paragraph {
            text: text.to_string(),
            inline_html: escape_html(text),
        }
    }

    /// Plain-text form used for word counts and LLM context. Images have none.
    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading { text, .. }
            | Block::Paragraph { text, .. }
            | Block::Quote { text, .. }
            | Block::Code { text }
            | Block::Math { text, .. } => text.clone(),
            Block::List { items, .. } => items
                .iter()
                .map(|i| i.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            Block::Image { .. } => String::new(),
        }
    }

    pub fn word_count(&self) -> usize {
        count_words(&self.plain_text())
    }
}

/// Walk the cleaned content root and emit blocks in document order.
pub fn parse_content(root: &ContentRoot) -> Vec<Block> {
    let fragment = Html::parse_fragment(&root.html);
    let mut blocks = Vec::new();
    visit_children(fragment.root_element(), &mut blocks);
    blocks
}

fn visit_children(el: ElementRef, blocks: &mut Vec<Block>) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                let text = norm_ws(t);
                if !text.is_empty() {
                    blocks.push(Block::paragraph(&text));
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    visit(child, blocks);
                }
            }
            _ => {}
        }
    }
}

fn visit(el: ElementRef, blocks: &mut Vec<Block>) {
    if is_math_block(&el) {
        let markup = el.html();
        if !markup.is_empty() {
            blocks.push(Block::Math {
                markup,
                text: element_text(&el),
            });
        }
        return;
    }

    let name = el.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let text = element_text(&el);
            if !text.is_empty() {
                let level = name[1..].parse().unwrap_or(6);
                blocks.push(Block::Heading { level, text });
            }
        }
        "ul" | "ol" => {
            let items: Vec<ListItem> = el
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|li| li.value().name() == "li")
                .filter_map(|li| {
                    let text = element_text(&li);
                    (!text.is_empty()).then(|| ListItem {
                        text,
                        inline_html: inline_html(&li, false),
                    })
                })
                .collect();
            if !items.is_empty() {
                blocks.push(Block::List {
                    ordered: name == "ol",
                    items,
                });
            }
        }
        "pre" | "code" => {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                blocks.push(Block::Code { text });
            }
        }
        "blockquote" => {
            push_embedded_images(&el, blocks);
            let text = element_text(&el);
            if !text.is_empty() {
                blocks.push(Block::Quote {
                    text,
                    inline_html: inline_html(&el, false),
                });
            }
        }
        "img" => {
            if let Some(image) = image_block(&el, None) {
                blocks.push(image);
            }
        }
        "figure" => {
            let caption = el
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|c| c.value().name() == "figcaption")
                .map(|c| element_text(&c))
                .filter(|c| !c.is_empty());
            let image = el
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|c| c.value().name() == "img")
                .find_map(|img| image_block(&img, caption.clone()));
            match image {
                Some(image) => blocks.push(image),
                None => visit_children(el, blocks),
            }
        }
        "p" => {
            push_embedded_images(&el, blocks);
            let text = element_text(&el);
            if !text.is_empty() {
                blocks.push(Block::Paragraph {
                    text,
                    inline_html: inline_html(&el, false),
                });
            }
        }
        _ => visit_children(el, blocks),
    }
}

/// Known math renderings, MathML, or a small wrapper around one.
pub(crate) fn is_math_block(el: &ElementRef) -> bool {
    if MATH_BLOCK_CLASSES.iter().any(|c| has_class(el, c)) {
        return true;
    }
    if el
        .value()
        .attr("data-testid")
        .is_some_and(|t| t.contains("katex"))
    {
        return true;
    }
    if MATH_WRAPPER_CLASSES.iter().any(|c| has_class(el, c)) {
        return true;
    }
    if el.value().name() == "math" {
        return true;
    }

    let children: Vec<ElementRef> = el.children().filter_map(ElementRef::wrap).collect();
    if children.len() <= 3 {
        if let Some(first) = children.first() {
            return MATH_CHILD_CLASSES.iter().any(|c| has_class(first, c));
        }
    }
    false
}

fn push_embedded_images(el: &ElementRef, blocks: &mut Vec<Block>) {
    for img in el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "img")
    {
        if let Some(image) = image_block(&img, None) {
            blocks.push(image);
        }
    }
}

/// Resolve an image source, following lazy-loading fallbacks; drops 1x1 pixels.
pub(crate) fn image_block(img: &ElementRef, caption: Option<String>) -> Option<Block> {
    let attrs = img.value();
    if attrs.attr("width") == Some("1") && attrs.attr("height") == Some("1") {
        return None;
    }

    let src = attrs
        .attr("src")
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with("data:"));
    let lazy = LAZY_SRC_ATTRS
        .iter()
        .find_map(|a| attrs.attr(a))
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let srcset = attrs
        .attr("srcset")
        .or_else(|| attrs.attr("data-srcset"))
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.split_whitespace().next());

    let src = src.or(lazy).or(srcset)?;
    Some(Block::Image {
        src: src.to_string(),
        alt: attrs.attr("alt").unwrap_or("").trim().to_string(),
        caption,
    })
}

/// Escaped text with anchors and line breaks preserved. With `emoji_alt`, images
/// contribute their alt text (emoji are rendered as images on some sites).
pub(crate) fn inline_html(el: &ElementRef, emoji_alt: bool) -> String {
    let mut out = String::new();
    write_inline(el, emoji_alt, &mut out);
    norm_ws(&out)
}

fn write_inline(el: &ElementRef, emoji_alt: bool, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(&escape_html(t)),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                match child.value().name() {
                    "a" => write_anchor(&child, out),
                    "br" => out.push_str("<br>"),
                    "img" if emoji_alt => {
                        out.push_str(&escape_html(child.value().attr("alt").unwrap_or("")))
                    }
                    "img" => {}
                    _ => write_inline(&child, emoji_alt, out),
                }
            }
            _ => {}
        }
    }
}

fn write_anchor(a: &ElementRef, out: &mut String) {
    let text = a.text().collect::<String>();
    let mut href = a.value().attr("href").unwrap_or("").trim().to_string();

    // Shortened t.co links: prefer the expanded URL shown to the reader.
    if href.contains("t.co/") {
        let shown = a
            .value()
            .attr("title")
            .map(str::to_string)
            .unwrap_or_else(|| norm_ws(&text));
        if shown.starts_with("http") {
            href = shown;
        }
    }

    if href.is_empty() || href.to_ascii_lowercase().starts_with("javascript:") {
        out.push_str(&escape_html(&text));
        return;
    }
    out.push_str(&format!(
        "<a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a>",
        escape_html(&href),
        escape_html(&text)
    ));
}
