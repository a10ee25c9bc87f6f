//! Element extraction from server-rendered HTML fragments.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][A-Za-z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("tag pattern")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:@][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern")
});

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern"));

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub outer_html: String,
    pub inner_html: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Visible text with tags stripped and whitespace collapsed.
    pub fn text(&self) -> String {
        plain_text(&self.inner_html)
    }
}

struct Tag<'a> {
    closing: bool,
    name: String,
    attrs: &'a str,
    start: usize,
    end: usize,
}

fn tags(html: &str) -> Vec<Tag<'_>> {
    TAG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Tag {
                closing: !caps[1].is_empty(),
                name: caps[2].to_ascii_lowercase(),
                attrs: caps.get(3).map(|m| m.as_str()).unwrap_or(""),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    let raw = raw.trim_end().trim_end_matches('/');
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), value)
        })
        .collect()
}

fn is_self_closing(tag: &Tag<'_>) -> bool {
    VOID_TAGS.contains(&tag.name.as_str()) || tag.attrs.trim_end().ends_with('/')
}

/// Top-level elements carrying `attr`, in document order. Matches nested
/// inside an earlier match are part of that match, not separate results.
pub fn elements_with_attr(html: &str, attr: &str) -> Vec<Element> {
    let cleaned = COMMENT_RE.replace_all(html, "");
    let html = cleaned.as_ref();
    let tags = tags(html);
    let mut out = Vec::new();
    let mut idx = 0;

    while idx < tags.len() {
        let open = &tags[idx];
        idx += 1;
        if open.closing {
            continue;
        }
        let attrs = parse_attrs(open.attrs);
        if !attrs.iter().any(|(key, _)| key.eq_ignore_ascii_case(attr)) {
            continue;
        }

        if is_self_closing(open) {
            out.push(Element {
                tag: open.name.clone(),
                attrs,
                outer_html: html[open.start..open.end].to_string(),
                inner_html: String::new(),
            });
            continue;
        }

        let mut depth = 1usize;
        let mut close = None;
        for (offset, tag) in tags[idx..].iter().enumerate() {
            if tag.name != open.name || (!tag.closing && is_self_closing(tag)) {
                continue;
            }
            if tag.closing {
                depth -= 1;
                if depth == 0 {
                    close = Some((offset, tag.start, tag.end));
                    break;
                }
            } else {
                depth += 1;
            }
        }

        let (inner_end, outer_end) = match close {
            Some((offset, start, end)) => {
                idx += offset + 1;
                (start, end)
            }
            None => {
                idx = tags.len();
                (html.len(), html.len())
            }
        };
        out.push(Element {
            tag: open.name.clone(),
            attrs,
            outer_html: html[open.start..outer_end].to_string(),
            inner_html: html[open.end..inner_end].to_string(),
        });
    }

    out
}

pub fn first_with_attr(html: &str, attr: &str) -> Option<Element> {
    elements_with_attr(html, attr).into_iter().next()
}

pub fn plain_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
