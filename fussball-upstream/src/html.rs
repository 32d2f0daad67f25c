//! Minimal HTML scanning for the fragments fussball.de serves.
//!
//! The pages of interest are flat: rows of cells, lists of links. Elements
//! are located with non-greedy patterns and never need a full DOM.

use std::sync::LazyLock;

use regex::Regex;

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("entity pattern"));
static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<([a-z][a-z0-9]*)\b([^>]*)>").expect("open tag pattern"));
static LOGO_FORMAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"format/\d+").expect("format pattern"));

/// An element found in a document: its attribute string and inner HTML.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Element<'a> {
    pub attrs: &'a str,
    pub inner: &'a str,
}

impl<'a> Element<'a> {
    /// Value of attribute `name`.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        attr(self.attrs, name)
    }

    /// Returns true if the element carries `class` among its classes.
    pub fn has_class(&self, class: &str) -> bool {
        has_class(self.attrs, class)
    }

    /// Text content, entities decoded and whitespace collapsed.
    pub fn text(&self) -> String {
        text(self.inner)
    }
}

/// All `<tag ...>...</tag>` elements of `html`, in document order.
///
/// Elements of the same tag must not nest.
pub(crate) fn elements<'a>(html: &'a str, tag: &str) -> Vec<Element<'a>> {
    let pattern = format!(r"(?is)<{tag}\b([^>]*)>(.*?)</{tag}\s*>", tag = regex::escape(tag));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|caps| {
            Some(Element {
                attrs: caps.get(1)?.as_str(),
                inner: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

/// First element of any tag carrying `class`, nesting-aware.
pub(crate) fn find_by_class<'a>(html: &'a str, class: &str) -> Option<Element<'a>> {
    for caps in OPEN_TAG.captures_iter(html) {
        let (Some(whole), Some(name), Some(attrs)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if !has_class(attrs.as_str(), class) {
            continue;
        }
        let start = whole.end();
        if attrs.as_str().ends_with('/') {
            return Some(Element { attrs: attrs.as_str(), inner: "" });
        }
        let tag = name.as_str().to_ascii_lowercase();
        let end = closing_index(&html[start..], &tag).map_or(html.len(), |i| start + i);
        return Some(Element {
            attrs: attrs.as_str(),
            inner: &html[start..end],
        });
    }
    None
}

/// Offset of the `</tag` closing the element whose content starts `rest`.
fn closing_index(rest: &str, tag: &str) -> Option<usize> {
    let lower = rest.to_ascii_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);
    let mut depth = 0usize;
    let mut at = 0;

    loop {
        let next_close = lower[at..].find(&close).map(|p| p + at)?;
        match lower[at..].find(&open).map(|p| p + at) {
            Some(next_open) if next_open < next_close => {
                depth += 1;
                at = next_open + open.len();
            }
            _ if depth == 0 => return Some(next_close),
            _ => {
                depth -= 1;
                at = next_close + close.len();
            }
        }
    }
}

/// Returns true if an attribute string lists `class` among its classes.
pub(crate) fn has_class(attrs: &str, class: &str) -> bool {
    attr(attrs, "class")
        .map(|classes| classes.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// Attribute strings of every `<tag ...>` opening (or void) tag.
pub(crate) fn open_tags<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    let pattern = format!(r"(?is)<{}\b([^>]*)>", regex::escape(tag));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Part of `html` starting at the element whose `id` is `id`.
pub(crate) fn from_id<'a>(html: &'a str, id: &str) -> Option<&'a str> {
    let needle = format!("id=\"{}\"", id);
    let at = html.find(&needle)?;
    let open = html[..at].rfind('<')?;
    Some(&html[open..])
}

/// Value of attribute `name` in an attribute string.
pub(crate) fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=", name);
    let mut offset = 0;
    while let Some(found) = attrs[offset..].find(&needle) {
        let start = offset + found;
        offset = start + needle.len();

        let boundary = attrs[..start]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace());
        if !boundary {
            continue;
        }

        let rest = &attrs[offset..];
        let quote = rest.chars().next()?;
        if quote == '"' || quote == '\'' {
            let value = &rest[1..];
            return value.find(quote).map(|end| &value[..end]);
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        return Some(&rest[..end]);
    }
    None
}

/// Text content of an HTML fragment.
pub(crate) fn text(fragment: &str) -> String {
    let stripped = TAGS.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(s: &str) -> String {
    let named = s
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures<'_>| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x').or_else(|| raw.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        };
        code.and_then(char::from_u32)
            // Private-use glyphs belong to obfuscated score fonts.
            .filter(|c| !('\u{E000}'..='\u{F8FF}').contains(c))
            .map(String::from)
            .unwrap_or_default()
    });
    numeric.replace("&amp;", "&")
}

/// Last path segment of a link, e.g. the id in `/mannschaft/x/-/mannschaft/ID`.
pub(crate) fn last_segment(href: &str) -> Option<&str> {
    href.trim_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
}

/// Makes a protocol-relative logo URL absolute and pins its image format.
pub(crate) fn normalize_logo_url(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    let absolute = match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    };
    LOGO_FORMAT.replace_all(&absolute, "format/9").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_lookup() {
        let attrs = r#" class="item big" data-id='42' href=/x/y data-class="no""#;
        assert_eq!(attr(attrs, "class"), Some("item big"));
        assert_eq!(attr(attrs, "data-id"), Some("42"));
        assert_eq!(attr(attrs, "href"), Some("/x/y"));
        assert_eq!(attr(attrs, "id"), None);
    }

    #[test]
    fn test_text_collapses_and_decodes() {
        assert_eq!(text("<p> Test&nbsp;Club <b>e.V.</b>\n</p>"), "Test Club e.V.");
        assert_eq!(text("A &amp; B"), "A & B");
        assert_eq!(text("<span>&#xE001;</span>:<span>&#xE002;</span>"), ":");
    }

    #[test]
    fn test_elements_has_class() {
        let html = r#"<tr class="a"><td>1</td></tr><tr class="b promotion"><td>2</td></tr>"#;
        let rows: Vec<_> = elements(html, "tr")
            .into_iter()
            .filter(|row| row.has_class("promotion"))
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text(), "2");
    }

    #[test]
    fn test_find_by_class_handles_nesting() {
        let html = r#"<div class="team-left"><div class="logo"></div><div class="team-name">FC A</div></div><div class="team-right">B</div>"#;
        let home = find_by_class(html, "team-left").unwrap();
        assert_eq!(home.text(), "FC A");
        assert_eq!(find_by_class(home.inner, "team-name").unwrap().text(), "FC A");
        assert!(find_by_class(html, "missing").is_none());
    }

    #[test]
    fn test_normalize_logo_url() {
        assert_eq!(
            normalize_logo_url("//media.fussball.de/logo/format/3/x.png"),
            "https://media.fussball.de/logo/format/9/x.png"
        );
        assert_eq!(normalize_logo_url(""), "");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/spiel/123/"), Some("123"));
        assert_eq!(last_segment("/"), None);
    }
}
