//! Just enough HTML scraping for the two provider pages: hidden form
//! fields, table bodies and cell text. Nested tables are not supported.

use regex::Regex;
use std::sync::OnceLock;

static INPUT_RE: OnceLock<Regex> = OnceLock::new();
static ATTR_RE: OnceLock<Regex> = OnceLock::new();
static TABLE_RE: OnceLock<Regex> = OnceLock::new();
static CELL_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn input_re() -> &'static Regex {
    INPUT_RE.get_or_init(|| Regex::new(r"(?is)<input\b[^>]*>").expect("static regex"))
}

fn attr_re() -> &'static Regex {
    ATTR_RE.get_or_init(|| {
        Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("static regex")
    })
}

fn table_re() -> &'static Regex {
    TABLE_RE.get_or_init(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table>").expect("static regex"))
}

fn cell_re() -> &'static Regex {
    CELL_RE.get_or_init(|| Regex::new(r"(?is)<t[dh]\b[^>]*>(.*?)</t[dh]>").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

/// Value of the `<input name="{name}">` element, entity-decoded.
pub fn input_value(html: &str, name: &str) -> Option<String> {
    input_re().find_iter(html).find_map(|tag| {
        let attrs = attributes(tag.as_str());
        let matches = attrs
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("name") && v == name);
        if !matches {
            return None;
        }
        attrs
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("value"))
            .map(|(_, v)| decode_entities(&v))
    })
}

fn attributes(tag: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(tag)
        .map(|c| {
            let value = c
                .get(2)
                .or_else(|| c.get(3))
                .or_else(|| c.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            (c[1].to_string(), value.to_string())
        })
        .collect()
}

/// Inner HTML of every `<table>` in document order.
pub fn tables(html: &str) -> Vec<&str> {
    table_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Visible text of every `<td>`/`<th>` cell, trimmed.
pub fn cell_texts(table: &str) -> Vec<String> {
    cell_re()
        .captures_iter(table)
        .map(|c| {
            let inner = c.get(1).map(|m| m.as_str()).unwrap_or("");
            decode_entities(tag_re().replace_all(inner, "").trim())
        })
        .collect()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
