//! Shared evidence checks used by the protocol probes.
//!
//! Headers are looked up case-insensitively. HTML is not fully parsed: the
//! handful of tags the probes care about (`<script>`, `<meta>` and `data-*`
//! attributes on any start tag) are pulled out with regexes, which is enough
//! for presence heuristics and tolerant of broken markup.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde_json::{Map, Value};

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").unwrap());

static META_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b([^>]*)>").unwrap());

static START_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[a-zA-Z][a-zA-Z0-9-]*(\s[^>]*)>").unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .unwrap()
});

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Trimmed, non-empty header value, looked up case-insensitively.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name.to_ascii_lowercase().as_str())?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn has_header(headers: &HeaderMap, name: &str) -> bool {
    header_value(headers, name).is_some()
}

pub fn has_all_headers(headers: &HeaderMap, names: &[&str]) -> bool {
    names.iter().all(|n| has_header(headers, n))
}

pub fn header_matches(headers: &HeaderMap, name: &str, pattern: &Regex) -> bool {
    header_value(headers, name).is_some_and(|v| pattern.is_match(v))
}

/// Header value shaped `YYYY-MM-DD`, as date-versioned APIs send.
pub fn header_is_iso_date(headers: &HeaderMap, name: &str) -> bool {
    header_matches(headers, name, &ISO_DATE)
}

pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("json"))
}

// ---------------------------------------------------------------------------
// JSON manifests
// ---------------------------------------------------------------------------

pub fn parse_json(body: &str) -> Option<Value> {
    serde_json::from_str(body.trim_start_matches('\u{feff}').trim()).ok()
}

/// Parse `body` as a JSON object carrying at least one of `required_any`.
///
/// Unparseable bodies, non-object JSON and objects without any of the keys
/// all mean "no manifest here". An empty key list accepts any object.
pub fn parse_manifest(body: &str, required_any: &[&str]) -> Option<Map<String, Value>> {
    match parse_json(body)? {
        Value::Object(map)
            if required_any.is_empty() || required_any.iter().any(|k| map.contains_key(*k)) =>
        {
            Some(map)
        }
        _ => None,
    }
}

pub fn array_len(map: &Map<String, Value>, key: &str) -> usize {
    map.get(key).and_then(Value::as_array).map_or(0, Vec::len)
}

pub fn has_non_empty_array(map: &Map<String, Value>, key: &str) -> bool {
    array_len(map, key) > 0
}

/// String-ish field: strings verbatim, numbers rendered, everything else `None`.
pub fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTag {
    pub src: Option<String>,
    pub inline: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaTag {
    pub name: Option<String>,
    pub property: Option<String>,
    pub content: Option<String>,
}

/// The parts of an HTML page the probes look at.
#[derive(Debug, Clone, Default)]
pub struct HtmlDocument {
    pub scripts: Vec<ScriptTag>,
    pub metas: Vec<MetaTag>,
    /// `(name, value)` of every `data-*` attribute on any start tag.
    pub data_attributes: Vec<(String, String)>,
    lowered: String,
}

impl HtmlDocument {
    pub fn parse(html: &str) -> Self {
        let scripts = SCRIPT_TAG
            .captures_iter(html)
            .map(|cap| {
                let attrs = cap.get(1).map_or("", |m| m.as_str());
                ScriptTag {
                    src: attribute(attrs, "src"),
                    inline: cap.get(2).map_or("", |m| m.as_str()).to_string(),
                }
            })
            .collect();

        let metas = META_TAG
            .captures_iter(html)
            .map(|cap| {
                let attrs = cap.get(1).map_or("", |m| m.as_str());
                MetaTag {
                    name: attribute(attrs, "name"),
                    property: attribute(attrs, "property"),
                    content: attribute(attrs, "content"),
                }
            })
            .collect();

        let data_attributes = START_TAG
            .captures_iter(html)
            .filter_map(|cap| cap.get(1))
            .flat_map(|attrs| attributes(attrs.as_str()))
            .filter(|(name, _)| name.starts_with("data-"))
            .collect();

        Self {
            scripts,
            metas,
            data_attributes,
            lowered: html.to_lowercase(),
        }
    }

    /// First external script whose `src` contains one of `needles`, case-insensitively.
    pub fn script_src_matching(&self, needles: &[&str]) -> Option<&str> {
        self.scripts
            .iter()
            .filter_map(|s| s.src.as_deref())
            .find(|src| contains_any_ci(src, needles).is_some())
    }

    /// First of `tokens` appearing literally in an inline script body.
    pub fn inline_script_token(&self, tokens: &[&'static str]) -> Option<&'static str> {
        tokens.iter().copied().find(|token| {
            self.scripts
                .iter()
                .filter(|s| s.src.is_none())
                .any(|s| s.inline.contains(token))
        })
    }

    /// Meta tags whose `name` equals one of `names`, ignoring ASCII case.
    pub fn meta_named(&self, names: &[&str]) -> Vec<&MetaTag> {
        self.metas
            .iter()
            .filter(|m| {
                m.name
                    .as_deref()
                    .is_some_and(|n| names.iter().any(|want| n.trim().eq_ignore_ascii_case(want)))
            })
            .collect()
    }

    /// Meta tags whose `name` or `property` contains `needle`, case-insensitively.
    pub fn meta_containing(&self, needle: &str) -> Vec<&MetaTag> {
        let needle = needle.to_lowercase();
        self.metas
            .iter()
            .filter(|m| {
                [m.name.as_deref(), m.property.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|v| v.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn data_attributes_with_prefix(&self, prefix: &str) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.data_attributes {
            if name.starts_with(prefix) && !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        names
    }

    /// First of `needles` (lower-case) found anywhere in the lower-cased page.
    pub fn body_contains(&self, needles: &[&'static str]) -> Option<&'static str> {
        needles.iter().copied().find(|n| self.lowered.contains(n))
    }
}

fn attributes(attrs: &str) -> impl Iterator<Item = (String, String)> + '_ {
    ATTRIBUTE.captures_iter(attrs).map(|cap| {
        let name = cap[1].to_ascii_lowercase();
        let value = cap
            .get(2)
            .or_else(|| cap.get(3))
            .or_else(|| cap.get(4))
            .map_or("", |m| m.as_str())
            .to_string();
        (name, value)
    })
}

fn attribute(attrs: &str, wanted: &str) -> Option<String> {
    attributes(attrs)
        .find(|(name, _)| name == wanted)
        .map(|(_, value)| value)
}

fn contains_any_ci(haystack: &str, needles: &[&str]) -> Option<usize> {
    let hay = haystack.to_lowercase();
    needles
        .iter()
        .position(|n| hay.contains(&n.to_lowercase()))
}
