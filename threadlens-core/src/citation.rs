use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

const OPEN_TAG: &str = "<citations>";
const CLOSE_TAG: &str = "</citations>";

static CITATIONS_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<citations>(.*?)</citations>").expect("valid regex"));
static TRAILING_CITATIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<citations>.*$").expect("valid regex"));
static CITE_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[cite-([0-9]+)\]").expect("valid regex"));
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"));
static EXCESS_NEWLINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedCitations {
    pub citations: Vec<Citation>,
    pub clean_content: String,
}

/// Lines that are not valid JSON are skipped; the first citation seen for a
/// URL wins.
pub fn parse_citations(content: &str) -> ParsedCitations {
    if content.is_empty() {
        return ParsedCitations::default();
    }

    let mut citations = Vec::new();
    let mut seen_urls = HashSet::new();

    for captures in CITATIONS_BLOCK_RE.captures_iter(content) {
        let block = captures.get(1).map_or("", |m| m.as_str());
        for line in block.lines() {
            let trimmed = line.trim();
            if !trimmed.starts_with('{') {
                continue;
            }

            let Some(citation) = parse_citation_line(trimmed) else {
                continue;
            };

            if seen_urls.insert(citation.url.clone()) {
                citations.push(citation);
            } else {
                tracing::debug!(url = %citation.url, "dropping duplicate citation");
            }
        }
    }

    let mut clean_content = strip_citation_blocks(content).trim().to_string();

    if !citations.is_empty() {
        let by_id = citations
            .iter()
            .map(|citation| (citation.id.as_str(), citation))
            .collect::<HashMap<_, _>>();

        clean_content = CITE_PLACEHOLDER_RE
            .replace_all(&clean_content, |caps: &Captures<'_>| {
                let cite_id = format!("cite-{}", &caps[1]);
                match by_id.get(cite_id.as_str()) {
                    Some(citation) => format!("[{}]({})", link_text(citation), citation.url),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
    }

    ParsedCitations {
        citations,
        clean_content,
    }
}

fn parse_citation_line(line: &str) -> Option<Citation> {
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(%err, "skipping unparsable citation line");
            return None;
        }
    };

    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    // Ids may arrive as numbers; any non-zero number counts.
    let id = match value.get("id") {
        Some(Value::Number(number)) if number.as_f64().is_some_and(|n| n != 0.0) => {
            number.to_string()
        }
        _ => field("id"),
    };
    let url = field("url");
    if id.is_empty() || url.is_empty() {
        return None;
    }

    Some(Citation {
        id,
        title: field("title"),
        url,
        snippet: field("snippet"),
    })
}

fn link_text(citation: &Citation) -> Cow<'_, str> {
    if citation.title.is_empty() {
        Cow::Owned(extract_domain_from_url(&citation.url))
    } else {
        Cow::Borrowed(&citation.title)
    }
}

fn strip_citation_blocks(content: &str) -> String {
    let without_complete = CITATIONS_BLOCK_RE.replace_all(content, "");
    if without_complete.contains(OPEN_TAG) {
        TRAILING_CITATIONS_RE
            .replace(&without_complete, "")
            .into_owned()
    } else {
        without_complete.into_owned()
    }
}

pub fn build_citation_map(citations: &[Citation]) -> HashMap<&str, &Citation> {
    citations
        .iter()
        .map(|citation| (citation.url.as_str(), citation))
        .collect()
}

pub fn extract_domain_from_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            host.strip_prefix("www.").unwrap_or(host).to_string()
        }
        Err(_) => url.to_string(),
    }
}

pub fn is_citations_block_incomplete(content: &str) -> bool {
    content.contains(OPEN_TAG) && !content.contains(CLOSE_TAG)
}

pub fn remove_all_citations(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }

    let without_blocks = CITATIONS_BLOCK_RE.replace_all(content, "");
    let without_blocks = TRAILING_CITATIONS_RE.replace(&without_blocks, "");
    let without_placeholders = CITE_PLACEHOLDER_RE.replace_all(&without_blocks, "");

    let parsed = parse_citations(content);
    let citation_urls = parsed
        .citations
        .iter()
        .map(|citation| citation.url.as_str())
        .collect::<HashSet<_>>();

    let without_links =
        MARKDOWN_LINK_RE.replace_all(&without_placeholders, |caps: &Captures<'_>| {
            if citation_urls.contains(&caps[2]) {
                String::new()
            } else {
                caps[0].to_string()
            }
        });

    EXCESS_NEWLINES_RE
        .replace_all(&without_links, "\n\n")
        .trim()
        .to_string()
}
