//! Image URL extraction from free-form text
//!
//! Recognizes markdown image links (`![alt](https://...)`) and bare
//! `http(s)://` links. Every candidate is validated with [`url::Url`] and
//! must carry an http(s) scheme and a host.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

// The link may hold one level of balanced parentheses, e.g. `File_(1).png`
static MARKDOWN_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"!\[[^\]]*\]\(\s*((?i:https?)://(?:[^\s()]|\([^\s()]*\))+)(?:\s+"[^"]*")?\s*\)"#,
    )
    .expect("markdown image regex")
});

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i:https?)://[^\s"'<>]+"#).expect("bare url regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlRejection {
    #[error("not a valid URL: {0}")]
    Malformed(String),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,
}

/// A link that passed structural validation and is eligible for download
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateUrl {
    raw: String,
    url: Url,
}

impl CandidateUrl {
    pub fn parse(raw: &str) -> Result<Self, UrlRejection> {
        let url = Url::parse(raw).map_err(|e| UrlRejection::Malformed(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(UrlRejection::UnsupportedScheme(url.scheme().to_string()));
        }

        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(UrlRejection::MissingHost),
        }

        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    /// The text exactly as it appeared in the input
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for CandidateUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A candidate dropped during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedUrl {
    pub raw: String,
    pub reason: UrlRejection,
}

/// Result of scanning one piece of text
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Unique candidates in order of first appearance
    pub candidates: Vec<CandidateUrl>,
    pub rejected: Vec<RejectedUrl>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Extract and validate image links from `text`
pub fn extract(text: &str) -> Extraction {
    let mut found: Vec<(usize, &str)> = Vec::new();
    let mut markdown_spans: Vec<Range<usize>> = Vec::new();

    for caps in MARKDOWN_IMAGE.captures_iter(text) {
        if let (Some(whole), Some(link)) = (caps.get(0), caps.get(1)) {
            markdown_spans.push(whole.range());
            found.push((link.start(), link.as_str()));
        }
    }

    for m in BARE_URL.find_iter(text) {
        if markdown_spans.iter().any(|span| span.contains(&m.start())) {
            continue;
        }
        let link = trim_trailing(m.as_str());
        if !link.is_empty() {
            found.push((m.start(), link));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    let mut extraction = Extraction::default();

    for (_, raw) in found {
        if !seen.insert(raw) {
            continue;
        }
        match CandidateUrl::parse(raw) {
            Ok(candidate) => extraction.candidates.push(candidate),
            Err(reason) => {
                tracing::debug!(url = raw, %reason, "Dropping invalid candidate");
                extraction.rejected.push(RejectedUrl {
                    raw: raw.to_string(),
                    reason,
                });
            }
        }
    }

    extraction
}

/// Strip sentence punctuation and an unbalanced closing paren
fn trim_trailing(mut link: &str) -> &str {
    loop {
        if let Some(stripped) = link.strip_suffix(TRAILING_PUNCTUATION) {
            link = stripped;
        } else if link.ends_with(')') && link.matches(')').count() > link.matches('(').count() {
            link = &link[..link.len() - 1];
        } else {
            return link;
        }
    }
}
