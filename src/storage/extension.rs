//! File extension inference from response metadata
//!
//! Sources are tried in order: `Content-Disposition` filename, URL path,
//! `Content-Type`. The first source that yields a suffix decides; an
//! implausible suffix (too long, odd characters) falls back to `.jpg`.

use url::Url;

pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Longest accepted suffix, dot included
pub const MAX_EXTENSION_LEN: usize = 5;

/// Substrings of a media type and the suffix they map to, checked in order
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("jpeg", ".jpg"),
    ("jpg", ".jpg"),
    ("png", ".png"),
    ("gif", ".gif"),
    ("webp", ".webp"),
    ("avif", ".avif"),
    ("bmp", ".bmp"),
    ("svg", ".svg"),
];

/// Response headers the resolver looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Pick the extension (with leading dot) for an image fetched from `url`
pub fn resolve_extension(url: &Url, meta: &ResponseMeta) -> String {
    let resolved = meta
        .content_disposition
        .as_deref()
        .and_then(parse_content_disposition_filename)
        .and_then(|name| suffix_of(&name))
        .or_else(|| url_suffix(url))
        .or_else(|| meta.content_type.as_deref().and_then(content_type_suffix));

    match resolved {
        Some(ext) if is_plausible(&ext) => ext.to_ascii_lowercase(),
        Some(ext) => {
            tracing::debug!(%url, ext, "Discarding implausible extension");
            DEFAULT_EXTENSION.to_string()
        }
        None => DEFAULT_EXTENSION.to_string(),
    }
}

fn is_plausible(ext: &str) -> bool {
    ext.len() <= MAX_EXTENSION_LEN
        && ext.len() > 1
        && ext[1..].chars().all(|c| c.is_ascii_alphanumeric())
}

fn url_suffix(url: &Url) -> Option<String> {
    url.path_segments()?.next_back().and_then(suffix_of)
}

fn content_type_suffix(content_type: &str) -> Option<String> {
    let essence = content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str().to_ascii_lowercase())
        .unwrap_or_else(|_| content_type.to_ascii_lowercase());

    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(needle, _)| essence.contains(needle))
        .map(|(_, ext)| ext.to_string())
}

/// Suffix of the final path component, dot included
///
/// Leading dots do not start a suffix (`.hidden` has none) and a bare
/// trailing dot is not a suffix either.
fn suffix_of(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem_start = base.len() - base.trim_start_matches('.').len();
    let dot = base[stem_start..].rfind('.')? + stem_start;
    let suffix = &base[dot..];

    (suffix.len() > 1).then(|| suffix.to_string())
}

/// Filename from a raw `Content-Disposition` value
///
/// Handles quoted and token `filename=` and RFC 5987 `filename*=`; the
/// extended form wins when both are present.
pub fn parse_content_disposition_filename(header_value: &str) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in header_value.split(';') {
        let Some((name, value)) = param.trim().split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();

        match name.as_str() {
            "filename*" => {
                let encoded = value
                    .split_once("''")
                    .map(|(_charset, rest)| rest)
                    .unwrap_or(value);
                let decoded = percent_decode(encoded.trim_matches('"'));
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
            "filename" => {
                let unquoted = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .map(unescape_quoted)
                    .unwrap_or_else(|| value.to_string());
                if !unquoted.is_empty() {
                    plain = Some(unquoted);
                }
            }
            _ => {}
        }
    }

    plain
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
