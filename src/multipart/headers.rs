//! Parameterised header values (`Content-Type`, `Content-Disposition`).

use super::MultipartError;

/// A header value split into its main token and `key=value` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValue {
    pub value: String,
    pub params: Vec<(String, String)>,
}

impl HeaderValue {
    pub fn parse(raw: &str) -> Self {
        let mut parts = split_unquoted(raw, ';').into_iter();
        let value = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let params = parts
            .filter_map(|part| {
                let (key, val) = part.split_once('=')?;
                Some((key.trim().to_ascii_lowercase(), unquote(val.trim())))
            })
            .collect();
        Self { value, params }
    }

    /// Parameter lookup; keys are case-insensitive.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Extract the boundary token from a multipart `Content-Type`.
pub fn boundary(content_type: &str) -> Result<String, MultipartError> {
    let parsed = HeaderValue::parse(content_type);
    if !parsed.value.starts_with("multipart/") {
        return Err(MultipartError::InvalidContentType(content_type.to_string()));
    }
    match parsed.param("boundary") {
        Some(b) if !b.is_empty() => Ok(b.to_string()),
        _ => Err(MultipartError::InvalidContentType(content_type.to_string())),
    }
}

/// Split on `sep` outside of double quotes.
fn split_unquoted(raw: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                out.push(&raw[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&raw[start..]);
    out
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
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
