//! Route patterns: an anchored regex plus a parsed view of its source.
//!
//! The parsed view splits the pattern into literal text, capture groups and
//! everything else. Reverse URL generation walks these segments instead of
//! rewriting the regex source, so `\.` becomes a literal `.` and nothing
//! inside a character class is mistaken for a group.

use regex::Regex;

/// One piece of a pattern's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// A capturing group and the number of capture slots it spans, itself
    /// included. Filled with one parameter on reverse; the parameters of the
    /// nested slots are skipped so positions line up with matched groups.
    Group(usize),
    /// Any construct with no single concrete spelling (classes, quantifiers,
    /// alternation, non-capturing groups, escapes such as `\d`).
    Meta,
}

#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile `source`, anchored at the start of whatever it is matched against.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})", source))?;
        Ok(Self {
            source: source.to_string(),
            regex,
            segments: parse_segments(source),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match at position 0 of `input`.
    ///
    /// Returns the length of the consumed prefix and the captured groups;
    /// groups that did not participate are empty strings.
    pub fn match_prefix(&self, input: &str) -> Option<(usize, Vec<String>)> {
        let captures = self.regex.captures(input)?;
        let consumed = captures.get(0).map_or(0, |m| m.end());
        let groups = captures
            .iter()
            .skip(1)
            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
            .collect();
        Some((consumed, groups))
    }
}

/// Build the longest concrete URL a chain of patterns spells out.
///
/// Literals are copied, groups take the next parameter, and the walk stops at
/// the first `Meta` segment or the first group without a parameter.
pub fn reverse_chain<'a, I, S>(chain: I, params: &[S]) -> String
where
    I: IntoIterator<Item = &'a RoutePattern>,
    S: AsRef<str>,
{
    let mut url = String::new();
    let mut params = params.iter();
    for pattern in chain {
        for segment in pattern.segments() {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Group(captures) => match params.next() {
                    Some(value) => {
                        url.push_str(value.as_ref());
                        for _ in 1..*captures {
                            params.next();
                        }
                    }
                    None => return url,
                },
                Segment::Meta => return url,
            }
        }
    }
    url
}

fn parse_segments(source: &str) -> Vec<Segment> {
    let body = source.strip_prefix('^').unwrap_or(source);
    let body = match body.strip_suffix('$') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => body,
    };

    let chars: Vec<char> = body.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => match chars.get(i + 1) {
                Some(c) if c.is_ascii_alphanumeric() => {
                    flush(&mut literal, &mut segments);
                    segments.push(Segment::Meta);
                    i += 2;
                }
                Some(c) => {
                    literal.push(*c);
                    i += 2;
                }
                None => {
                    literal.push('\\');
                    i += 1;
                }
            },
            '(' => {
                flush(&mut literal, &mut segments);
                let end = skip_group(&chars, i);
                segments.push(if is_capturing(&chars[i + 1..]) {
                    Segment::Group(count_captures(&chars[i..end]))
                } else {
                    Segment::Meta
                });
                i = end;
            }
            '[' => {
                flush(&mut literal, &mut segments);
                i = skip_class(&chars, i);
                segments.push(Segment::Meta);
            }
            '.' | '*' | '+' | '?' | '{' | '}' | '|' | '^' | '$' | ')' | ']' => {
                flush(&mut literal, &mut segments);
                segments.push(Segment::Meta);
                i += 1;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut segments);
    segments
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

/// `(` followed by this is a capturing group: plain, `?P<name>` or `?<name>`.
fn is_capturing(after_paren: &[char]) -> bool {
    match after_paren {
        ['?', 'P', '<', ..] => true,
        ['?', '<', c, ..] => *c != '=' && *c != '!',
        ['?', ..] => false,
        _ => true,
    }
}

/// Capturing groups opened anywhere in `chars`.
fn count_captures(chars: &[char]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '[' => i = skip_class(chars, i),
            '(' => {
                if is_capturing(&chars[i + 1..]) {
                    count += 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    count
}

/// Index just past the `)` closing the group opened at `open`.
fn skip_group(chars: &[char], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => {
                i = skip_class(chars, i);
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

/// Index just past the `]` closing the class opened at `open`.
fn skip_class(chars: &[char], open: usize) -> usize {
    let mut i = open + 1;
    // A leading `]` (after an optional `^`) is literal.
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}
