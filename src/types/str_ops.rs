//! `Str` — a sequence of Unicode scalar values, and the string method
//! surface the built-in library exposes (§4.B).
//!
//! Indexing and `len` operate on scalar values, not UTF-8 bytes, so every
//! positional operation here goes through [`chars`] rather than byte
//! offsets. These are free functions over `&str` rather than methods on
//! `StrObj`: most string operations produce a *new* string (strings are
//! immutable), so there's rarely a `&mut self` to hang a method off of.

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct StrObj {
    pub(crate) value: String,
}

impl StrObj {
    pub(crate) fn new(value: String) -> Self {
        Self { value }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.value
    }

    pub(crate) fn char_len(&self) -> usize {
        self.value.chars().count()
    }
}

pub(crate) fn char_at(s: &str, index: i64) -> Option<char> {
    let len = s.chars().count() as i64;
    let idx = if index < 0 { index + len } else { index };
    if idx < 0 || idx >= len { None } else { s.chars().nth(idx as usize) }
}

pub(crate) fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}
fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => {}
        _ => return false,
    }
    chars.all(is_ident_continue)
}

pub(crate) fn swapcase(s: &str) -> String {
    s.chars()
        .flat_map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().collect::<Vec<_>>()
            } else if c.is_lowercase() {
                c.to_uppercase().collect::<Vec<_>>()
            } else {
                vec![c]
            }
        })
        .collect()
}

/// Word-initial alpha uppercased, the rest lowercased. Boundaries are
/// non-alphanumeric characters; an apostrophe does *not* start a new word
/// (`"don't".title() == "Don'T"` actually -- CPython treats `'` as a
/// boundary too, so the character right after it is still "word-initial").
pub(crate) fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
    }
}

fn is_strip_char(c: char, chars: Option<&str>) -> bool {
    match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    }
}

pub(crate) fn strip(s: &str, chars: Option<&str>) -> String {
    s.trim_matches(|c| is_strip_char(c, chars)).to_owned()
}
pub(crate) fn lstrip(s: &str, chars: Option<&str>) -> String {
    s.trim_start_matches(|c| is_strip_char(c, chars)).to_owned()
}
pub(crate) fn rstrip(s: &str, chars: Option<&str>) -> String {
    s.trim_end_matches(|c| is_strip_char(c, chars)).to_owned()
}

/// `start`/`end` are scalar-value offsets (may be `None`, meaning unbounded).
pub(crate) fn find(s: &str, needle: &str, start: Option<i64>, end: Option<i64>) -> i64 {
    let (offset, sub) = bounded_owned(s, start, end);
    match sub.find(needle) {
        Some(byte_idx) => (offset + sub[..byte_idx].chars().count()) as i64,
        None => -1,
    }
}

pub(crate) fn rfind(s: &str, needle: &str, start: Option<i64>, end: Option<i64>) -> i64 {
    let (offset, sub) = bounded_owned(s, start, end);
    match sub.rfind(needle) {
        Some(byte_idx) => (offset + sub[..byte_idx].chars().count()) as i64,
        None => -1,
    }
}

fn bounded_owned(s: &str, start: Option<i64>, end: Option<i64>) -> (usize, String) {
    let len = s.chars().count() as i64;
    let norm = |v: i64| -> i64 {
        let v = if v < 0 { (v + len).max(0) } else { v };
        v.min(len)
    };
    let start_idx = start.map_or(0, norm).max(0) as usize;
    let end_idx = end.map_or(len, norm).max(start_idx as i64) as usize;
    (start_idx, char_slice(s, start_idx, end_idx))
}

pub(crate) fn count_substr(s: &str, needle: &str, start: Option<i64>, end: Option<i64>) -> usize {
    let (_, sub) = bounded_owned(s, start, end);
    if needle.is_empty() {
        return sub.chars().count() + 1;
    }
    sub.matches(needle).count()
}

pub(crate) fn startswith(s: &str, prefixes: &[&str], start: Option<i64>, end: Option<i64>) -> bool {
    let (_, sub) = bounded_owned(s, start, end);
    prefixes.iter().any(|p| sub.starts_with(p))
}

pub(crate) fn endswith(s: &str, suffixes: &[&str], start: Option<i64>, end: Option<i64>) -> bool {
    let (_, sub) = bounded_owned(s, start, end);
    suffixes.iter().any(|p| sub.ends_with(p))
}

pub(crate) fn replace(s: &str, from: &str, to: &str, count: Option<i64>) -> String {
    match count {
        None => s.replace(from, to),
        Some(n) if n < 0 => s.replace(from, to),
        Some(n) => s.replacen(from, to, n as usize),
    }
}

/// No-separator split: collapses whitespace runs and strips the ends.
fn split_whitespace(s: &str, maxsplit: Option<i64>) -> Vec<String> {
    match maxsplit {
        None | Some(-1) => s.split_whitespace().map(str::to_owned).collect(),
        Some(n) => {
            let n = n as usize;
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while parts.len() < n {
                let Some(idx) = rest.find(char::is_whitespace) else { break };
                parts.push(rest[..idx].to_owned());
                rest = rest[idx..].trim_start();
            }
            if !rest.is_empty() || parts.is_empty() {
                parts.push(rest.to_owned());
            }
            parts
        }
    }
}

pub(crate) fn split(s: &str, sep: Option<&str>, maxsplit: Option<i64>) -> Vec<String> {
    let Some(sep) = sep else { return split_whitespace(s, maxsplit) };
    match maxsplit {
        None | Some(-1) => s.split(sep).map(str::to_owned).collect(),
        Some(n) => s.splitn((n as usize) + 1, sep).map(str::to_owned).collect(),
    }
}

pub(crate) fn rsplit(s: &str, sep: Option<&str>, maxsplit: Option<i64>) -> Vec<String> {
    let Some(sep) = sep else { return split_whitespace(s, maxsplit) };
    match maxsplit {
        None | Some(-1) => s.split(sep).map(str::to_owned).collect(),
        Some(n) => {
            let mut parts: Vec<String> = s.rsplitn((n as usize) + 1, sep).map(str::to_owned).collect();
            parts.reverse();
            parts
        }
    }
}

pub(crate) fn splitlines(s: &str, keepends: bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        cur.push(c);
        let is_break = matches!(c, '\n' | '\r' | '\x0b' | '\x0c' | '\u{1c}' | '\u{1d}' | '\u{1e}' | '\u{85}' | '\u{2028}' | '\u{2029}');
        if is_break {
            if c == '\r' && chars.peek() == Some(&'\n') {
                cur.push(chars.next().unwrap());
            }
            if !keepends {
                let trimmed = cur.trim_end_matches(['\n', '\r', '\x0b', '\x0c', '\u{1c}', '\u{1d}', '\u{1e}', '\u{85}', '\u{2028}', '\u{2029}']);
                out.push(trimmed.to_owned());
            } else {
                out.push(std::mem::take(&mut cur));
            }
            cur.clear();
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

pub(crate) fn partition(s: &str, sep: &str) -> (String, String, String) {
    match s.find(sep) {
        Some(idx) => (s[..idx].to_owned(), sep.to_owned(), s[idx + sep.len()..].to_owned()),
        None => (s.to_owned(), String::new(), String::new()),
    }
}

pub(crate) fn rpartition(s: &str, sep: &str) -> (String, String, String) {
    match s.rfind(sep) {
        Some(idx) => (s[..idx].to_owned(), sep.to_owned(), s[idx + sep.len()..].to_owned()),
        None => (String::new(), String::new(), s.to_owned()),
    }
}

/// CPython biases the extra padding character to the right for odd totals.
pub(crate) fn center(s: &str, width: usize, fill: char) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_owned();
    }
    let total = width - len;
    let left = total / 2;
    let right = total - left;
    let mut out = String::with_capacity(s.len() + total);
    out.extend(std::iter::repeat(fill).take(left));
    out.push_str(s);
    out.extend(std::iter::repeat(fill).take(right));
    out
}

pub(crate) fn ljust(s: &str, width: usize, fill: char) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_owned();
    }
    let mut out = s.to_owned();
    out.extend(std::iter::repeat(fill).take(width - len));
    out
}

pub(crate) fn rjust(s: &str, width: usize, fill: char) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len());
    out.extend(std::iter::repeat(fill).take(width - len));
    out.push_str(s);
    out
}

/// Zero-pads while preserving a leading `+`/`-` sign.
pub(crate) fn zfill(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_owned();
    }
    let (sign, rest) = match s.chars().next() {
        Some(c @ ('+' | '-')) => (Some(c), &s[c.len_utf8()..]),
        _ => (None, s),
    };
    let pad_len = width - len;
    let mut out = String::with_capacity(width);
    if let Some(c) = sign {
        out.push(c);
    }
    out.extend(std::iter::repeat('0').take(pad_len));
    out.push_str(rest);
    out
}

pub(crate) fn removeprefix(s: &str, prefix: &str) -> String {
    s.strip_prefix(prefix).unwrap_or(s).to_owned()
}
pub(crate) fn removesuffix(s: &str, suffix: &str) -> String {
    s.strip_suffix(suffix).unwrap_or(s).to_owned()
}

pub(crate) fn is_utf8_alias(encoding: &str) -> bool {
    matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

/// Predicates below follow the "empty string is false" rule: `"".isalpha()`
/// etc. are always `false`.
pub(crate) fn isalpha(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_alphabetic)
}
pub(crate) fn isdigit(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c.is_numeric() && c.to_digit(10).is_some())
}
pub(crate) fn isdecimal(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.to_digit(10).is_some())
}
pub(crate) fn isnumeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_numeric)
}
pub(crate) fn isalnum(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_alphanumeric)
}
pub(crate) fn isspace(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_whitespace)
}
pub(crate) fn islower(s: &str) -> bool {
    let mut any = false;
    for c in s.chars() {
        if c.is_uppercase() {
            return false;
        }
        if c.is_lowercase() {
            any = true;
        }
    }
    any
}
pub(crate) fn isupper(s: &str) -> bool {
    let mut any = false;
    for c in s.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            any = true;
        }
    }
    any
}
pub(crate) fn isascii(s: &str) -> bool {
    s.is_ascii()
}
pub(crate) fn istitle(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let mut prev_alpha = false;
    let mut any_cased = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            any_cased = true;
            if prev_alpha {
                if c.is_uppercase() {
                    return false;
                }
            } else if c.is_lowercase() {
                return false;
            }
            prev_alpha = true;
        } else {
            prev_alpha = false;
        }
    }
    any_cased
}
