//! Sentinel characters and helpers for the opaque placeholders ("tokens") that stand in
//! for matched text inside an ancestor's working buffer.
//!
//! A token looks like this, every body byte shifted into the private use area:
//! `U+E000 <rule name> U+E001 <occurrence> U+E001 <sequence> U+E002`
//!
//! Nothing in a token is a letter, digit, space or punctuation so `\w+`, `\d+` and friends
//! never see inside one. Patterns that want to cross masked regions with `.` style classes
//! should use [`NON_TOKEN_CHAR`] instead.

use std::ops::Range;

/// Opens a token
pub const TOKEN_OPEN: char = '\u{E000}';
/// Separates the rule name, occurrence and sequence fields
pub const TOKEN_SEPARATOR: char = '\u{E001}';
/// Closes a token
pub const TOKEN_CLOSE: char = '\u{E002}';

/// Body bytes are stored as `GLYPH_BASE + byte`
const GLYPH_BASE: u32 = 0xF000;
const GLYPH_LAST: u32 = GLYPH_BASE + 0xFF;

/// Character class matching a single character that can never be part of a token.
pub const NON_TOKEN_CHAR: &str = "[^\u{E000}-\u{E002}\u{F000}-\u{F0FF}]";

/// Matches any well-formed token, whatever rule minted it.
pub const ANY_TOKEN: &str = "\u{E000}[\u{F000}-\u{F0FF}]+\u{E001}[\u{F030}-\u{F039}]+\u{E001}[\u{F030}-\u{F039}]+\u{E002}";

/// Encoded decimal digit class
const DIGITS: &str = "[\u{F030}-\u{F039}]+";

#[inline]
fn glyph(byte: u8) -> char {
    // always inside the private use area so the conversion cannot fail
    char::from_u32(GLYPH_BASE + byte as u32).unwrap_or(TOKEN_SEPARATOR)
}

#[inline]
fn unglyph(c: char) -> Option<u8> {
    let v = c as u32;
    if (GLYPH_BASE..=GLYPH_LAST).contains(&v) {
        Some((v - GLYPH_BASE) as u8)
    } else {
        None
    }
}

fn encode_into(out: &mut String, s: &str) {
    for b in s.bytes() {
        out.push(glyph(b));
    }
}

/// Whether a rule name can be encoded in a token and referenced in a `<<name>>` template
pub fn is_valid_rule_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Creates the token for the `occurrence`-th match of `rule_name`, `sequence` being the
/// invocation-wide counter.
pub fn mint(rule_name: &str, occurrence: usize, sequence: usize) -> String {
    let mut out = String::with_capacity((rule_name.len() + 12) * 3);
    out.push(TOKEN_OPEN);
    encode_into(&mut out, rule_name);
    out.push(TOKEN_SEPARATOR);
    encode_into(&mut out, &occurrence.to_string());
    out.push(TOKEN_SEPARATOR);
    encode_into(&mut out, &sequence.to_string());
    out.push(TOKEN_CLOSE);
    out
}

/// A regex fragment matching exactly the tokens minted for `rule_name`.
///
/// Glyphs are not regex metacharacters so no escaping is needed.
pub fn token_fragment(rule_name: &str) -> String {
    let mut out = String::new();
    out.push(TOKEN_OPEN);
    encode_into(&mut out, rule_name);
    out.push(TOKEN_SEPARATOR);
    out.push_str(DIGITS);
    out.push(TOKEN_SEPARATOR);
    out.push_str(DIGITS);
    out.push(TOKEN_CLOSE);
    out
}

/// The decoded fields of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParts {
    pub rule: String,
    pub occurrence: usize,
    pub sequence: usize,
}

/// Decodes a token, returning `None` if `token` is not exactly one well-formed token.
pub fn decode(token: &str) -> Option<TokenParts> {
    let inner = token.strip_prefix(TOKEN_OPEN)?.strip_suffix(TOKEN_CLOSE)?;
    let mut fields = inner.split(TOKEN_SEPARATOR);
    let mut next_field = || -> Option<String> {
        let bytes = fields
            .next()?
            .chars()
            .map(unglyph)
            .collect::<Option<Vec<u8>>>()?;
        if bytes.is_empty() {
            return None;
        }
        String::from_utf8(bytes).ok()
    };

    let rule = next_field()?;
    let occurrence = next_field()?.parse().ok()?;
    let sequence = next_field()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(TokenParts {
        rule,
        occurrence,
        sequence,
    })
}

/// Whether `s` is a single well-formed token
pub fn is_token(s: &str) -> bool {
    decode(s).is_some()
}

/// Byte ranges of every well-formed token in `text`, left to right.
pub fn find_tokens(text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = None;

    for (idx, c) in text.char_indices() {
        match c {
            TOKEN_OPEN => start = Some(idx),
            TOKEN_CLOSE => {
                if let Some(s) = start.take() {
                    let end = idx + c.len_utf8();
                    if is_token(&text[s..end]) {
                        out.push(s..end);
                    }
                }
            }
            TOKEN_SEPARATOR => {}
            c if unglyph(c).is_some() => {}
            _ => start = None,
        }
    }

    out
}

/// Replaces every token in `text` for which `lookup` returns something. Unknown tokens
/// are copied through untouched.
pub fn replace_tokens<'a, F>(text: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<&'a str>,
{
    let ranges = find_tokens(text);
    if ranges.is_empty() {
        return text.to_owned();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for range in ranges {
        out.push_str(&text[last..range.start]);
        let token = &text[range.clone()];
        out.push_str(lookup(token).unwrap_or(token));
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Human readable form of a masked text: every token is shown as `{rule#occurrence}`.
pub fn display(text: &str) -> String {
    let ranges = find_tokens(text);
    if ranges.is_empty() {
        return text.to_owned();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for range in ranges {
        out.push_str(&text[last..range.start]);
        if let Some(parts) = decode(&text[range.clone()]) {
            out.push_str(&format!("{{{}#{}}}", parts.rule, parts.occurrence));
        }
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}
