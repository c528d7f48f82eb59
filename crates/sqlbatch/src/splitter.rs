//! Split a SQL script into batches at `GO` separators.
//!
//! The scanner walks the script once in one of four modes: code, line
//! comment (`--` to end of line), block comment (`/* */`, not nested) and
//! quoted (`'...'` or `"..."`, a doubled quote is an escaped quote).
//!
//! `GO` separates batches only in code mode, case-insensitively, when it is
//! preceded by start-of-text or whitespace and followed by end-of-text or
//! whitespace. Comments are dropped from the emitted statements; quoted text
//! is kept verbatim.

use crate::error::{Error, Result};
use std::iter::FusedIterator;

/// Split `script` into batches.
///
/// Batches are produced lazily. After the first error the iterator ends.
///
/// ```
/// let batches: Vec<String> = sqlbatch::split("CREATE TABLE t (id int)\nGO\nSELECT 1")
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(batches, vec!["CREATE TABLE t (id int)", "SELECT 1"]);
/// ```
pub fn split(script: &str) -> Batches<'_> {
    Batches {
        src: script,
        pos: 0,
        done: false,
    }
}

/// Iterator over the batches of one script.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    src: &'a str,
    pos: usize,
    done: bool,
}

impl Batches<'_> {
    /// Whether a `GO` separator starts at byte `i`.
    ///
    /// Only ASCII whitespace (space, tab, CR, LF, FF) bounds the token.
    /// A `GO` next to a non-breaking or other Unicode space is plain text.
    fn is_separator(&self, i: usize) -> bool {
        let bytes = self.src.as_bytes();
        let Some(word) = bytes.get(i..i + 2) else {
            return false;
        };
        if !word.eq_ignore_ascii_case(b"go") {
            return false;
        }
        let before = i == 0 || bytes.get(i - 1).is_some_and(u8::is_ascii_whitespace);
        let after = bytes.get(i + 2).is_none_or(u8::is_ascii_whitespace);
        before && after
    }

    /// Scan one statement starting at `self.pos`.
    ///
    /// Stops after a separator or at the end of the script. The returned
    /// statement may be empty.
    fn scan(&mut self) -> Result<String> {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut statement = String::new();
        let mut segment = self.pos;
        let mut i = self.pos;

        while let Some(&b) = bytes.get(i) {
            match b {
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    statement.push_str(&src[segment..i]);
                    i = src[i..].find('\n').map_or(bytes.len(), |n| i + n);
                    segment = i;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    statement.push_str(&src[segment..i]);
                    match src[i + 2..].find("*/") {
                        Some(n) => {
                            i += 2 + n + 2;
                            statement.push(' ');
                            segment = i;
                        }
                        None => {
                            return Err(Error::UnterminatedComment {
                                start: i,
                                offset: bytes.len(),
                            });
                        }
                    }
                }
                b'\'' | b'"' => {
                    i = closing_quote(bytes, i)?;
                }
                b'g' | b'G' if self.is_separator(i) => {
                    statement.push_str(&src[segment..i]);
                    self.pos = i + 2;
                    return Ok(normalize(&statement));
                }
                _ => i += 1,
            }
        }

        statement.push_str(&src[segment..]);
        self.pos = bytes.len();
        self.done = true;
        Ok(normalize(&statement))
    }
}

/// Index just past the quote that closes the literal opened at `start`
fn closing_quote(bytes: &[u8], start: usize) -> Result<usize> {
    let quote = bytes[start];
    let mut j = start + 1;
    loop {
        let rest = bytes.get(j..).unwrap_or_default();
        let Some(n) = rest.iter().position(|&b| b == quote) else {
            return Err(Error::UnterminatedQuote {
                quote: char::from(quote),
                start,
                offset: bytes.len(),
            });
        };
        let close = j + n;
        if bytes.get(close + 1) == Some(&quote) {
            j = close + 2;
            continue;
        }
        return Ok(close + 1);
    }
}

fn normalize(statement: &str) -> String {
    statement.replace('\t', " ").trim().to_string()
}

impl Iterator for Batches<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.scan() {
                Ok(statement) if statement.is_empty() => {}
                Ok(statement) => return Some(Ok(statement)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl FusedIterator for Batches<'_> {}
