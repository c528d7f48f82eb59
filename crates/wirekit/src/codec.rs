//! Flat text codec for the plan/apply handoff buffer.
//!
//! Every field is written as `<tag><payload><DEL>`. The buffer is plain
//! UTF-8 text so it can travel through an installer property unchanged.
//!
//! | tag | kind        | payload                                   |
//! |-----|-------------|-------------------------------------------|
//! | `n` | null        | empty                                     |
//! | `i` | integer     | decimal `i64`                             |
//! | `s` | text        | escaped text                              |
//! | `m` | multi-text  | escaped entries, each terminated by NUL   |
//! | `b` | blob        | lowercase hex                             |
//!
//! NUL is the multi-value terminator and DEL ends a field, so both are
//! escaped to private-use sentinels inside text payloads and restored on
//! read. Text that already holds a sentinel is refused at encode time.

use crate::error::{Error, Result};
use std::fmt;

/// Ends every field.
pub const FIELD_END: char = '\u{7F}';
/// Terminates each entry of a multi-valued string.
pub const MULTI_TERMINATOR: char = '\0';
/// Escaped form of [`MULTI_TERMINATOR`] inside a text payload.
pub const NUL_SENTINEL: char = '\u{E000}';
/// Escaped form of [`FIELD_END`] inside a text payload.
pub const DEL_SENTINEL: char = '\u{E001}';

const HEX: &[u8; 16] = b"0123456789abcdef";

/// A single decoded field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Text(String),
    MultiText(Vec<String>),
    Blob(Vec<u8>),
}

impl Value {
    /// Tag character written in front of the payload
    pub fn tag(&self) -> char {
        match self {
            Value::Null => 'n',
            Value::Int(_) => 'i',
            Value::Text(_) => 's',
            Value::MultiText(_) => 'm',
            Value::Blob(_) => 'b',
        }
    }

    /// Human-readable kind name, used in error messages
    pub fn kind_name(&self) -> &'static str {
        kind_name(self.tag())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_multi(&self) -> Option<&[String]> {
        match self {
            Value::MultiText(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::MultiText(v) => write!(f, "{v:?}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

fn kind_name(tag: char) -> &'static str {
    match tag {
        'n' => "null",
        'i' => "integer",
        's' => "text",
        'm' => "multi-text",
        'b' => "blob",
        _ => "unknown",
    }
}

/// Append-only accumulator for encoded fields.
///
/// One buffer is threaded through the whole PLAN phase; snapshots and the
/// action queue all write into it in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireBuffer {
    data: String,
}

impl WireBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap text received from the other side of the handoff
    pub fn from_string(data: String) -> Self {
        Self { data }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    pub fn into_string(mut self) -> String {
        std::mem::take(&mut self.data)
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one field.
    ///
    /// On error the buffer is left exactly as it was.
    pub fn append(&mut self, value: &Value) -> Result<()> {
        let mut field = String::new();
        field.push(value.tag());
        let written = match value {
            Value::Null => Ok(()),
            Value::Int(i) => {
                field.push_str(&i.to_string());
                Ok(())
            }
            Value::Text(s) => escape_into(s, &mut field),
            Value::MultiText(entries) => append_multi_payload(entries, &mut field),
            Value::Blob(bytes) => {
                for b in bytes {
                    field.push(HEX[usize::from(b >> 4)] as char);
                    field.push(HEX[usize::from(b & 0x0f)] as char);
                }
                Ok(())
            }
        };
        if let Err(e) = written {
            wipe(field);
            return Err(e);
        }
        field.push(FIELD_END);
        self.push_raw(&field);
        wipe(field);
        Ok(())
    }

    /// Grow by hand so the outgrown allocation is zeroed, not just freed
    fn push_raw(&mut self, text: &str) {
        let needed = self.data.len() + text.len();
        if needed > self.data.capacity() {
            let mut grown = String::with_capacity(needed.max(self.data.capacity() * 2));
            grown.push_str(&self.data);
            wipe(std::mem::replace(&mut self.data, grown));
        }
        self.data.push_str(text);
    }

    pub fn append_int(&mut self, value: i64) -> Result<()> {
        self.append(&Value::Int(value))
    }

    pub fn append_text(&mut self, value: &str) -> Result<()> {
        self.append(&Value::Text(value.to_string()))
    }

    pub fn append_multi<S: AsRef<str>>(&mut self, entries: &[S]) -> Result<()> {
        let entries = entries.iter().map(|e| e.as_ref().to_string()).collect();
        self.append(&Value::MultiText(entries))
    }

    pub fn append_blob(&mut self, bytes: &[u8]) -> Result<()> {
        self.append(&Value::Blob(bytes.to_vec()))
    }

    pub fn append_null(&mut self) -> Result<()> {
        self.append(&Value::Null)
    }

    /// Append every field of another buffer
    pub fn append_buffer(&mut self, other: &WireBuffer) {
        self.push_raw(&other.data);
    }

    /// Start reading from the first field
    pub fn reader(&self) -> WireReader<'_> {
        WireReader::new(&self.data)
    }

    /// Overwrite the backing bytes and release them.
    ///
    /// Used once the apply side has consumed a buffer that may carry
    /// secret-bearing columns. Dropping a buffer scrubs it as well.
    pub fn scrub(&mut self) {
        wipe(std::mem::take(&mut self.data));
    }
}

impl Drop for WireBuffer {
    fn drop(&mut self) {
        self.scrub();
    }
}

/// Zero every byte of the allocation, spare capacity included
fn zeroed(text: String) -> Vec<u8> {
    let mut bytes = text.into_bytes();
    bytes.fill(0);
    bytes.resize(bytes.capacity(), 0);
    std::hint::black_box(&bytes);
    bytes
}

fn wipe(text: String) {
    drop(zeroed(text));
}

fn escape_into(text: &str, out: &mut String) -> Result<()> {
    for ch in text.chars() {
        match ch {
            MULTI_TERMINATOR => out.push(NUL_SENTINEL),
            FIELD_END => out.push(DEL_SENTINEL),
            NUL_SENTINEL | DEL_SENTINEL => {
                return Err(Error::ReservedChar {
                    codepoint: u32::from(ch),
                });
            }
            _ => out.push(ch),
        }
    }
    Ok(())
}

fn append_multi_payload(entries: &[String], out: &mut String) -> Result<()> {
    for entry in entries {
        if entry.contains(MULTI_TERMINATOR) {
            return Err(Error::ReservedChar {
                codepoint: u32::from(MULTI_TERMINATOR),
            });
        }
        let mut joined = String::with_capacity(entry.len() + 1);
        joined.push_str(entry);
        joined.push(MULTI_TERMINATOR);
        let escaped = escape_into(&joined, out);
        wipe(joined);
        escaped?;
    }
    Ok(())
}

fn unescape(payload: &str) -> String {
    payload
        .chars()
        .map(|ch| match ch {
            NUL_SENTINEL => MULTI_TERMINATOR,
            DEL_SENTINEL => FIELD_END,
            other => other,
        })
        .collect()
}

fn decode_hex(payload: &str, offset: usize) -> Result<Vec<u8>> {
    if !payload.is_ascii() || payload.len() % 2 != 0 {
        return Err(Error::malformed(offset, "blob is not even-length hex"));
    }
    payload
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = hex_digit(pair[0]);
            let lo = hex_digit(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(Error::malformed(offset, "invalid hex digit in blob")),
            }
        })
        .collect()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode the field starting at `cursor`.
///
/// Returns the value and the cursor of the next field. Reading at or past
/// the end of `data` is [`Error::Truncated`].
pub fn read_at(data: &str, cursor: usize) -> Result<(Value, usize)> {
    if cursor >= data.len() {
        return Err(Error::Truncated { offset: cursor });
    }
    let rest = data
        .get(cursor..)
        .ok_or_else(|| Error::malformed(cursor, "cursor is not on a character boundary"))?;
    let mut chars = rest.chars();
    let tag = chars
        .next()
        .ok_or(Error::Truncated { offset: cursor })?;
    let body = chars.as_str();
    let end = body
        .find(FIELD_END)
        .ok_or(Error::Truncated { offset: cursor })?;
    let payload = &body[..end];
    let next = cursor + tag.len_utf8() + end + FIELD_END.len_utf8();

    let value = match tag {
        'n' if payload.is_empty() => Value::Null,
        'n' => return Err(Error::malformed(cursor, "null field carries a payload")),
        'i' => payload
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| Error::malformed(cursor, format!("bad integer {payload:?}: {e}")))?,
        's' => Value::Text(unescape(payload)),
        'm' => {
            let raw = unescape(payload);
            if !raw.is_empty() && !raw.ends_with(MULTI_TERMINATOR) {
                return Err(Error::malformed(cursor, "unterminated multi-text entry"));
            }
            Value::MultiText(
                raw.split_terminator(MULTI_TERMINATOR)
                    .map(str::to_string)
                    .collect(),
            )
        }
        'b' => Value::Blob(decode_hex(payload, cursor)?),
        other => return Err(Error::malformed(cursor, format!("unknown field tag {other:?}"))),
    };
    Ok((value, next))
}

/// Sequential reader over an encoded buffer.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a str,
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a str) -> Self {
        Self { data, pos: 0 }
    }

    /// Byte offset of the next field
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn data(&self) -> &'a str {
        self.data
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Decode the next field of any kind
    pub fn read(&mut self) -> Result<Value> {
        let (value, next) = read_at(self.data, self.pos)?;
        self.pos = next;
        Ok(value)
    }

    /// Peek at the next field without consuming it
    pub fn peek(&self) -> Result<Value> {
        read_at(self.data, self.pos).map(|(value, _)| value)
    }

    fn mismatch(&self, offset: usize, expected: &'static str, found: &Value) -> Error {
        Error::UnexpectedTag {
            offset,
            expected,
            found: found.tag(),
        }
    }

    pub fn read_int(&mut self) -> Result<i64> {
        let offset = self.pos;
        match self.read()? {
            Value::Int(i) => Ok(i),
            other => Err(self.mismatch(offset, "integer", &other)),
        }
    }

    /// Read an integer that must fit a `usize` count or index
    pub fn read_count(&mut self) -> Result<usize> {
        let offset = self.pos;
        let raw = self.read_int()?;
        usize::try_from(raw).map_err(|_| Error::malformed(offset, format!("negative count {raw}")))
    }

    pub fn read_text(&mut self) -> Result<String> {
        let offset = self.pos;
        match self.read()? {
            Value::Text(s) => Ok(s),
            other => Err(self.mismatch(offset, "text", &other)),
        }
    }

    pub fn read_multi(&mut self) -> Result<Vec<String>> {
        let offset = self.pos;
        match self.read()? {
            Value::MultiText(v) => Ok(v),
            other => Err(self.mismatch(offset, "multi-text", &other)),
        }
    }

    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        let offset = self.pos;
        match self.read()? {
            Value::Blob(b) => Ok(b),
            other => Err(self.mismatch(offset, "blob", &other)),
        }
    }

    /// Read text that may have been written as null
    pub fn read_opt_text(&mut self) -> Result<Option<String>> {
        let offset = self.pos;
        match self.read()? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            other => Err(self.mismatch(offset, "text or null", &other)),
        }
    }
}
