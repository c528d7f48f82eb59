//! Query snapshots: relational result sets carried inside a wire buffer.
//!
//! The plan side wraps a table under an explicit tag. The apply side indexes
//! every block by tag, so the order in which snapshots are unwrapped does not
//! have to mirror the order in which they were written.
//!
//! Block layout:
//!
//! ```text
//! "snapshot" tag rows columns lookup_mask redacted_mask cell*
//! ```
//!
//! Cells are written row-major. Redacted columns are written as null and
//! must be restored by the consumer from a fresh lookup.

use crate::codec::{Value, WireBuffer, WireReader, read_at};
use crate::error::{Error, Result};

/// Leading field of every snapshot block
pub const SNAPSHOT_MARKER: &str = "snapshot";

/// Column masks are `u64`
pub const MAX_COLUMNS: usize = 64;

/// Shape and column flags of a snapshot about to be wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSpec {
    tag: String,
    columns: usize,
    lookup: Vec<usize>,
    redacted: Vec<usize>,
}

impl SnapshotSpec {
    pub fn new(tag: impl Into<String>, columns: usize) -> Self {
        Self {
            tag: tag.into(),
            columns,
            lookup: Vec::new(),
            redacted: Vec::new(),
        }
    }

    /// Mark a column as usable with [`SnapshotHandle::fetch_where`]
    pub fn lookup(mut self, column: usize) -> Self {
        self.lookup.push(column);
        self
    }

    /// Mark a column as never written to the buffer
    pub fn redact(mut self, column: usize) -> Self {
        self.redacted.push(column);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    fn mask(&self, columns: &[usize]) -> Result<u64> {
        columns.iter().try_fold(0u64, |mask, &column| {
            if column >= self.columns {
                return Err(Error::ColumnOutOfRange {
                    tag: self.tag.clone(),
                    column,
                    columns: self.columns,
                });
            }
            Ok(mask | (1u64 << column))
        })
    }
}

/// Append a snapshot block to `out`.
///
/// Either the whole block is written or, on error, nothing is.
pub fn wrap(out: &mut WireBuffer, spec: &SnapshotSpec, rows: &[Vec<Value>]) -> Result<()> {
    if spec.columns > MAX_COLUMNS {
        return Err(Error::TooManyColumns {
            columns: spec.columns,
            max: MAX_COLUMNS,
        });
    }
    let lookup_mask = spec.mask(&spec.lookup)?;
    let redacted_mask = spec.mask(&spec.redacted)?;

    let mut block = WireBuffer::new();
    block.append_text(SNAPSHOT_MARKER)?;
    block.append_text(&spec.tag)?;
    block.append_int(count_to_i64(rows.len()))?;
    block.append_int(count_to_i64(spec.columns))?;
    block.append_int(lookup_mask as i64)?;
    block.append_int(redacted_mask as i64)?;

    for (index, row) in rows.iter().enumerate() {
        if row.len() != spec.columns {
            return Err(Error::RaggedRow {
                row: index,
                expected: spec.columns,
                found: row.len(),
            });
        }
        for (column, cell) in row.iter().enumerate() {
            if redacted_mask & (1u64 << column) != 0 {
                block.append_null()?;
            } else {
                block.append(cell)?;
            }
        }
    }

    out.append_buffer(&block);
    log::debug!(
        "Wrapped snapshot {}: {} rows x {} columns",
        spec.tag,
        rows.len(),
        spec.columns
    );
    Ok(())
}

fn count_to_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// One replayed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<Value>,
    redacted_mask: u64,
}

impl Row {
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Value> {
        self.cells
    }

    pub fn get(&self, column: usize) -> Option<&Value> {
        self.cells.get(column)
    }

    /// Whether `column` still holds the redaction placeholder
    pub fn is_redacted(&self, column: usize) -> bool {
        column < MAX_COLUMNS && self.redacted_mask & (1u64 << column) != 0
    }

    /// Whether any column still needs to be re-resolved
    pub fn has_redacted(&self) -> bool {
        self.redacted_mask != 0
    }

    /// Put a re-resolved value back into a redacted column.
    ///
    /// Returns false if the column was not redacted.
    pub fn restore(&mut self, column: usize, value: Value) -> bool {
        if !self.is_redacted(column) {
            return false;
        }
        match self.cells.get_mut(column) {
            Some(cell) => {
                *cell = value;
                self.redacted_mask &= !(1u64 << column);
                true
            }
            None => false,
        }
    }

    fn cell(&self, column: usize, expected: &'static str) -> Result<&Value> {
        self.cells
            .get(column)
            .ok_or(Error::CellType { column, expected })
    }

    pub fn int(&self, column: usize) -> Result<i64> {
        self.cell(column, "integer")?
            .as_int()
            .ok_or(Error::CellType {
                column,
                expected: "integer",
            })
    }

    pub fn text(&self, column: usize) -> Result<&str> {
        self.cell(column, "text")?
            .as_text()
            .ok_or(Error::CellType {
                column,
                expected: "text",
            })
    }

    /// Text cell that may be null
    pub fn opt_text(&self, column: usize) -> Result<Option<&str>> {
        match self.cell(column, "text or null")? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            _ => Err(Error::CellType {
                column,
                expected: "text or null",
            }),
        }
    }
}

/// Replay cursor over one snapshot block.
///
/// The header is read once by [`SnapshotHandle::begin_unwrap`]; rows are
/// decoded lazily as the cursor moves forward.
#[derive(Debug, Clone)]
pub struct SnapshotHandle<'a> {
    tag: String,
    data: &'a str,
    rows: usize,
    columns: usize,
    lookup_mask: u64,
    redacted_mask: u64,
    first_row: usize,
    cursor: usize,
    next_row: usize,
}

impl<'a> SnapshotHandle<'a> {
    /// Read a snapshot header at the reader's position.
    ///
    /// The whole block is validated here, so a truncated snapshot fails
    /// before any row is handed out. The reader is left after the block.
    pub fn begin_unwrap(reader: &mut WireReader<'a>) -> Result<Self> {
        let start = reader.position();
        let marker = reader.read_text()?;
        if marker != SNAPSHOT_MARKER {
            return Err(Error::malformed(start, format!("expected snapshot block, found {marker:?}")));
        }
        let tag = reader.read_text()?;
        let rows = reader.read_count()?;
        let columns = reader.read_count()?;
        if columns > MAX_COLUMNS {
            return Err(Error::malformed(start, format!("snapshot {tag} has {columns} columns")));
        }
        let lookup_mask = reader.read_int()? as u64;
        let redacted_mask = reader.read_int()? as u64;
        let valid = if columns == MAX_COLUMNS {
            u64::MAX
        } else {
            (1u64 << columns) - 1
        };
        if (lookup_mask | redacted_mask) & !valid != 0 {
            return Err(Error::malformed(
                start,
                format!("snapshot {tag} flags columns beyond its {columns}"),
            ));
        }
        let first_row = reader.position();

        let cells = rows
            .checked_mul(columns)
            .ok_or_else(|| Error::malformed(start, "snapshot size overflows"))?;
        for _ in 0..cells {
            reader.read()?;
        }

        log::trace!("Unwrapped snapshot header {tag}: {rows} rows x {columns} columns");
        Ok(Self {
            tag,
            data: reader.data(),
            rows,
            columns,
            lookup_mask,
            redacted_mask,
            first_row,
            cursor: first_row,
            next_row: 0,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_lookup_column(&self, column: usize) -> bool {
        column < MAX_COLUMNS && self.lookup_mask & (1u64 << column) != 0
    }

    /// Decode the next row, or `None` once every row has been handed out
    pub fn fetch_next(&mut self) -> Result<Option<Row>> {
        if self.next_row >= self.rows {
            return Ok(None);
        }
        let mut cells = Vec::with_capacity(self.columns);
        for _ in 0..self.columns {
            let (value, next) = read_at(self.data, self.cursor)?;
            cells.push(value);
            self.cursor = next;
        }
        self.next_row += 1;
        Ok(Some(Row {
            cells,
            redacted_mask: self.redacted_mask,
        }))
    }

    /// Scan forward from the cursor for the first row whose `column` equals
    /// `value`.
    ///
    /// Never rewinds. The cursor rests after the match, so calling again
    /// with the same key yields the next duplicate in original order. No
    /// match is `Ok(None)`, and leaves the cursor at the end.
    pub fn fetch_where(&mut self, column: usize, value: &Value) -> Result<Option<Row>> {
        if column >= self.columns {
            return Err(Error::ColumnOutOfRange {
                tag: self.tag.clone(),
                column,
                columns: self.columns,
            });
        }
        if !self.is_lookup_column(column) {
            return Err(Error::NotLookupColumn {
                tag: self.tag.clone(),
                column,
            });
        }
        while let Some(row) = self.fetch_next()? {
            if row.cells.get(column) == Some(value) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Like [`fetch_where`](Self::fetch_where), but a miss is [`Error::NotFound`]
    pub fn require_where(&mut self, column: usize, value: &Value) -> Result<Row> {
        self.fetch_where(column, value)?
            .ok_or_else(|| Error::NotFound {
                tag: self.tag.clone(),
                column,
                value: value.to_string(),
            })
    }

    /// Rewind to the first row without re-reading the header
    pub fn reset(&mut self) {
        self.cursor = self.first_row;
        self.next_row = 0;
    }
}

/// Snapshots of one buffer, indexed by tag.
#[derive(Debug, Default)]
pub struct SnapshotSet<'a> {
    handles: Vec<SnapshotHandle<'a>>,
}

impl<'a> SnapshotSet<'a> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Read consecutive snapshot blocks until the end of the buffer or the
    /// first field that does not start a snapshot.
    pub fn collect(reader: &mut WireReader<'a>) -> Result<Self> {
        let mut set = Self::new();
        while !reader.is_at_end() && is_snapshot_start(reader) {
            set.insert(SnapshotHandle::begin_unwrap(reader)?)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, handle: SnapshotHandle<'a>) -> Result<()> {
        if self.handles.iter().any(|h| h.tag == handle.tag) {
            return Err(Error::DuplicateTag { tag: handle.tag });
        }
        self.handles.push(handle);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.handles.iter().any(|h| h.tag == tag)
    }

    /// Borrow the handle for `tag`, keeping it in the set
    pub fn get_mut(&mut self, tag: &str) -> Result<&mut SnapshotHandle<'a>> {
        self.handles
            .iter_mut()
            .find(|h| h.tag == tag)
            .ok_or_else(|| Error::MissingSnapshot { tag: tag.to_string() })
    }

    /// Remove and return the handle for `tag`
    pub fn take(&mut self, tag: &str) -> Result<SnapshotHandle<'a>> {
        let index = self
            .handles
            .iter()
            .position(|h| h.tag == tag)
            .ok_or_else(|| Error::MissingSnapshot { tag: tag.to_string() })?;
        Ok(self.handles.remove(index))
    }

    /// Tags in the order the snapshots were written
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(|h| h.tag.as_str())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Whether the next field of `reader` opens a snapshot block
pub fn is_snapshot_start(reader: &WireReader<'_>) -> bool {
    matches!(reader.peek(), Ok(Value::Text(ref marker)) if marker == SNAPSHOT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: usize = 0;
    const NAME: usize = 1;
    const SECRET: usize = 2;

    fn user_rows() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int(1), "alice".into(), "pw-a".into()],
            vec![Value::Int(2), "bob".into(), "pw-b".into()],
            vec![Value::Int(3), "alice".into(), "pw-c".into()],
        ]
    }

    fn users_spec() -> SnapshotSpec {
        SnapshotSpec::new("users", 3).lookup(ID).lookup(NAME).redact(SECRET)
    }

    fn site_rows() -> Vec<Vec<Value>> {
        vec![
            vec!["default".into(), Value::Int(80)],
            vec!["admin".into(), Value::Int(8080)],
        ]
    }

    #[test]
    fn test_fetch_next_replays_rows_in_order() {
        let rows = site_rows();
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &SnapshotSpec::new("sites", 2), &rows).unwrap();

        let mut reader = buf.reader();
        let mut handle = SnapshotHandle::begin_unwrap(&mut reader).unwrap();
        assert!(reader.is_at_end());

        let mut replayed = Vec::new();
        while let Some(row) = handle.fetch_next().unwrap() {
            replayed.push(row.into_cells());
        }
        assert_eq!(replayed, rows);
        assert!(handle.fetch_next().unwrap().is_none());
    }

    #[test]
    fn test_fetch_where_after_reset_finds_passed_row() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &users_spec(), &user_rows()).unwrap();
        let mut handle = SnapshotHandle::begin_unwrap(&mut buf.reader()).unwrap();

        let bob = handle.fetch_where(NAME, &"bob".into()).unwrap().unwrap();
        assert_eq!(bob.int(ID).unwrap(), 2);
        // forward-only: row 1 is behind the cursor now
        assert!(handle.fetch_where(ID, &Value::Int(1)).unwrap().is_none());

        handle.reset();
        let first = handle.fetch_where(ID, &Value::Int(1)).unwrap().unwrap();
        assert_eq!(first.text(NAME).unwrap(), "alice");
    }

    #[test]
    fn test_duplicate_keys_come_back_in_original_order() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &users_spec(), &user_rows()).unwrap();
        let mut handle = SnapshotHandle::begin_unwrap(&mut buf.reader()).unwrap();

        let key = Value::from("alice");
        let first = handle.fetch_where(NAME, &key).unwrap().unwrap();
        let second = handle.fetch_where(NAME, &key).unwrap().unwrap();
        assert_eq!(first.int(ID).unwrap(), 1);
        assert_eq!(second.int(ID).unwrap(), 3);
        assert!(handle.fetch_where(NAME, &key).unwrap().is_none());
    }

    #[test]
    fn test_no_match_is_none_and_required_miss_is_not_found() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &users_spec(), &user_rows()).unwrap();
        let mut handle = SnapshotHandle::begin_unwrap(&mut buf.reader()).unwrap();

        assert!(handle.fetch_where(NAME, &"carol".into()).unwrap().is_none());
        handle.reset();
        let err = handle.require_where(NAME, &"carol".into()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_lookup_on_unflagged_column_is_rejected() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &SnapshotSpec::new("sites", 2).lookup(0), &site_rows()).unwrap();
        let mut handle = SnapshotHandle::begin_unwrap(&mut buf.reader()).unwrap();

        assert!(matches!(
            handle.fetch_where(1, &Value::Int(80)),
            Err(Error::NotLookupColumn { column: 1, .. })
        ));
        assert!(matches!(
            handle.fetch_where(5, &Value::Int(80)),
            Err(Error::ColumnOutOfRange { column: 5, .. })
        ));
    }

    #[test]
    fn test_redacted_column_never_reaches_buffer() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &users_spec(), &user_rows()).unwrap();
        assert!(!buf.as_str().contains("pw-"));

        let mut handle = SnapshotHandle::begin_unwrap(&mut buf.reader()).unwrap();
        let mut row = handle.fetch_next().unwrap().unwrap();
        assert!(row.is_redacted(SECRET));
        assert_eq!(row.get(SECRET), Some(&Value::Null));

        assert!(row.restore(SECRET, "fresh".into()));
        assert!(!row.is_redacted(SECRET));
        assert!(!row.has_redacted());
        assert_eq!(row.text(SECRET).unwrap(), "fresh");
        assert!(!row.restore(NAME, "nope".into()));
    }

    #[test]
    fn test_interleaved_snapshots_unwrap_by_tag_in_any_order() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &SnapshotSpec::new("sites", 2).lookup(0), &site_rows()).unwrap();
        wrap(&mut buf, &users_spec(), &user_rows()).unwrap();

        let mut reader = buf.reader();
        let mut set = SnapshotSet::collect(&mut reader).unwrap();
        assert_eq!(set.tags().collect::<Vec<_>>(), vec!["sites", "users"]);

        // apply side asks in the opposite order from the plan side
        let users = set.get_mut("users").unwrap();
        assert_eq!(users.rows(), 3);
        let sites = set.take("sites").unwrap();
        assert_eq!(sites.columns(), 2);
        assert!(matches!(set.take("sites"), Err(Error::MissingSnapshot { .. })));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_duplicate_tag_rejected_on_unwrap() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &SnapshotSpec::new("sites", 2), &site_rows()).unwrap();
        wrap(&mut buf, &SnapshotSpec::new("sites", 2), &site_rows()).unwrap();

        let err = SnapshotSet::collect(&mut buf.reader()).unwrap_err();
        assert!(matches!(err, Error::DuplicateTag { .. }));
    }

    #[test]
    fn test_truncated_block_fails_at_begin() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &SnapshotSpec::new("sites", 2), &site_rows()).unwrap();
        let text = buf.as_str();
        let cut = &text[..text.len() - 3];

        let err = SnapshotHandle::begin_unwrap(&mut WireReader::new(cut)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_mask_bits_past_last_column_are_malformed() {
        let header = |lookup: i64, redacted: i64| {
            let mut buf = WireBuffer::new();
            buf.append_text(SNAPSHOT_MARKER).unwrap();
            buf.append_text("t").unwrap();
            buf.append_int(1).unwrap();
            buf.append_int(2).unwrap();
            buf.append_int(lookup).unwrap();
            buf.append_int(redacted).unwrap();
            buf.append_text("a").unwrap();
            buf.append_int(1).unwrap();
            buf
        };

        let ok = header(0b01, 0b10);
        assert!(SnapshotHandle::begin_unwrap(&mut ok.reader()).is_ok());

        for bad in [header(0b100, 0), header(0, 0b1000), header(-1, 0)] {
            let err = SnapshotHandle::begin_unwrap(&mut bad.reader()).unwrap_err();
            assert!(matches!(err, Error::Malformed { offset: 0, .. }));
        }
    }

    #[test]
    fn test_wrap_validates_shape_and_leaves_buffer_untouched() {
        let mut buf = WireBuffer::new();
        let ragged = vec![vec![Value::Int(1)], vec![Value::Int(2), Value::Int(3)]];
        let err = wrap(&mut buf, &SnapshotSpec::new("t", 1), &ragged).unwrap_err();
        assert!(matches!(err, Error::RaggedRow { row: 1, .. }));
        assert!(buf.is_empty());

        let err = wrap(&mut buf, &SnapshotSpec::new("t", 65), &[]).unwrap_err();
        assert!(matches!(err, Error::TooManyColumns { .. }));

        let err = wrap(&mut buf, &SnapshotSpec::new("t", 1).lookup(3), &[]).unwrap_err();
        assert!(matches!(err, Error::ColumnOutOfRange { column: 3, .. }));
    }

    #[test]
    fn test_empty_snapshot_round_trips() {
        let mut buf = WireBuffer::new();
        wrap(&mut buf, &SnapshotSpec::new("empty", 4), &[]).unwrap();
        let mut handle = SnapshotHandle::begin_unwrap(&mut buf.reader()).unwrap();
        assert_eq!(handle.rows(), 0);
        assert!(handle.fetch_next().unwrap().is_none());
    }
}
