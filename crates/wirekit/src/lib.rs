//! # wirekit
//!
//! Flat wire codec and query snapshots for handing a plan from one process
//! to another.
//!
//! - [`codec`]: integers, text, multi-valued text and blobs appended to a
//!   [`WireBuffer`] and read back with a [`WireReader`]
//! - [`snapshot`]: relational result sets wrapped under a tag and replayed
//!   with forward iteration and keyed lookups
//!
//! ## Example
//!
//! ```
//! use wirekit::{SnapshotHandle, SnapshotSpec, Value, WireBuffer, wrap};
//!
//! let mut buf = WireBuffer::new();
//! let rows = vec![
//!     vec![Value::from("default"), Value::Int(80)],
//!     vec![Value::from("admin"), Value::Int(8080)],
//! ];
//! wrap(&mut buf, &SnapshotSpec::new("sites", 2).lookup(0), &rows).unwrap();
//!
//! let mut reader = buf.reader();
//! let mut sites = SnapshotHandle::begin_unwrap(&mut reader).unwrap();
//! let admin = sites.fetch_where(0, &Value::from("admin")).unwrap().unwrap();
//! assert_eq!(admin.int(1).unwrap(), 8080);
//! ```

pub mod codec;
pub mod error;
pub mod snapshot;

pub use codec::{Value, WireBuffer, WireReader, read_at};
pub use error::{Error, ErrorCategory, Result};
pub use snapshot::{
    MAX_COLUMNS, Row, SNAPSHOT_MARKER, SnapshotHandle, SnapshotSet, SnapshotSpec,
    is_snapshot_start, wrap,
};
