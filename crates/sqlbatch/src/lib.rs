//! # sqlbatch
//!
//! Split SQL scripts into batches and run them with bounded retry.
//!
//! - [`split`]: lazy batch splitter that understands comments and quoted
//!   literals, so a `GO` inside either never ends a batch
//! - [`run_script`]: validate a script, then run each batch through a
//!   [`BatchExecutor`], retrying only while the target reports it is busy
//!
//! ## Example
//!
//! ```
//! let script = "-- setup\nCREATE TABLE t (id int)\nGO\nINSERT INTO t VALUES ('GO')";
//! let batches: Vec<String> = sqlbatch::split(script).collect::<Result<_, _>>().unwrap();
//! assert_eq!(batches, vec!["CREATE TABLE t (id int)", "INSERT INTO t VALUES ('GO')"]);
//! ```

pub mod error;
pub mod retry;
pub mod runner;
pub mod splitter;

pub use error::{Error, ErrorCategory, Result};
pub use retry::{LogCallback, NoCallback, RetryCallback, RetryPolicy, with_retry};
pub use runner::{BatchExecutor, run_script};
pub use splitter::{Batches, split};
