//! Crash-safe JSON state files.
//!
//! tasksync keeps two kinds of local files between runs: the content-hash
//! ledger and artifact snapshots. Both are small JSON documents that must
//! never be left half-written, and both may legitimately be absent on the
//! first run. This crate covers exactly that:
//!
//! - [`write_json_atomic`] / [`write_bytes_atomic`]: temp-file-then-rename writes
//! - [`read_json`] / [`read_json_optional`]: reads that report which file failed
//!   to parse, with a missing file mapped to `None`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atomic;
pub mod error;
pub mod reader;

pub use atomic::{write_bytes_atomic, write_json_atomic};
pub use error::{Error, Result};
pub use reader::{read_json, read_json_optional};
