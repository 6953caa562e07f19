//! Low-level primitives underneath the write path.
//!
//! Byte encoding helpers, positioned file I/O and the durable log.

/// Byte-level utilities and encoding/decoding.
///
/// Varints and a bounds-checked cursor used by the record codec.
pub mod bytes;

/// I/O abstractions and utilities.
///
/// Positioned reads and writes against a single file.
pub mod io;

/// Write-ahead logging (WAL) for crash recovery.
///
/// The append contract the transaction commits through, plus in-memory and
/// file-backed implementations.
pub mod wal;
