//! Shared `SQLite` connection handling.
//!
//! One connection per database, wrapped in a `Mutex` for thread-safe access.
//! WAL mode and a busy timeout keep concurrent readers responsive while the
//! mutex serializes writes.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Acquires the connection lock for one project-scoped table, recovering
/// from poison.
///
/// A poisoned lock means a previous holder panicked mid-operation; the
/// connection itself stays usable. The `scope` is the table the caller is
/// about to touch (project-prefixed), so recoveries are attributable to a
/// project in the metrics.
pub(crate) fn acquire_lock<'a, T>(mutex: &'a Mutex<T>, scope: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!(scope, "recovering poisoned connection lock");
        metrics::counter!(
            "repolens_lock_poison_recoveries_total",
            "scope" => scope.to_string()
        )
        .increment(1);
        poisoned.into_inner()
    })
}

/// Maps a rusqlite error into a crate error for the named operation.
pub(crate) fn storage_err(operation: &str, e: &rusqlite::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Opens a database at `path`, applying the standard pragmas.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn open_database(path: impl Into<PathBuf>) -> Result<Mutex<Connection>> {
    let path = path.into();
    let conn = Connection::open(&path).map_err(|e| storage_err("open_database", &e))?;
    apply_pragmas(&conn);
    Ok(Mutex::new(conn))
}

/// Opens an in-memory database (useful for testing).
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn open_in_memory() -> Result<Mutex<Connection>> {
    let conn = Connection::open_in_memory().map_err(|e| storage_err("open_in_memory", &e))?;
    apply_pragmas(&conn);
    Ok(Mutex::new(conn))
}

fn apply_pragmas(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Returns the default database path under the platform data directory.
#[must_use]
pub fn default_db_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || Path::new(".").join("repolens.db"),
        |b| b.data_local_dir().join("repolens").join("repolens.db"),
    )
}

/// Encodes an embedding vector as little-endian `f32` bytes.
#[must_use]
pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes little-endian `f32` bytes back into a vector.
#[must_use]
pub(crate) fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let conn = open_in_memory();
        assert!(conn.is_ok());
    }

    #[test]
    fn test_open_database_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.db");
        assert!(open_database(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_vector_roundtrip() {
        let vector = vec![0.5_f32, -1.25, 3.75, 0.0];
        let bytes = encode_vector(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_vector(&bytes), vector);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = encode_vector(&[1.0, 2.0]);
        bytes.push(0xFF);
        assert_eq!(decode_vector(&bytes).len(), 2);
    }
}
