//! Error types for devac-core.
//!
//! Uses a single hierarchical error enum so callers can pattern-match on
//! the failing subsystem. Per-file failures are carried in reports and
//! never propagate past the sync orchestrator; everything else surfaces
//! through `DevacResult`.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all devac-core operations.
#[derive(Debug, Error)]
pub enum DevacError {
    // ---- Recoverable (operation failed, system healthy) ----
    /// A single file failed to parse. The rest of the batch is still written.
    #[error("parse error for {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// The per-package resolver exceeded its time budget. Affected refs
    /// stay unresolved until the next sync.
    #[error("semantic resolution timed out for {package} after {elapsed_ms}ms")]
    ResolveTimeout {
        /// Package directory being resolved.
        package: PathBuf,
        /// Elapsed time when the budget was exhausted.
        elapsed_ms: u64,
    },

    /// The central hub refused a write. Seed parquet stays current but the
    /// registry entry is stale.
    #[error("hub write failed: {0}")]
    HubWrite(String),

    /// A malformed `devac://` URI or relative reference.
    #[error("invalid URI {input:?}: {detail}")]
    UriParse {
        /// The offending input.
        input: String,
        /// What was wrong with it.
        detail: String,
    },

    // ---- Fatal to the current operation ----
    /// A row violated the fixed schema; the batch is refused.
    #[error("schema violation in {table} row {row}: {field}")]
    SchemaViolation {
        /// Table the row was destined for.
        table: String,
        /// Zero-based row index within the batch.
        row: usize,
        /// The violated field or constraint.
        field: String,
    },

    /// Parquet content contradicts an on-disk assumption.
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(String),

    /// The pool had no free handle within the acquire timeout.
    #[error("timed out acquiring a store handle after {0}ms")]
    AcquireTimeout(u64),

    /// The pool was shut down while the operation was waiting.
    #[error("store pool is shut down")]
    PoolShutdown,

    /// Engine-level fault (fatal error class). Retried once on a fresh
    /// handle before propagating.
    #[error("fatal store error: {0}")]
    FatalStore(String),

    /// SQL macro expansion failed; the query was not executed.
    #[error("query preprocessing failed: {0}")]
    Preprocess(String),

    /// A concurrent sync of the same package is already running.
    #[error("package {0} is already syncing")]
    AlreadySyncing(PathBuf),

    /// Configuration is invalid or missing required fields.
    #[error("configuration error: {details}")]
    Config {
        /// What's wrong with the config.
        details: String,
    },

    // ---- Wrapped external errors ----
    /// DuckDB error.
    #[error("store error: {0}")]
    Store(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DevacError {
    /// Whether this error belongs to the fatal store class that warrants
    /// discarding the handle and retrying once on a fresh one.
    pub fn is_fatal_store(&self) -> bool {
        match self {
            Self::FatalStore(_) => true,
            Self::Store(e) => is_fatal_message(&e.to_string()),
            _ => false,
        }
    }
}

/// Case-insensitive match against the fatal-class error markers.
pub(crate) fn is_fatal_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["fatal", "out of memory", "database is locked", "connection closed"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Convenience type alias for Results in devac-core.
pub type DevacResult<T> = Result<T, DevacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_message_classification() {
        assert!(is_fatal_message("FATAL: database handle poisoned"));
        assert!(is_fatal_message("Out of Memory while hashing"));
        assert!(is_fatal_message("database is locked"));
        assert!(is_fatal_message("connection closed by peer"));
        assert!(!is_fatal_message("no such table: nodes"));
        assert!(!is_fatal_message("syntax error at or near SELECT"));
    }

    #[test]
    fn test_fatal_store_variant_is_fatal() {
        assert!(DevacError::FatalStore("boom".into()).is_fatal_store());
        assert!(!DevacError::Preprocess("bad macro".into()).is_fatal_store());
    }
}
