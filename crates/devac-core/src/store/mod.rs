//! Columnar store: a pooled in-process DuckDB instance.
//!
//! All persisted data is parquet (ZSTD, row-group 10 000, dictionary
//! encoded); the engine reads it with zero-copy memory mapping. This
//! module owns the handle pool, the fatal-error recovery wrapper, and
//! the atomic parquet write discipline.

pub mod pool;

use std::path::Path;

use crate::error::{DevacError, DevacResult};
use crate::schema;

pub use pool::{StoreHandle, StorePool};

/// Run `op` on a pooled handle, retrying once on a fresh handle if the
/// error text is fatal-class (`fatal`, `out of memory`, `database is
/// locked`, `connection closed`). Non-fatal errors propagate directly.
pub async fn execute_with_recovery<T, F>(pool: &StorePool, mut op: F) -> DevacResult<T>
where
    F: FnMut(&StoreHandle) -> DevacResult<T>,
{
    let handle = pool.acquire().await?;
    match op(&handle) {
        Ok(value) => {
            pool.release(handle);
            Ok(value)
        }
        Err(err) if err.is_fatal_store() => {
            tracing::warn!(error = %err, "fatal store error, retrying on a fresh handle");
            pool.mark_failed(handle);
            let handle = pool.acquire().await?;
            match op(&handle) {
                Ok(value) => {
                    pool.release(handle);
                    Ok(value)
                }
                Err(retry_err) => {
                    if retry_err.is_fatal_store() {
                        pool.mark_failed(handle);
                    } else {
                        pool.release(handle);
                    }
                    Err(retry_err)
                }
            }
        }
        Err(err) => {
            pool.release(handle);
            Err(err)
        }
    }
}

/// Copy a staged table to a parquet file with the canonical options,
/// atomically: the data lands in a `.tmp` sibling, is fsynced, then
/// renamed over the final name. A reader opening the file after the
/// rename sees the new contents; one holding an older descriptor keeps
/// the old contents. The final file is never written in place.
pub fn write_table_to_parquet_atomic(
    handle: &StoreHandle,
    table: &str,
    final_path: &Path,
) -> DevacResult<()> {
    let parent = final_path
        .parent()
        .ok_or_else(|| DevacError::Internal(format!("no parent dir for {}", final_path.display())))?;
    std::fs::create_dir_all(parent)?;

    let tmp_path = final_path.with_extension("parquet.tmp");
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    handle
        .connection()
        .execute_batch(&schema::copy_to_parquet_sql(table, &tmp_path))?;

    // Flush file contents before the rename makes them visible.
    std::fs::File::open(&tmp_path)?.sync_all()?;
    std::fs::rename(&tmp_path, final_path)?;

    tracing::debug!(path = %final_path.display(), table, "parquet written");
    Ok(())
}

/// Count the rows of a parquet file.
pub fn parquet_row_count(handle: &StoreHandle, path: &Path) -> DevacResult<usize> {
    let count: i64 = handle.connection().query_row(
        &format!(
            "SELECT COUNT(*) FROM read_parquet('{}')",
            schema::escape_path(path)
        ),
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}
