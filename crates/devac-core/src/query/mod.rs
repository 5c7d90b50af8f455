//! Federated SQL over every registered package's seeds.
//!
//! A hub query lists the registered repos, discovers their packages'
//! seed directories, expands the `@package` / `@*` macros, creates
//! transient union views per collection, and executes with fatal-error
//! recovery. Results come back as column-name/value row maps; rendering
//! is the caller's concern.
//!
//! Queries are not snapshot-isolated: a sync renaming a parquet
//! mid-query gives the query either the old or the new file, and two
//! queries may see different versions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use regex::Regex;
use serde_json::json;

use crate::error::{DevacError, DevacResult};
use crate::hub::CentralHub;
use crate::schema::{read_parquet_expr, Collection, SeedLayout, ALL_COLLECTIONS};
use crate::store::{self, StorePool};
use crate::types::BASE_BRANCH;

/// Options for a federated query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Seed partition to read; packages without it fall back to base.
    pub branch: String,
    /// Serve repeat queries from the hub's result cache.
    pub use_cache: bool,
    /// TTL for cached results, when caching. `None` uses the hub default.
    pub cache_ttl_ms: Option<i64>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { branch: BASE_BRANCH.to_string(), use_cache: false, cache_ttl_ms: None }
    }
}

/// A federated query result.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Rows as `column -> value` maps, in result order.
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Number of rows.
    pub row_count: usize,
    /// Wall-clock execution time.
    pub time_ms: u64,
}

/// A package with seeds, discovered under a registered repo.
#[derive(Debug, Clone)]
pub struct PackageSeeds {
    /// Owning repo id.
    pub repo_id: String,
    /// Short package name (directory name; repo id for the repo root).
    pub name: String,
    /// Absolute package directory.
    pub package_dir: PathBuf,
}

impl PackageSeeds {
    /// `repoId:name` qualified form.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.repo_id, self.name)
    }

    /// Existing parquet files of one collection for a branch, falling
    /// back to base when the branch has no partition.
    pub fn collection_file(&self, branch: &str, collection: Collection) -> Option<PathBuf> {
        let layout = SeedLayout::new(&self.package_dir);
        let own = layout.collection_path(branch, collection);
        if own.exists() {
            return Some(own);
        }
        if branch != BASE_BRANCH {
            let base = layout.collection_path(BASE_BRANCH, collection);
            if base.exists() {
                return Some(base);
            }
        }
        None
    }

    /// Every existing parquet file for a branch.
    pub fn all_files(&self, branch: &str) -> Vec<PathBuf> {
        ALL_COLLECTIONS
            .iter()
            .filter_map(|collection| self.collection_file(branch, *collection))
            .collect()
    }
}

/// Federated query executor over the shared pool.
pub struct FederatedQuery {
    pool: StorePool,
}

impl FederatedQuery {
    /// Create an executor on the shared pool.
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Execute `sql` across every registered package.
    pub async fn hub_query(
        &self,
        hub: &CentralHub,
        sql: &str,
        options: &QueryOptions,
    ) -> DevacResult<QueryResult> {
        let started = Instant::now();

        let cache_key = query_hash(sql, &options.branch);
        if options.use_cache {
            if let Some(cached) = hub.get_cached_query(&cache_key)? {
                if let Ok(rows) = serde_json::from_value::<
                    Vec<serde_json::Map<String, serde_json::Value>>,
                >(cached)
                {
                    tracing::debug!(hash = %cache_key, "hub query served from cache");
                    return Ok(QueryResult {
                        row_count: rows.len(),
                        rows,
                        time_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
        }

        let packages = discover_packages(hub)?;
        let prepared = preprocess_sql(sql, &packages, &options.branch)?;
        let branch = options.branch.clone();

        let rows = store::execute_with_recovery(&self.pool, move |handle| {
            let conn = handle.connection();
            create_union_views(conn, &packages, &branch)?;

            let mut stmt = conn.prepare(&prepared)?;
            let mut out: Vec<serde_json::Map<String, serde_json::Value>> = Vec::new();
            let mut names: Option<Vec<String>> = None;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let stmt_ref = row.as_ref();
                let names = names.get_or_insert_with(|| {
                    stmt_ref.column_names().iter().map(|n| n.to_string()).collect()
                });
                let mut map = serde_json::Map::new();
                for (i, name) in names.iter().enumerate() {
                    map.insert(name.clone(), value_to_json(row.get_ref(i)?));
                }
                out.push(map);
            }
            Ok(out)
        })
        .await?;

        let result = QueryResult {
            row_count: rows.len(),
            rows,
            time_ms: started.elapsed().as_millis() as u64,
        };

        if options.use_cache {
            let payload = serde_json::to_value(&result.rows)
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            if let Err(err) = hub.cache_query(&cache_key, &payload, options.cache_ttl_ms) {
                tracing::warn!(error = %err, "failed to cache query result");
            }
        }

        tracing::debug!(rows = result.row_count, time_ms = result.time_ms, "hub query complete");
        Ok(result)
    }
}

/// Stable hash of a query + branch, the result-cache key.
pub fn query_hash(sql: &str, branch: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hasher.update([0]);
    hasher.update(branch.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

// ---------------------------------------------------------------------------
// Package discovery
// ---------------------------------------------------------------------------

/// List every package with seeds under every registered repo,
/// deduplicated by package path.
pub fn discover_packages(hub: &CentralHub) -> DevacResult<Vec<PackageSeeds>> {
    let mut seen: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();
    let mut packages = Vec::new();

    for repo in hub.list_repos()? {
        if !repo.local_path.exists() {
            tracing::warn!(repo = %repo.repo_id, path = %repo.local_path.display(), "repo path missing, skipped");
            continue;
        }
        for dir in seed_dirs_under(&repo.local_path) {
            if !seen.insert(dir.clone()) {
                continue;
            }
            let name = if dir == repo.local_path {
                repo.repo_id.clone()
            } else {
                dir.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| repo.repo_id.clone())
            };
            packages.push(PackageSeeds { repo_id: repo.repo_id.clone(), name, package_dir: dir });
        }
    }

    Ok(packages)
}

/// Directories under `root` (root included) carrying a `.devac/seed`.
fn seed_dirs_under(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .max_depth(6)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir()
                && matches!(name.as_ref(), ".git" | "node_modules" | "target" | "dist" | "build"))
        });
    for entry in walker.flatten() {
        if entry.file_type().is_dir() && entry.path().join(".devac").join("seed").is_dir() {
            dirs.push(entry.path().to_path_buf());
        }
    }
    dirs
}

// ---------------------------------------------------------------------------
// SQL preprocessing
// ---------------------------------------------------------------------------

/// Expand `@package` and `@*` macros into `read_parquet` table
/// expressions. Unknown packages are a preprocessing error; nothing is
/// executed.
pub fn preprocess_sql(
    sql: &str,
    packages: &[PackageSeeds],
    branch: &str,
) -> DevacResult<String> {
    // Bare names resolve to whichever package was registered last.
    let mut by_name: HashMap<String, &PackageSeeds> = HashMap::new();
    for package in packages {
        by_name.insert(package.name.clone(), package);
        by_name.insert(package.qualified_name(), package);
    }

    let macro_re = Regex::new(r"@(\*|[A-Za-z0-9_][A-Za-z0-9_.:\-]*)")
        .map_err(|e| DevacError::Internal(format!("macro regex: {e}")))?;

    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for caps in macro_re.captures_iter(sql) {
        let whole = caps.get(0).ok_or_else(|| DevacError::Preprocess("empty macro".into()))?;
        let token = &caps[1];
        out.push_str(&sql[last..whole.start()]);

        let files: Vec<PathBuf> = if token == "*" {
            packages.iter().flat_map(|p| p.all_files(branch)).collect()
        } else {
            let package = by_name.get(token).ok_or_else(|| {
                DevacError::Preprocess(format!("unknown package @{token}"))
            })?;
            package.all_files(branch)
        };
        if files.is_empty() {
            return Err(DevacError::Preprocess(format!(
                "no seed files for @{token} on branch {branch}"
            )));
        }
        out.push_str(&read_parquet_expr(&files));
        last = whole.end();
    }
    out.push_str(&sql[last..]);
    Ok(out)
}

/// `CREATE OR REPLACE VIEW` per collection over all packages' files.
/// Collections with no files anywhere get no view; a query referencing
/// one fails at execution, not here.
fn create_union_views(
    conn: &duckdb::Connection,
    packages: &[PackageSeeds],
    branch: &str,
) -> DevacResult<()> {
    for collection in ALL_COLLECTIONS {
        let files: Vec<PathBuf> = packages
            .iter()
            .filter_map(|p| p.collection_file(branch, collection))
            .collect();
        if files.is_empty() {
            continue;
        }
        conn.execute_batch(&format!(
            "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
            collection.table_name(),
            read_parquet_expr(&files)
        ))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

fn value_to_json(value: duckdb::types::ValueRef<'_>) -> serde_json::Value {
    use duckdb::types::ValueRef;
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Boolean(b) => json!(b),
        ValueRef::TinyInt(i) => json!(i),
        ValueRef::SmallInt(i) => json!(i),
        ValueRef::Int(i) => json!(i),
        ValueRef::BigInt(i) => json!(i),
        ValueRef::HugeInt(i) => json!(i.to_string()),
        ValueRef::UTinyInt(i) => json!(i),
        ValueRef::USmallInt(i) => json!(i),
        ValueRef::UInt(i) => json!(i),
        ValueRef::UBigInt(i) => json!(i),
        ValueRef::Float(f) => json!(f),
        ValueRef::Double(f) => json!(f),
        ValueRef::Text(bytes) => json!(String::from_utf8_lossy(bytes)),
        ValueRef::Blob(bytes) => json!(format!("<{} bytes>", bytes.len())),
        other => json!(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(repo: &str, name: &str, dir: &Path) -> PackageSeeds {
        PackageSeeds {
            repo_id: repo.into(),
            name: name.into(),
            package_dir: dir.to_path_buf(),
        }
    }

    fn seed_package(dir: &Path, branch: &str) {
        let seed = dir.join(".devac").join("seed").join(branch);
        std::fs::create_dir_all(&seed).expect("mkdir");
        std::fs::write(seed.join("nodes.parquet"), b"stub").expect("write");
        std::fs::write(seed.join("edges.parquet"), b"stub").expect("write");
    }

    #[test]
    fn test_preprocess_expands_named_package() {
        let dir = tempfile::tempdir().expect("tmp");
        seed_package(dir.path(), "base");
        let packages = vec![package("r1", "ui", dir.path())];

        let sql = preprocess_sql("SELECT * FROM @ui WHERE x = 1", &packages, "base").expect("ok");
        assert!(sql.contains("read_parquet(["));
        assert!(sql.contains("nodes.parquet"));
        assert!(sql.contains("union_by_name=true, filename=true"));
        assert!(!sql.contains('@'));
    }

    #[test]
    fn test_preprocess_qualified_name() {
        let dir = tempfile::tempdir().expect("tmp");
        seed_package(dir.path(), "base");
        let packages = vec![package("r1", "ui", dir.path())];
        let sql = preprocess_sql("SELECT 1 FROM @r1:ui", &packages, "base").expect("ok");
        assert!(sql.contains("read_parquet"));
    }

    #[test]
    fn test_preprocess_star_unions_everything() {
        let a = tempfile::tempdir().expect("tmp");
        let b = tempfile::tempdir().expect("tmp");
        seed_package(a.path(), "base");
        seed_package(b.path(), "base");
        let packages = vec![package("r1", "a", a.path()), package("r2", "b", b.path())];

        let sql = preprocess_sql("SELECT COUNT(*) FROM @*", &packages, "base").expect("ok");
        assert!(sql.matches("nodes.parquet").count() == 2);
    }

    #[test]
    fn test_preprocess_unknown_package_errors() {
        let err = preprocess_sql("SELECT * FROM @ghost", &[], "base").expect_err("should fail");
        assert!(matches!(err, DevacError::Preprocess(_)));
    }

    #[test]
    fn test_bare_name_conflict_resolves_to_last() {
        let a = tempfile::tempdir().expect("tmp");
        let b = tempfile::tempdir().expect("tmp");
        seed_package(a.path(), "base");
        seed_package(b.path(), "base");
        let packages = vec![package("r1", "ui", a.path()), package("r2", "ui", b.path())];

        let sql = preprocess_sql("SELECT 1 FROM @ui", &packages, "base").expect("ok");
        let b_path = b.path().to_string_lossy().to_string();
        assert!(sql.contains(&b_path), "later registration wins");
    }

    #[test]
    fn test_branch_falls_back_to_base() {
        let dir = tempfile::tempdir().expect("tmp");
        seed_package(dir.path(), "base");
        let p = package("r1", "ui", dir.path());
        let file = p.collection_file("feature", Collection::Nodes).expect("fallback");
        assert!(file.to_string_lossy().contains("base"));
    }
}
