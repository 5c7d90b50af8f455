//! Canonical schemas and the on-disk seed layout.
//!
//! This module is the single source of truth for the four collections:
//! DDL, column lists, dedup keys, parquet write options, and the
//! branch-over-base unified view SQL all derive from here. The builder,
//! verifier, and federation layer must not restate any of it.
//!
//! Per-package layout:
//!
//! ```text
//! <package>/.devac/seed/<branch>/nodes.parquet
//! <package>/.devac/seed/<branch>/edges.parquet
//! <package>/.devac/seed/<branch>/external_refs.parquet
//! <package>/.devac/seed/<branch>/effects.parquet       (optional)
//! <package>/.devac/seed/<branch>/content-hash.txt
//! ```

use std::path::{Path, PathBuf};

use crate::types::BASE_BRANCH;

/// The four seed collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Symbol nodes.
    Nodes,
    /// Directed relations.
    Edges,
    /// Import sites.
    ExternalRefs,
    /// Code effects.
    Effects,
}

/// All collections in persist order.
pub const ALL_COLLECTIONS: [Collection; 4] = [
    Collection::Nodes,
    Collection::Edges,
    Collection::ExternalRefs,
    Collection::Effects,
];

impl Collection {
    /// Table / file stem name.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Edges => "edges",
            Self::ExternalRefs => "external_refs",
            Self::Effects => "effects",
        }
    }

    /// Column definitions for a staging table of this collection.
    pub fn ddl_columns(&self) -> &'static str {
        match self {
            Self::Nodes => {
                "entity_id VARCHAR NOT NULL,
                 name VARCHAR NOT NULL,
                 qualified_name VARCHAR NOT NULL,
                 kind VARCHAR NOT NULL,
                 file_path VARCHAR NOT NULL,
                 start_line INTEGER NOT NULL,
                 end_line INTEGER NOT NULL,
                 start_column INTEGER NOT NULL,
                 end_column INTEGER NOT NULL,
                 source_file_hash VARCHAR NOT NULL,
                 branch VARCHAR NOT NULL,
                 is_deleted BOOLEAN NOT NULL,
                 updated_at BIGINT NOT NULL,
                 is_exported BOOLEAN NOT NULL,
                 is_default_export BOOLEAN NOT NULL,
                 visibility VARCHAR NOT NULL,
                 is_async BOOLEAN NOT NULL,
                 is_generator BOOLEAN NOT NULL,
                 is_static BOOLEAN NOT NULL,
                 is_abstract BOOLEAN NOT NULL,
                 type_signature VARCHAR,
                 documentation VARCHAR,
                 decorators VARCHAR,
                 type_parameters VARCHAR,
                 properties VARCHAR"
            }
            Self::Edges => {
                "source_entity_id VARCHAR NOT NULL,
                 target_entity_id VARCHAR NOT NULL,
                 edge_type VARCHAR NOT NULL,
                 file_path VARCHAR NOT NULL,
                 start_line INTEGER NOT NULL,
                 start_column INTEGER NOT NULL,
                 branch VARCHAR NOT NULL,
                 is_deleted BOOLEAN NOT NULL,
                 updated_at BIGINT NOT NULL,
                 properties VARCHAR"
            }
            Self::ExternalRefs => {
                "source_entity_id VARCHAR NOT NULL,
                 module_specifier VARCHAR NOT NULL,
                 imported_symbol VARCHAR NOT NULL,
                 local_alias VARCHAR,
                 import_style VARCHAR NOT NULL,
                 is_type_only BOOLEAN NOT NULL,
                 is_reexport BOOLEAN NOT NULL,
                 is_resolved BOOLEAN NOT NULL,
                 target_entity_id VARCHAR,
                 file_path VARCHAR NOT NULL,
                 start_line INTEGER NOT NULL,
                 start_column INTEGER NOT NULL,
                 branch VARCHAR NOT NULL,
                 is_deleted BOOLEAN NOT NULL,
                 updated_at BIGINT NOT NULL"
            }
            Self::Effects => {
                "effect_id VARCHAR NOT NULL,
                 effect_type VARCHAR NOT NULL,
                 source_entity_id VARCHAR NOT NULL,
                 file_path VARCHAR NOT NULL,
                 start_line INTEGER NOT NULL,
                 callee_name VARCHAR NOT NULL,
                 is_external BOOLEAN NOT NULL,
                 is_async BOOLEAN NOT NULL,
                 is_constructor BOOLEAN NOT NULL,
                 branch VARCHAR NOT NULL,
                 is_deleted BOOLEAN NOT NULL,
                 updated_at BIGINT NOT NULL,
                 properties VARCHAR"
            }
        }
    }

    /// Columns forming the unified-view dedup key.
    pub fn dedup_key(&self) -> &'static [&'static str] {
        match self {
            Self::Nodes => &["entity_id"],
            Self::Edges => &["source_entity_id", "target_entity_id", "edge_type"],
            Self::ExternalRefs => &["source_entity_id", "module_specifier", "imported_symbol"],
            Self::Effects => &["effect_id"],
        }
    }

    /// `CREATE OR REPLACE TABLE` statement for a staging table named `name`.
    pub fn create_staging_sql(&self, name: &str) -> String {
        format!("CREATE OR REPLACE TABLE {name} ({})", self.ddl_columns())
    }

    /// Column names in DDL order, derived from [`Self::ddl_columns`].
    pub fn column_names(&self) -> Vec<&'static str> {
        self.ddl_columns()
            .split(',')
            .filter_map(|col| col.trim().split_whitespace().next())
            .collect()
    }

    /// Comma-separated column list in DDL order.
    pub fn select_list(&self) -> String {
        self.column_names().join(", ")
    }
}

/// Parquet write options applied to every seed file.
pub const PARQUET_COPY_OPTIONS: &str =
    "FORMAT PARQUET, COMPRESSION ZSTD, ROW_GROUP_SIZE 10000, DICTIONARY_SIZE_LIMIT 1048576";

/// `COPY <table> TO <path>` with the canonical parquet options.
pub fn copy_to_parquet_sql(table: &str, path: &Path) -> String {
    format!(
        "COPY {table} TO '{}' ({PARQUET_COPY_OPTIONS})",
        escape_path(path)
    )
}

/// `read_parquet` table expression over one or more files.
pub fn read_parquet_expr(paths: &[PathBuf]) -> String {
    let list = paths
        .iter()
        .map(|p| format!("'{}'", escape_path(p)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("read_parquet([{list}], union_by_name=true, filename=true)")
}

/// Escape a path for embedding in single-quoted SQL.
pub fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}

// ---------------------------------------------------------------------------
// Seed layout
// ---------------------------------------------------------------------------

/// Resolves on-disk locations for a package's seed files.
#[derive(Debug, Clone)]
pub struct SeedLayout {
    package_dir: PathBuf,
}

impl SeedLayout {
    /// Layout rooted at a package directory.
    pub fn new(package_dir: &Path) -> Self {
        Self { package_dir: package_dir.to_path_buf() }
    }

    /// The package root.
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// `<package>/.devac/seed/<branch>`.
    pub fn branch_dir(&self, branch: &str) -> PathBuf {
        self.package_dir.join(".devac").join("seed").join(branch)
    }

    /// Path of one collection's parquet file on a branch.
    pub fn collection_path(&self, branch: &str, collection: Collection) -> PathBuf {
        self.branch_dir(branch)
            .join(format!("{}.parquet", collection.table_name()))
    }

    /// Path of the branch's input-set manifest.
    pub fn manifest_path(&self, branch: &str) -> PathBuf {
        self.branch_dir(branch).join("content-hash.txt")
    }

    /// Whether a branch has any seed data at all.
    pub fn branch_exists(&self, branch: &str) -> bool {
        self.collection_path(branch, Collection::Nodes).exists()
    }

    /// The existing parquet files for one collection, branch overlay
    /// first. Used to build the unified view.
    pub fn existing_partitions(&self, branch: &str, collection: Collection) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if branch != BASE_BRANCH {
            let overlay = self.collection_path(branch, collection);
            if overlay.exists() {
                paths.push(overlay);
            }
        }
        let base = self.collection_path(BASE_BRANCH, collection);
        if base.exists() {
            paths.push(base);
        }
        paths
    }
}

// ---------------------------------------------------------------------------
// Unified view
// ---------------------------------------------------------------------------

/// Build the unified-view SQL for a collection given its partition files.
///
/// Branch rows shadow base rows under the collection's dedup key and
/// tombstoned rows are filtered out. With a single file the view
/// degenerates to that file; with none it is empty.
pub fn unified_view_sql(collection: Collection, layout: &SeedLayout, branch: &str) -> String {
    let base = layout.collection_path(BASE_BRANCH, collection);
    let overlay = if branch == BASE_BRANCH {
        None
    } else {
        Some(layout.collection_path(branch, collection))
    };

    let base_exists = base.exists();
    let overlay_exists = overlay.as_ref().map(|p| p.exists()).unwrap_or(false);

    match (overlay_exists, base_exists) {
        (true, true) => {
            let overlay = overlay.unwrap_or_default();
            let key_match = collection
                .dedup_key()
                .iter()
                .map(|col| format!("br.{col} = b.{col}"))
                .collect::<Vec<_>>()
                .join(" AND ");
            format!(
                "SELECT * FROM read_parquet('{overlay}') WHERE NOT is_deleted \
                 UNION ALL \
                 SELECT b.* FROM read_parquet('{base}') b \
                 WHERE NOT EXISTS (SELECT 1 FROM read_parquet('{overlay}') br WHERE {key_match}) \
                 AND NOT b.is_deleted",
                overlay = escape_path(&overlay),
                base = escape_path(&base),
            )
        }
        (true, false) => {
            let overlay = overlay.unwrap_or_default();
            format!(
                "SELECT * FROM read_parquet('{}') WHERE NOT is_deleted",
                escape_path(&overlay)
            )
        }
        (false, true) => format!(
            "SELECT * FROM read_parquet('{}') WHERE NOT is_deleted",
            escape_path(&base)
        ),
        (false, false) => {
            // No partitions: an always-empty relation.
            "SELECT * FROM (VALUES (NULL)) t(x) WHERE FALSE".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = SeedLayout::new(Path::new("/repo/pkg"));
        assert_eq!(
            layout.collection_path("base", Collection::Nodes),
            PathBuf::from("/repo/pkg/.devac/seed/base/nodes.parquet")
        );
        assert_eq!(
            layout.manifest_path("feature-x"),
            PathBuf::from("/repo/pkg/.devac/seed/feature-x/content-hash.txt")
        );
    }

    #[test]
    fn test_dedup_keys() {
        assert_eq!(Collection::Nodes.dedup_key(), &["entity_id"]);
        assert_eq!(
            Collection::Edges.dedup_key(),
            &["source_entity_id", "target_entity_id", "edge_type"]
        );
        assert_eq!(
            Collection::ExternalRefs.dedup_key(),
            &["source_entity_id", "module_specifier", "imported_symbol"]
        );
        assert_eq!(Collection::Effects.dedup_key(), &["effect_id"]);
    }

    #[test]
    fn test_staging_ddl_names_table() {
        let sql = Collection::Nodes.create_staging_sql("stage_nodes");
        assert!(sql.starts_with("CREATE OR REPLACE TABLE stage_nodes ("));
        assert!(sql.contains("entity_id VARCHAR NOT NULL"));
        assert!(sql.contains("updated_at BIGINT NOT NULL"));
    }

    #[test]
    fn test_unified_view_degenerates_when_empty() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let layout = SeedLayout::new(dir.path());
        let sql = unified_view_sql(Collection::Nodes, &layout, "base");
        assert!(sql.contains("WHERE FALSE"));
    }

    #[test]
    fn test_unified_view_overlays_branch_over_base() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let layout = SeedLayout::new(dir.path());
        for branch in ["base", "feature"] {
            let dir = layout.branch_dir(branch);
            std::fs::create_dir_all(&dir).expect("mkdir");
            std::fs::write(dir.join("edges.parquet"), b"stub").expect("write");
        }
        let sql = unified_view_sql(Collection::Edges, &layout, "feature");
        assert!(sql.contains("UNION ALL"));
        assert!(sql.contains("NOT EXISTS"));
        assert!(sql.contains("br.source_entity_id = b.source_entity_id"));
        assert!(sql.contains("br.edge_type = b.edge_type"));
    }

    #[test]
    fn test_read_parquet_expr_quotes_paths() {
        let expr = read_parquet_expr(&[PathBuf::from("/a/nodes.parquet")]);
        assert_eq!(
            expr,
            "read_parquet(['/a/nodes.parquet'], union_by_name=true, filename=true)"
        );
    }
}
