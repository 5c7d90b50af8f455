//! Integrity verifier for a package's seed partition.
//!
//! Non-destructive: it reads the parquet set, checks referential
//! consistency and tombstone invariants, and reports. A failed
//! verification leaves the seeds in place for diagnosis.

use std::collections::HashSet;
use std::path::Path;

use crate::builder::load_collection_rows;
use crate::error::DevacResult;
use crate::identity::file_content_hash;
use crate::schema::{Collection, SeedLayout, ALL_COLLECTIONS};
use crate::store::{self, StorePool};
use crate::types::{Edge, EdgeKind, ExternalRef, Node};

/// Counters over the verified partition.
#[derive(Debug, Clone, Default)]
pub struct VerifyStats {
    /// Live nodes.
    pub node_count: usize,
    /// Live edges.
    pub edge_count: usize,
    /// Live external refs.
    pub ref_count: usize,
    /// Distinct files with live nodes.
    pub file_count: usize,
    /// Live refs not yet bound.
    pub unresolved_refs: usize,
    /// Live edges with a missing same-package endpoint.
    pub orphaned_edges: usize,
}

/// Verification outcome.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Whether every check passed.
    pub valid: bool,
    /// Check failures.
    pub errors: Vec<String>,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
    /// Partition counters.
    pub stats: VerifyStats,
}

/// Verifier over the shared pool.
pub struct IntegrityVerifier {
    pool: StorePool,
}

impl IntegrityVerifier {
    /// Create a verifier on the shared pool.
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Verify one package + branch.
    pub async fn verify(&self, package_dir: &Path, branch: &str) -> DevacResult<VerifyReport> {
        let layout = SeedLayout::new(package_dir);
        let mut report = VerifyReport::default();

        let handle = self.pool.acquire().await?;
        let loaded = (|| -> DevacResult<(Vec<Node>, Vec<Edge>, Vec<ExternalRef>)> {
            let conn = handle.connection();

            // 1. Every parquet file must be openable.
            for collection in ALL_COLLECTIONS {
                let path = layout.collection_path(branch, collection);
                if !path.exists() {
                    if collection != Collection::Effects && branch == crate::types::BASE_BRANCH {
                        report
                            .warnings
                            .push(format!("{} missing on branch {branch}", collection.table_name()));
                    }
                    continue;
                }
                if let Err(err) = store::parquet_row_count(&handle, &path) {
                    report
                        .errors
                        .push(format!("{} unreadable: {err}", path.display()));
                }
            }

            let nodes = load_collection_rows(conn, &layout, branch, Collection::Nodes)?.nodes;
            let edges = load_collection_rows(conn, &layout, branch, Collection::Edges)?.edges;
            let refs = load_collection_rows(conn, &layout, branch, Collection::ExternalRefs)?
                .external_refs;

            // Tombstone invariant: the unified view returns exactly the
            // live set.
            if layout.collection_path(branch, Collection::Nodes).exists()
                || layout.branch_exists(crate::types::BASE_BRANCH)
            {
                let view_sql = crate::schema::unified_view_sql(Collection::Nodes, &layout, branch);
                let view_count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM ({view_sql})"),
                    [],
                    |row| row.get(0),
                )?;
                let live = nodes.iter().filter(|n| !n.is_deleted).count();
                if view_count as usize != live {
                    report.errors.push(format!(
                        "unified view returned {view_count} rows but {live} live rows exist"
                    ));
                }
            }

            Ok((nodes, edges, refs))
        })();
        self.pool.release(handle);
        let (nodes, edges, refs) = loaded?;

        let live_nodes: Vec<_> = nodes.iter().filter(|n| !n.is_deleted).collect();
        let live_ids: HashSet<&str> = live_nodes.iter().map(|n| n.entity_id.as_str()).collect();
        // Identity prefixes owned by this package, to tell an orphan
        // from an explicitly external endpoint.
        let own_prefixes: HashSet<String> = live_nodes
            .iter()
            .filter_map(|n| {
                n.entity_id
                    .rsplitn(3, ':')
                    .nth(2)
                    .map(|prefix| prefix.to_string())
            })
            .collect();

        report.stats.node_count = live_nodes.len();
        report.stats.file_count = live_nodes
            .iter()
            .map(|n| n.file_path.as_str())
            .collect::<HashSet<_>>()
            .len();

        // 2. Edge endpoints must be live nodes or explicitly external.
        let is_external = |entity_id: &str| {
            entity_id
                .rsplitn(3, ':')
                .nth(2)
                .map(|prefix| !own_prefixes.contains(prefix))
                .unwrap_or(false)
        };
        for edge in edges.iter().filter(|e| !e.is_deleted) {
            report.stats.edge_count += 1;
            let source_ok = live_ids.contains(edge.source_entity_id.as_str())
                || is_external(&edge.source_entity_id);
            let target_ok = live_ids.contains(edge.target_entity_id.as_str())
                || is_external(&edge.target_entity_id);
            if !source_ok || !target_ok {
                report.stats.orphaned_edges += 1;
                if edge.edge_type == EdgeKind::Contains {
                    report.errors.push(format!(
                        "CONTAINS edge {} -> {} has a dead endpoint",
                        edge.source_entity_id, edge.target_entity_id
                    ));
                } else {
                    report.warnings.push(format!(
                        "{} edge {} -> {} has a dead endpoint",
                        edge.edge_type, edge.source_entity_id, edge.target_entity_id
                    ));
                }
            }
        }

        // 3. Live rows must point at existing files; tombstones may
        // point anywhere. A changed-on-disk hash is pending work, not
        // corruption.
        let mut checked_files: HashSet<&str> = HashSet::new();
        for node in &live_nodes {
            if !checked_files.insert(node.file_path.as_str()) {
                continue;
            }
            let on_disk = package_dir.join(&node.file_path);
            if !on_disk.exists() {
                report.errors.push(format!(
                    "live rows reference {} but the file is gone (missing tombstones)",
                    node.file_path
                ));
                continue;
            }
            if let Ok(content) = std::fs::read(&on_disk) {
                if file_content_hash(&content) != node.source_file_hash {
                    report
                        .warnings
                        .push(format!("{} changed since last sync", node.file_path));
                }
            }
        }

        for ext_ref in refs.iter().filter(|r| !r.is_deleted) {
            report.stats.ref_count += 1;
            if !ext_ref.is_resolved {
                report.stats.unresolved_refs += 1;
            }
        }

        // 4. No stray temp files from aborted writes.
        if let Ok(entries) = std::fs::read_dir(layout.branch_dir(branch)) {
            for entry in entries.flatten() {
                if entry.path().extension().map(|e| e == "tmp").unwrap_or(false) {
                    report
                        .errors
                        .push(format!("stray temp file {}", entry.path().display()));
                }
            }
        }

        report.valid = report.errors.is_empty();
        tracing::info!(
            package = %package_dir.display(),
            branch,
            valid = report.valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "verification complete"
        );
        Ok(report)
    }
}
