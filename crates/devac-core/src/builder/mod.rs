//! Per-package graph builder.
//!
//! `build` walks a package, hashes every source file, diffs against the
//! previous seed state, re-parses only dirty files, tombstones entities
//! from deleted files, and persists a complete partition snapshot per
//! collection with the atomic temp-fsync-rename discipline. A reader
//! never sees a partially written parquet.
//!
//! Per-file parse errors are recorded in the report and skip that file;
//! the rest of the batch is still written. I/O errors on the temp file
//! or rename abort the write and leave the previous parquet intact.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::{DevacError, DevacResult};
use crate::identity::{file_content_hash, manifest_hash};
use crate::parser::{self, ParseContext};
use crate::schema::{Collection, SeedLayout};
use crate::store::{self, StoreHandle, StorePool};
use crate::types::{CodeEffect, Edge, EdgeKind, ExternalRef, Node};

mod rows;

pub use rows::load_collection_rows;
use rows::{append_batch, PreviousState};

/// Stage a batch into fresh `stage_*` tables on the handle's
/// connection. Used by the builder itself and by the sync
/// orchestrator's binding write-back.
pub fn stage_batch(handle: &StoreHandle, batch: &parser::FileParse) -> DevacResult<()> {
    append_batch(handle, batch)
}

/// Result of building one package's seed partition.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Files discovered in the walk.
    pub files_total: usize,
    /// Files whose hash matched the previous state.
    pub files_unchanged: usize,
    /// Files re-parsed this build.
    pub files_parsed: usize,
    /// Files present previously but gone from disk.
    pub files_deleted: usize,
    /// Files that failed to parse (skipped, recorded in `errors`).
    pub files_failed: usize,
    /// Live node rows written.
    pub nodes_written: usize,
    /// Live edge rows written.
    pub edges_written: usize,
    /// Live external ref rows written.
    pub refs_written: usize,
    /// Live effect rows written.
    pub effects_written: usize,
    /// Tombstone rows written across collections.
    pub tombstones_written: usize,
    /// Manifest hash over the branch's input set.
    pub manifest_hash: String,
    /// Per-file errors.
    pub errors: Vec<String>,
    /// Wall-clock build time.
    pub time_ms: u64,
}

/// Per-package graph builder over a shared store pool.
pub struct GraphBuilder {
    pool: StorePool,
    config: SyncConfig,
}

impl GraphBuilder {
    /// Create a builder using the given pool and sync settings.
    pub fn new(pool: StorePool, config: SyncConfig) -> Self {
        Self { pool, config }
    }

    /// Build the seed partition for `branch` of the package at
    /// `package_dir`, identified as `repo`/`package`.
    pub async fn build(
        &self,
        repo: &str,
        package: &str,
        package_dir: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> DevacResult<BuildReport> {
        let started = Instant::now();
        let layout = SeedLayout::new(package_dir);
        let mut report = BuildReport::default();

        // 1. Discover + hash source files.
        let files = discover_files(package_dir, &self.config)?;
        report.files_total = files.len();

        let hashed: Vec<(String, PathBuf, String)> = files
            .into_par_iter()
            .filter_map(|(rel, abs)| {
                let content = std::fs::read(&abs).ok()?;
                Some((rel, abs, file_content_hash(&content)))
            })
            .collect();

        // 2. Load the previous state and diff. The handle is released
        // on every exit path below.
        let handle = self.pool.acquire().await?;
        let previous = match PreviousState::load(&handle, &layout, branch) {
            Ok(previous) => previous,
            Err(err) => {
                self.pool.release(handle);
                return Err(err);
            }
        };

        let on_disk: HashMap<&str, &str> = hashed
            .iter()
            .map(|(rel, _, hash)| (rel.as_str(), hash.as_str()))
            .collect();

        let mut dirty: Vec<(String, PathBuf, String)> = Vec::new();
        let mut unchanged: HashSet<String> = HashSet::new();
        for entry in &hashed {
            match previous.file_hashes.get(&entry.0) {
                Some(prev) if prev == &entry.2 => {
                    unchanged.insert(entry.0.clone());
                }
                _ => dirty.push(entry.clone()),
            }
        }
        let deleted: Vec<String> = previous
            .file_hashes
            .keys()
            .filter(|path| !on_disk.contains_key(path.as_str()))
            .cloned()
            .collect();

        report.files_unchanged = unchanged.len();
        report.files_deleted = deleted.len();

        tracing::debug!(
            package = %package_dir.display(),
            branch,
            total = report.files_total,
            dirty = dirty.len(),
            deleted = report.files_deleted,
            "change detection complete"
        );

        // 3. Parse dirty files. Cancellation stops at the next file
        // boundary; skipped files keep their previous rows and hash so
        // the next sync reconciles them.
        let now = chrono::Utc::now().timestamp_millis();
        let parse_results: Vec<(String, String, DevacResult<Option<parser::FileParse>>)> = dirty
            .par_iter()
            .filter(|_| !cancel.is_cancelled())
            .map(|(rel, abs, hash)| {
                let ctx = ParseContext {
                    repo,
                    package,
                    branch,
                    file_path: rel,
                    source_file_hash: hash,
                    updated_at: now,
                };
                let result = std::fs::read_to_string(abs)
                    .map_err(DevacError::Io)
                    .and_then(|content| parser::parse_file(&ctx, &content));
                (rel.clone(), hash.clone(), result)
            })
            .collect();

        let mut batch = parser::FileParse::default();
        let mut parsed_files: HashSet<String> = HashSet::new();

        for (rel, _hash, result) in parse_results {
            match result {
                Ok(Some(file_parse)) => {
                    batch.nodes.extend(file_parse.nodes);
                    batch.edges.extend(file_parse.edges);
                    batch.external_refs.extend(file_parse.external_refs);
                    batch.effects.extend(file_parse.effects);
                    parsed_files.insert(rel);
                    report.files_parsed += 1;
                }
                Ok(None) => {
                    // No driver claims this extension.
                }
                Err(err) => {
                    report.files_failed += 1;
                    report.errors.push(format!("{rel}: {err}"));
                    tracing::warn!(file = %rel, error = %err, "parse failed, file skipped");
                    // Keep the file's previous rows, like an unchanged file.
                    unchanged.insert(rel);
                }
            }
        }

        // Dirty files the cancellation cut off keep their previous rows
        // too; their stale hashes make them dirty again next sync.
        for entry in &dirty {
            if !parsed_files.contains(&entry.0) && !unchanged.contains(&entry.0) {
                unchanged.insert(entry.0.clone());
            }
        }

        // 4+5. Assemble. Previous rows flow into the new snapshot as:
        // carried tombstones (GC'd only on compaction), fresh tombstones
        // for deleted files and for symbols a re-parse no longer emits,
        // or passthrough copies for unchanged files. Parser rows come
        // first, so dedup resolves resurrections in their favor.
        let deleted_set: HashSet<&str> = deleted.iter().map(String::as_str).collect();
        let new_node_ids: HashSet<String> =
            batch.nodes.iter().map(|n| n.entity_id.clone()).collect();
        let new_edge_keys: HashSet<(String, String, EdgeKind)> = batch
            .edges
            .iter()
            .map(|e| (e.source_entity_id.clone(), e.target_entity_id.clone(), e.edge_type))
            .collect();
        let new_ref_keys: HashSet<(String, String, String)> = batch
            .external_refs
            .iter()
            .map(|r| {
                (
                    r.source_entity_id.clone(),
                    r.module_specifier.clone(),
                    r.imported_symbol.clone(),
                )
            })
            .collect();
        let new_effect_ids: HashSet<String> =
            batch.effects.iter().map(|e| e.effect_id.clone()).collect();

        enum Disposition {
            Carry,
            Tombstone,
            Drop,
        }

        let classify = |file_path: &str, is_deleted: bool, survives: bool| {
            if is_deleted {
                Disposition::Carry
            } else if deleted_set.contains(file_path) {
                Disposition::Tombstone
            } else if parsed_files.contains(file_path) {
                if survives {
                    Disposition::Drop
                } else {
                    Disposition::Tombstone
                }
            } else if unchanged.contains(file_path) {
                Disposition::Carry
            } else {
                Disposition::Drop
            }
        };

        for node in &previous.nodes {
            match classify(&node.file_path, node.is_deleted, new_node_ids.contains(&node.entity_id))
            {
                Disposition::Carry => {
                    let mut carried = node.clone();
                    carried.branch = branch.to_string();
                    batch.nodes.push(carried);
                }
                Disposition::Tombstone => {
                    let mut tombstone = node.clone();
                    tombstone.is_deleted = true;
                    tombstone.branch = branch.to_string();
                    tombstone.updated_at = now;
                    report.tombstones_written += 1;
                    batch.nodes.push(tombstone);
                }
                Disposition::Drop => {}
            }
        }
        for edge in &previous.edges {
            let key = (
                edge.source_entity_id.clone(),
                edge.target_entity_id.clone(),
                edge.edge_type,
            );
            match classify(&edge.file_path, edge.is_deleted, new_edge_keys.contains(&key)) {
                Disposition::Carry => {
                    let mut carried = edge.clone();
                    carried.branch = branch.to_string();
                    batch.edges.push(carried);
                }
                Disposition::Tombstone => {
                    let mut tombstone = edge.clone();
                    tombstone.is_deleted = true;
                    tombstone.branch = branch.to_string();
                    tombstone.updated_at = now;
                    report.tombstones_written += 1;
                    batch.edges.push(tombstone);
                }
                Disposition::Drop => {}
            }
        }
        for ext_ref in &previous.external_refs {
            let key = (
                ext_ref.source_entity_id.clone(),
                ext_ref.module_specifier.clone(),
                ext_ref.imported_symbol.clone(),
            );
            match classify(&ext_ref.file_path, ext_ref.is_deleted, new_ref_keys.contains(&key)) {
                Disposition::Carry => {
                    let mut carried = ext_ref.clone();
                    carried.branch = branch.to_string();
                    batch.external_refs.push(carried);
                }
                Disposition::Tombstone => {
                    let mut tombstone = ext_ref.clone();
                    tombstone.is_deleted = true;
                    tombstone.branch = branch.to_string();
                    tombstone.updated_at = now;
                    report.tombstones_written += 1;
                    batch.external_refs.push(tombstone);
                }
                Disposition::Drop => {}
            }
        }
        for effect in &previous.effects {
            match classify(&effect.file_path, effect.is_deleted, new_effect_ids.contains(&effect.effect_id)) {
                Disposition::Carry => {
                    let mut carried = effect.clone();
                    carried.branch = branch.to_string();
                    batch.effects.push(carried);
                }
                Disposition::Tombstone => {
                    let mut tombstone = effect.clone();
                    tombstone.is_deleted = true;
                    tombstone.branch = branch.to_string();
                    tombstone.updated_at = now;
                    report.tombstones_written += 1;
                    batch.effects.push(tombstone);
                }
                Disposition::Drop => {}
            }
        }

        // Manifest covers the branch's full on-disk input set.
        let manifest_entries: Vec<(String, String)> = hashed
            .iter()
            .map(|(rel, _, hash)| (rel.clone(), hash.clone()))
            .collect();

        if let Err(err) = validate_batch(&batch) {
            self.pool.release(handle);
            return Err(err);
        }
        dedup_batch(&mut batch);

        report.nodes_written = batch.nodes.iter().filter(|n| !n.is_deleted).count();
        report.edges_written = batch.edges.iter().filter(|e| !e.is_deleted).count();
        report.refs_written = batch.external_refs.iter().filter(|r| !r.is_deleted).count();
        report.effects_written = batch.effects.iter().filter(|e| !e.is_deleted).count();

        // 6. Persist atomically.
        let write_result = self.write_batch(&handle, &layout, branch, &batch).and_then(|()| {
            report.manifest_hash = manifest_hash(&manifest_entries);
            write_manifest(&layout, branch, &report.manifest_hash)
        });
        self.pool.release(handle);
        write_result?;

        report.time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            package = %package_dir.display(),
            branch,
            parsed = report.files_parsed,
            unchanged = report.files_unchanged,
            deleted = report.files_deleted,
            failed = report.files_failed,
            nodes = report.nodes_written,
            "build complete"
        );
        Ok(report)
    }

    /// Compact the base partition: rewrite every collection without its
    /// tombstone rows. This is the only point tombstones are garbage
    /// collected; overlay branches keep theirs so shadowing stays
    /// correct.
    pub async fn compact(&self, package_dir: &Path) -> DevacResult<usize> {
        let layout = SeedLayout::new(package_dir);
        let branch = crate::types::BASE_BRANCH;

        let handle = self.pool.acquire().await?;
        let result = (|| -> DevacResult<usize> {
            let conn = handle.connection();
            let mut batch = parser::FileParse::default();
            let mut dropped = 0usize;

            let rows = rows::load_collection_rows(conn, &layout, branch, Collection::Nodes)?;
            dropped += rows.nodes.iter().filter(|r| r.is_deleted).count();
            batch.nodes = rows.nodes.into_iter().filter(|r| !r.is_deleted).collect();

            let rows = rows::load_collection_rows(conn, &layout, branch, Collection::Edges)?;
            dropped += rows.edges.iter().filter(|r| r.is_deleted).count();
            batch.edges = rows.edges.into_iter().filter(|r| !r.is_deleted).collect();

            let rows = rows::load_collection_rows(conn, &layout, branch, Collection::ExternalRefs)?;
            dropped += rows.external_refs.iter().filter(|r| r.is_deleted).count();
            batch.external_refs =
                rows.external_refs.into_iter().filter(|r| !r.is_deleted).collect();

            let rows = rows::load_collection_rows(conn, &layout, branch, Collection::Effects)?;
            dropped += rows.effects.iter().filter(|r| r.is_deleted).count();
            batch.effects = rows.effects.into_iter().filter(|r| !r.is_deleted).collect();

            if dropped > 0 {
                self.write_batch(&handle, &layout, branch, &batch)?;
            }
            Ok(dropped)
        })();
        self.pool.release(handle);

        let dropped = result?;
        tracing::info!(package = %package_dir.display(), dropped, "base partition compacted");
        Ok(dropped)
    }

    fn write_batch(
        &self,
        handle: &StoreHandle,
        layout: &SeedLayout,
        branch: &str,
        batch: &parser::FileParse,
    ) -> DevacResult<()> {
        append_batch(handle, batch)?;

        for collection in [Collection::Nodes, Collection::Edges, Collection::ExternalRefs] {
            let staging = format!("stage_{}", collection.table_name());
            store::write_table_to_parquet_atomic(
                handle,
                &staging,
                &layout.collection_path(branch, collection),
            )?;
        }

        // Effects are optional: the file is written once any effect has
        // ever been observed, then kept current.
        let effects_path = layout.collection_path(branch, Collection::Effects);
        if !batch.effects.is_empty() || effects_path.exists() {
            store::write_table_to_parquet_atomic(handle, "stage_effects", &effects_path)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Walk a package root collecting source files by extension, skipping
/// vendored/cache/output directories. Returns package-relative and
/// absolute paths.
pub fn discover_files(
    package_dir: &Path,
    config: &SyncConfig,
) -> DevacResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();

    let walker = walkdir::WalkDir::new(package_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir() && config.skip_dirs.iter().any(|d| d == name.as_ref()))
        });

    for entry in walker {
        let entry = entry.map_err(|e| DevacError::Internal(format!("walk failed: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !config.source_extensions.iter().any(|allowed| allowed == ext) {
            continue;
        }
        if entry.metadata().map(|m| m.len() > config.max_file_size).unwrap_or(false) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(package_dir)
            .map_err(|e| DevacError::Internal(format!("strip prefix: {e}")))?
            .to_string_lossy()
            .replace('\\', "/");
        files.push((rel, entry.path().to_path_buf()));
    }

    Ok(files)
}

// ---------------------------------------------------------------------------
// Batch invariants
// ---------------------------------------------------------------------------

/// Enforce the persisted-batch invariants: span sanity, and CONTAINS
/// edge endpoints present in the batch.
fn validate_batch(batch: &parser::FileParse) -> DevacResult<()> {
    for (i, node) in batch.nodes.iter().enumerate() {
        if node.span.start_line > node.span.end_line {
            return Err(DevacError::SchemaViolation {
                table: "nodes".into(),
                row: i,
                field: "start_line > end_line".into(),
            });
        }
    }

    let ids: HashSet<&str> = batch.nodes.iter().map(|n| n.entity_id.as_str()).collect();
    for (i, edge) in batch.edges.iter().enumerate() {
        if edge.edge_type == EdgeKind::Contains
            && (!ids.contains(edge.source_entity_id.as_str())
                || !ids.contains(edge.target_entity_id.as_str()))
        {
            return Err(DevacError::SchemaViolation {
                table: "edges".into(),
                row: i,
                field: "CONTAINS endpoint missing from batch".into(),
            });
        }
    }
    Ok(())
}

/// Drop exact duplicates under each collection's dedup key, keeping the
/// first occurrence (parser output precedes passthrough rows).
fn dedup_batch(batch: &mut parser::FileParse) {
    let mut seen = HashSet::new();
    batch.nodes.retain(|n: &Node| seen.insert(n.entity_id.clone()));

    let mut seen = HashSet::new();
    batch.edges.retain(|e: &Edge| {
        seen.insert((
            e.source_entity_id.clone(),
            e.target_entity_id.clone(),
            e.edge_type,
        ))
    });

    let mut seen = HashSet::new();
    batch.external_refs.retain(|r: &ExternalRef| {
        seen.insert((
            r.source_entity_id.clone(),
            r.module_specifier.clone(),
            r.imported_symbol.clone(),
        ))
    });

    let mut seen = HashSet::new();
    batch.effects.retain(|e: &CodeEffect| seen.insert(e.effect_id.clone()));
}

/// Persist the branch manifest with the same rename discipline as the
/// parquet files.
fn write_manifest(layout: &SeedLayout, branch: &str, hash: &str) -> DevacResult<()> {
    let path = layout.manifest_path(branch);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("txt.tmp");
    std::fs::write(&tmp, format!("{hash}\n"))?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn fixture_pool() -> StorePool {
        StorePool::new(&StoreConfig::default()).expect("pool")
    }

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    #[test]
    fn test_discover_skips_vendored_dirs() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "src/a.ts", "export const a = 1;");
        write_file(dir.path(), "node_modules/dep/index.ts", "export const x = 1;");
        write_file(dir.path(), "README.md", "# readme");

        let files = discover_files(dir.path(), &SyncConfig::default()).expect("walk");
        let rels: Vec<&str> = files.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(rels, vec!["src/a.ts"]);
    }

    #[tokio::test]
    async fn test_build_single_file_package() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(
            dir.path(),
            "greet.ts",
            "export function greet(name: string) {\n  return name;\n}",
        );

        let pool = fixture_pool();
        let builder = GraphBuilder::new(pool.clone(), SyncConfig::default());
        let report = builder
            .build("r1", "pkg", dir.path(), "base", &CancellationToken::new())
            .await
            .expect("build");

        assert_eq!(report.files_parsed, 1);
        assert!(report.nodes_written >= 2, "module + greet");
        assert!(!report.manifest_hash.is_empty());

        let layout = SeedLayout::new(dir.path());
        assert!(layout.collection_path("base", Collection::Nodes).exists());
        assert!(layout.manifest_path("base").exists());

        // Re-reading the live set via the unified view returns the batch.
        let handle = pool.acquire().await.expect("acquire");
        let rows = load_collection_rows(handle.connection(), &layout, "base", Collection::Nodes).expect("load");
        let live: Vec<&Node> = rows.nodes.iter().filter(|n| !n.is_deleted).collect();
        assert!(live.iter().any(|n| n.name == "greet" && n.is_exported));
        pool.release(handle);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_unchanged_files_pass_through() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "a.ts", "export const a = 1;");

        let pool = fixture_pool();
        let builder = GraphBuilder::new(pool.clone(), SyncConfig::default());
        let cancel = CancellationToken::new();

        let first = builder.build("r", "p", dir.path(), "base", &cancel).await.expect("build");
        assert_eq!(first.files_parsed, 1);

        let second = builder.build("r", "p", dir.path(), "base", &cancel).await.expect("build");
        assert_eq!(second.files_parsed, 0);
        assert_eq!(second.files_unchanged, 1);
        assert_eq!(second.nodes_written, first.nodes_written);
        assert_eq!(second.manifest_hash, first.manifest_hash);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_deleted_file_produces_tombstones() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "a.ts", "export function f() {}");

        let pool = fixture_pool();
        let builder = GraphBuilder::new(pool.clone(), SyncConfig::default());
        let cancel = CancellationToken::new();

        builder.build("r", "p", dir.path(), "base", &cancel).await.expect("build");
        std::fs::remove_file(dir.path().join("a.ts")).expect("rm");
        let report = builder.build("r", "p", dir.path(), "base", &cancel).await.expect("rebuild");

        assert_eq!(report.files_deleted, 1);
        assert!(report.tombstones_written > 0);
        assert_eq!(report.nodes_written, 0);

        // Unified view excludes tombstones.
        let layout = SeedLayout::new(dir.path());
        let handle = pool.acquire().await.expect("acquire");
        let rows = load_collection_rows(handle.connection(), &layout, "base", Collection::Nodes).expect("load");
        assert!(rows.nodes.iter().all(|n| n.is_deleted));
        pool.release(handle);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_compact_drops_base_tombstones() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "a.ts", "export function f() {}");

        let pool = fixture_pool();
        let builder = GraphBuilder::new(pool.clone(), SyncConfig::default());
        let cancel = CancellationToken::new();

        builder.build("r", "p", dir.path(), "base", &cancel).await.expect("build");
        std::fs::remove_file(dir.path().join("a.ts")).expect("rm");
        builder.build("r", "p", dir.path(), "base", &cancel).await.expect("rebuild");

        let dropped = builder.compact(dir.path()).await.expect("compact");
        assert!(dropped > 0);

        let layout = SeedLayout::new(dir.path());
        let handle = pool.acquire().await.expect("acquire");
        let rows = load_collection_rows(handle.connection(), &layout, "base", Collection::Nodes)
            .expect("load");
        assert!(rows.nodes.is_empty(), "tombstones gone after compaction");

        // A second compaction has nothing to do.
        pool.release(handle);
        assert_eq!(builder.compact(dir.path()).await.expect("compact"), 0);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_parse_error_is_partial_success() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "good.ts", "export const ok = 1;");
        // tree-sitter is error-tolerant, so force a read failure instead:
        // a file that is not valid UTF-8.
        std::fs::write(dir.path().join("bad.ts"), [0xff, 0xfe, 0x00, 0x80]).expect("write");

        let pool = fixture_pool();
        let builder = GraphBuilder::new(pool.clone(), SyncConfig::default());
        let report = builder
            .build("r", "p", dir.path(), "base", &CancellationToken::new())
            .await
            .expect("build");

        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_parsed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.nodes_written > 0, "good file still written");
        pool.shutdown();
    }
}
