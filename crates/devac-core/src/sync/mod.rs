//! Sync orchestrator: the end-to-end update of one package.
//!
//! Per package the pipeline is linear -- build, resolve, rules, hub,
//! verify -- and no step observes another's intermediate state. Across
//! packages syncs run in parallel; a concurrent sync of the same
//! package is rejected with `AlreadySyncing`. Cancellation releases the
//! store handle and leaves committed state in place; the next sync
//! reconciles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::builder::{load_collection_rows, BuildReport, GraphBuilder};
use crate::config::Config;
use crate::error::{DevacError, DevacResult};
use crate::hub::CentralHub;
use crate::parser::FileParse;
use crate::resolver::{PackageResolveReport, ResolvedBinding, ResolverSet};
use crate::rules::RuleEngine;
use crate::schema::{Collection, SeedLayout};
use crate::store::{self, StoreHandle, StorePool};
use crate::types::{CrossRepoEdge, DomainEffect, Edge, EdgeKind};
use crate::verify::{IntegrityVerifier, VerifyReport};

/// Result of syncing one package.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// The synced package.
    pub package_dir: PathBuf,
    /// The synced branch.
    pub branch: String,
    /// Graph-builder outcome.
    pub build: BuildReport,
    /// Resolver outcome.
    pub resolve: PackageResolveReport,
    /// Binding edges written back.
    pub bindings_written: usize,
    /// Domain effects derived by the rule engine.
    pub domain_effects: Vec<DomainEffect>,
    /// Verifier outcome.
    pub verify: VerifyReport,
    /// Whether the hub registry reflects this sync.
    pub hub_updated: bool,
    /// Readiness warnings (stale registry, skipped steps).
    pub warnings: Vec<String>,
    /// Overall success: batch written and verifier clean.
    pub success: bool,
    /// Wall-clock time.
    pub time_ms: u64,
}

/// Orchestrates builds, resolution, rules, hub updates, and
/// verification over a shared pool.
pub struct SyncOrchestrator {
    pool: StorePool,
    builder: GraphBuilder,
    resolvers: ResolverSet,
    rules: RuleEngine,
    hub: Option<Arc<CentralHub>>,
    verifier: IntegrityVerifier,
    /// Canonical package paths with a sync in flight.
    in_flight: DashMap<PathBuf, ()>,
}

impl SyncOrchestrator {
    /// Build an orchestrator from config. `hub` is optional: without
    /// one, registry updates are skipped with a warning.
    pub fn new(config: &Config, pool: StorePool, hub: Option<Arc<CentralHub>>) -> Self {
        Self {
            builder: GraphBuilder::new(pool.clone(), config.sync.clone()),
            resolvers: ResolverSet::new(config.resolver.clone()),
            rules: RuleEngine::with_builtin_rules(config.rules.max_effects),
            verifier: IntegrityVerifier::new(pool.clone()),
            pool,
            hub,
            in_flight: DashMap::new(),
        }
    }

    /// The resolver set (for cache management).
    pub fn resolvers(&self) -> &ResolverSet {
        &self.resolvers
    }

    /// Sync one package on one branch.
    pub async fn sync(
        &self,
        repo_id: &str,
        package_dir: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> DevacResult<SyncReport> {
        let canonical = package_dir
            .canonicalize()
            .unwrap_or_else(|_| package_dir.to_path_buf());
        if self.in_flight.insert(canonical.clone(), ()).is_some() {
            return Err(DevacError::AlreadySyncing(canonical));
        }
        let result = self.sync_inner(repo_id, package_dir, branch, cancel).await;
        self.in_flight.remove(&canonical);
        result
    }

    async fn sync_inner(
        &self,
        repo_id: &str,
        package_dir: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> DevacResult<SyncReport> {
        let started = Instant::now();
        let package_name = package_name_of(package_dir);
        let layout = SeedLayout::new(package_dir);

        let mut report = SyncReport {
            package_dir: package_dir.to_path_buf(),
            branch: branch.to_string(),
            ..SyncReport::default()
        };

        // 1. Graph builder.
        report.build = self
            .builder
            .build(repo_id, &package_name, package_dir, branch, cancel)
            .await?;

        // 2. Semantic resolver over the refs just persisted, writing
        // back resolved targets and binding edges.
        if cancel.is_cancelled() {
            report.warnings.push("resolution skipped: cancelled".into());
        } else {
            self.resolvers.clear_cache(package_dir);
            let handle = self.pool.acquire().await?;
            let step = (|| -> DevacResult<()> {
                let refs = load_collection_rows(
                    handle.connection(),
                    &layout,
                    branch,
                    Collection::ExternalRefs,
                )?
                .external_refs;
                let (bindings, resolve_report) =
                    self.resolvers.resolve_package(package_dir, branch, &refs, cancel);
                report.resolve = resolve_report;
                if !bindings.is_empty() {
                    report.bindings_written = write_bindings(&handle, &layout, branch, &bindings)?;
                }
                Ok(())
            })();
            self.pool.release(handle);
            step?;
        }

        // 3. Rule engine over the code effects. Domain effects live in
        // the hub, not in seed parquet: a re-sync replaces the package's
        // rows, so stale effects never outlive their source.
        if !cancel.is_cancelled() {
            let handle = self.pool.acquire().await?;
            let loaded =
                load_collection_rows(handle.connection(), &layout, branch, Collection::Effects);
            self.pool.release(handle);
            let effects = loaded?.effects;
            let live: Vec<_> = effects.into_iter().filter(|e| !e.is_deleted).collect();
            if !live.is_empty() {
                let rules_report = self.rules.process(&live);
                tracing::debug!(
                    matched = rules_report.matched_count,
                    unmatched = rules_report.unmatched_count,
                    "rule engine pass complete"
                );
                report.domain_effects = rules_report.domain_effects;
            }
            if let Some(hub) = &self.hub {
                let package_key = package_dir
                    .canonicalize()
                    .unwrap_or_else(|_| package_dir.to_path_buf())
                    .to_string_lossy()
                    .to_string();
                if let Err(err) =
                    hub.replace_domain_effects(repo_id, &package_key, &report.domain_effects)
                {
                    report
                        .warnings
                        .push(format!("domain effects not persisted to hub: {err}"));
                }
            }
        }

        // 4. Hub registry update. Failure leaves the parquet current
        // and the registry stale: a readiness warning, not a sync error.
        match &self.hub {
            Some(hub) => {
                // Cross-repo candidates come from resolvers that bind
                // across registered repos; package-local resolvers
                // produce none, making the edge swap a no-op.
                let cross_edges: Vec<CrossRepoEdge> = Vec::new();
                match update_hub(hub, repo_id, &report.build.manifest_hash, &cross_edges) {
                    Ok(()) => report.hub_updated = true,
                    Err(err) => {
                        report
                            .warnings
                            .push(format!("hub update failed, registry stale: {err}"));
                        if let Err(mark_err) = hub.mark_repo_stale(repo_id) {
                            tracing::warn!(error = %mark_err, "failed to mark repo stale");
                        }
                    }
                }
            }
            None => report.warnings.push("no hub configured, registry not updated".into()),
        }

        // 5. Verifier. Non-destructive: a failure marks the sync failed
        // but keeps the new parquet for diagnosis.
        report.verify = self.verifier.verify(package_dir, branch).await?;
        report.success = report.verify.valid;
        report.time_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            package = %package_dir.display(),
            branch,
            success = report.success,
            parsed = report.build.files_parsed,
            resolved = report.resolve.resolved,
            bindings = report.bindings_written,
            domain_effects = report.domain_effects.len(),
            time_ms = report.time_ms,
            "sync complete"
        );
        Ok(report)
    }

    /// Sync several packages of a repo in parallel on the same branch.
    pub async fn sync_all(
        self: &Arc<Self>,
        repo_id: &str,
        package_dirs: Vec<PathBuf>,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Vec<(PathBuf, DevacResult<SyncReport>)> {
        let mut set = tokio::task::JoinSet::new();
        for dir in package_dirs {
            let this = Arc::clone(self);
            let repo_id = repo_id.to_string();
            let branch = branch.to_string();
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = this.sync(&repo_id, &dir, &branch, &cancel).await;
                (dir, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(err) => tracing::error!(error = %err, "sync task panicked"),
            }
        }
        results
    }
}

/// Registry update plus the scoped cross-repo edge swap. The hub
/// serializes writes, so no reader observes the registry between the
/// remove and the add.
fn update_hub(
    hub: &CentralHub,
    repo_id: &str,
    manifest_hash: &str,
    cross_edges: &[CrossRepoEdge],
) -> DevacResult<()> {
    hub.update_repo_sync(repo_id, manifest_hash)?;
    if !cross_edges.is_empty() {
        let prior = hub.cross_repo_edges_for(repo_id)?;
        if edges_differ(&prior, cross_edges) {
            hub.remove_cross_repo_edges(repo_id)?;
            hub.add_cross_repo_edges(cross_edges)?;
        }
    }
    Ok(())
}

fn edges_differ(prior: &[CrossRepoEdge], new: &[CrossRepoEdge]) -> bool {
    if prior.len() != new.len() {
        return true;
    }
    let key = |e: &CrossRepoEdge| {
        (
            e.source_entity_id.clone(),
            e.target_repo.clone(),
            e.target_entity_id.clone(),
            e.edge_type,
        )
    };
    let mut a: Vec<_> = prior.iter().map(key).collect();
    let mut b: Vec<_> = new.iter().map(key).collect();
    a.sort();
    b.sort();
    a != b
}

/// Package name: the directory's file name.
fn package_name_of(package_dir: &Path) -> String {
    package_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string())
}

/// Apply resolved bindings: flip `is_resolved` on matched refs and
/// append `IMPORTS`/`REFERENCES` edges, rewriting the two parquet files
/// with the same atomic-rename discipline as the builder.
fn write_bindings(
    handle: &StoreHandle,
    layout: &SeedLayout,
    branch: &str,
    bindings: &[ResolvedBinding],
) -> DevacResult<usize> {
    let conn = handle.connection();
    let mut refs =
        load_collection_rows(conn, layout, branch, Collection::ExternalRefs)?.external_refs;
    let mut edges = load_collection_rows(conn, layout, branch, Collection::Edges)?.edges;

    let by_key: HashMap<&(String, String, String), &ResolvedBinding> =
        bindings.iter().map(|b| (&b.ref_key, b)).collect();

    let now = chrono::Utc::now().timestamp_millis();
    let mut written = 0usize;
    let mut new_edges: Vec<Edge> = Vec::new();

    for ext_ref in refs.iter_mut() {
        if ext_ref.is_deleted || ext_ref.is_resolved {
            continue;
        }
        let key = (
            ext_ref.source_entity_id.clone(),
            ext_ref.module_specifier.clone(),
            ext_ref.imported_symbol.clone(),
        );
        let Some(binding) = by_key.get(&key) else { continue };

        ext_ref.is_resolved = true;
        ext_ref.target_entity_id = Some(binding.resolved.target_entity_id.clone());
        ext_ref.updated_at = now;

        let edge_type =
            if ext_ref.is_type_only { EdgeKind::References } else { EdgeKind::Imports };
        let exists = |edges: &[Edge]| {
            edges.iter().any(|e| {
                !e.is_deleted
                    && e.source_entity_id == ext_ref.source_entity_id
                    && e.target_entity_id == binding.resolved.target_entity_id
                    && e.edge_type == edge_type
            })
        };
        if !exists(&edges) && !exists(&new_edges) {
            new_edges.push(Edge {
                source_entity_id: ext_ref.source_entity_id.clone(),
                target_entity_id: binding.resolved.target_entity_id.clone(),
                edge_type,
                file_path: ext_ref.file_path.clone(),
                start_line: ext_ref.start_line,
                start_column: ext_ref.start_column,
                branch: branch.to_string(),
                is_deleted: false,
                updated_at: now,
                properties: Some(serde_json::json!({
                    "confidence": binding.resolved.confidence,
                    "method": binding.resolved.method.as_str(),
                })),
            });
        }
        written += 1;
    }
    edges.extend(new_edges);

    let batch = FileParse { edges, external_refs: refs, ..FileParse::default() };
    crate::builder::stage_batch(handle, &batch)?;
    store::write_table_to_parquet_atomic(
        handle,
        "stage_external_refs",
        &layout.collection_path(branch, Collection::ExternalRefs),
    )?;
    store::write_table_to_parquet_atomic(
        handle,
        "stage_edges",
        &layout.collection_path(branch, Collection::Edges),
    )?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    fn orchestrator(hub: Option<Arc<CentralHub>>) -> (Arc<SyncOrchestrator>, StorePool) {
        let pool = StorePool::new(&StoreConfig::default()).expect("pool");
        let config = Config::default();
        (Arc::new(SyncOrchestrator::new(&config, pool.clone(), hub)), pool)
    }

    #[tokio::test]
    async fn test_sync_resolves_and_writes_bindings() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "utils.ts", "export function helper() { return 1; }\n");
        write_file(
            dir.path(),
            "main.ts",
            "import { helper } from \"./utils\";\nexport function run() { return helper(); }\n",
        );

        let (orchestrator, pool) = orchestrator(None);
        let report = orchestrator
            .sync("r1", dir.path(), "base", &CancellationToken::new())
            .await
            .expect("sync");

        assert!(report.success, "errors: {:?}", report.verify.errors);
        assert_eq!(report.resolve.resolved, 1);
        assert_eq!(report.bindings_written, 1);

        // The ref row is now resolved and an IMPORTS edge exists.
        let layout = SeedLayout::new(dir.path());
        let handle = pool.acquire().await.expect("acquire");
        let refs = load_collection_rows(
            handle.connection(),
            &layout,
            "base",
            Collection::ExternalRefs,
        )
        .expect("load")
        .external_refs;
        let bound = refs.iter().find(|r| r.imported_symbol == "helper").expect("ref");
        assert!(bound.is_resolved);
        assert!(bound.target_entity_id.as_deref().unwrap_or("").contains(":function:"));

        let edges = load_collection_rows(handle.connection(), &layout, "base", Collection::Edges)
            .expect("load")
            .edges;
        assert!(edges.iter().any(|e| e.edge_type == EdgeKind::Imports
            && e.target_entity_id == bound.target_entity_id.clone().unwrap_or_default()));
        pool.release(handle);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_sync_of_same_package_rejected() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "a.ts", "export const a = 1;\n");

        let (orchestrator, pool) = orchestrator(None);
        let canonical = dir.path().canonicalize().expect("canonicalize");
        orchestrator.in_flight.insert(canonical, ());

        let err = orchestrator
            .sync("r1", dir.path(), "base", &CancellationToken::new())
            .await
            .expect_err("held");
        assert!(matches!(err, DevacError::AlreadySyncing(_)));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_sync_reports_domain_effects() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(
            dir.path(),
            "pay.ts",
            "import stripe from \"stripe\";\nexport async function charge() {\n  await stripe.charges.create({});\n}\n",
        );

        let (orchestrator, pool) = orchestrator(None);
        let report = orchestrator
            .sync("r1", dir.path(), "base", &CancellationToken::new())
            .await
            .expect("sync");

        let charge = report
            .domain_effects
            .iter()
            .find(|de| de.domain == "Payment")
            .expect("payment effect");
        assert_eq!(charge.action, "Charge");
        assert_eq!(charge.metadata["provider"], "stripe");
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_sync_persists_domain_effects_to_hub() {
        let package = tempfile::tempdir().expect("tmp");
        let hub_dir = tempfile::tempdir().expect("tmp");
        write_file(
            package.path(),
            "pay.ts",
            "import stripe from \"stripe\";\nexport async function charge() {\n  await stripe.charges.create({});\n}\n",
        );

        let hub = Arc::new(CentralHub::open(hub_dir.path()).expect("hub"));
        hub.add_repo(&crate::types::RepoRegistration {
            repo_id: "r1".into(),
            local_path: package.path().to_path_buf(),
            manifest_hash: String::new(),
            last_synced: 0,
            status: crate::types::RepoStatus::Active,
        })
        .expect("register");

        let (orchestrator, pool) = orchestrator(Some(hub.clone()));
        let report = orchestrator
            .sync("r1", package.path(), "base", &CancellationToken::new())
            .await
            .expect("sync");

        // The hub holds the same set the report carried.
        let stored = hub.domain_effects("r1", Some("Payment")).expect("query");
        assert_eq!(
            stored.len(),
            report.domain_effects.iter().filter(|de| de.domain == "Payment").count()
        );
        assert_eq!(stored[0].action, "Charge");
        assert_eq!(stored[0].metadata["provider"], "stripe");

        // Removing the call and re-syncing clears the stored effects.
        write_file(package.path(), "pay.ts", "export async function charge() {}\n");
        orchestrator
            .sync("r1", package.path(), "base", &CancellationToken::new())
            .await
            .expect("resync");
        assert!(hub.domain_effects("r1", Some("Payment")).expect("query").is_empty());
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_sync_updates_hub_registry() {
        let package = tempfile::tempdir().expect("tmp");
        let hub_dir = tempfile::tempdir().expect("tmp");
        write_file(package.path(), "a.ts", "export const a = 1;\n");

        let hub = Arc::new(CentralHub::open(hub_dir.path()).expect("hub"));
        hub.add_repo(&crate::types::RepoRegistration {
            repo_id: "r1".into(),
            local_path: package.path().to_path_buf(),
            manifest_hash: String::new(),
            last_synced: 0,
            status: crate::types::RepoStatus::Active,
        })
        .expect("register");

        let (orchestrator, pool) = orchestrator(Some(hub.clone()));
        let report = orchestrator
            .sync("r1", package.path(), "base", &CancellationToken::new())
            .await
            .expect("sync");

        assert!(report.hub_updated);
        let repo = hub.get_repo("r1").expect("get").expect("present");
        assert_eq!(repo.manifest_hash, report.build.manifest_hash);
        assert!(repo.last_synced > 0);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_sync_without_hub_warns_but_succeeds() {
        let dir = tempfile::tempdir().expect("tmp");
        write_file(dir.path(), "a.ts", "export const a = 1;\n");

        let (orchestrator, pool) = orchestrator(None);
        let report = orchestrator
            .sync("r1", dir.path(), "base", &CancellationToken::new())
            .await
            .expect("sync");
        assert!(report.success);
        assert!(!report.hub_updated);
        assert!(report.warnings.iter().any(|w| w.contains("no hub configured")));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_sync_all_runs_packages_in_parallel() {
        let a = tempfile::tempdir().expect("tmp");
        let b = tempfile::tempdir().expect("tmp");
        write_file(a.path(), "a.ts", "export const a = 1;\n");
        write_file(b.path(), "b.ts", "export const b = 2;\n");

        let (orchestrator, pool) = orchestrator(None);
        let results = orchestrator
            .sync_all(
                "r1",
                vec![a.path().to_path_buf(), b.path().to_path_buf()],
                "base",
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results.len(), 2);
        for (_, result) in results {
            assert!(result.expect("sync").success);
        }
        pool.shutdown();
    }
}
