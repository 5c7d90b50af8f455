//! Semantic resolution: binding import sites to target entities.
//!
//! Each language implements the same capability set behind
//! [`SemanticResolver`]; dispatch is by file extension at the package
//! boundary. Resolution never crosses the package directory -- an import
//! that lands outside `package_dir` stays unresolved here and becomes
//! the hub's cross-repo problem.

pub mod python;
pub mod typescript;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::ResolverConfig;
use crate::error::DevacResult;
use crate::parser::Language;
use crate::types::{ExternalRef, ImportStyle, NodeKind};

/// One exported symbol of a file.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    /// Exported name (post-aliasing for re-exports).
    pub name: String,
    /// Symbol kind.
    pub kind: NodeKind,
    /// Whether this is the module's default export.
    pub is_default: bool,
    /// Whether the export is type-only.
    pub is_type_only: bool,
    /// Entity id of the exported symbol.
    pub target_entity_id: String,
}

/// Per-package export index: exported symbols per file plus memoized
/// module resolution.
#[derive(Debug, Default)]
pub struct ExportIndex {
    /// The package this index describes.
    pub package_dir: PathBuf,
    /// `file path -> exported symbols` (re-exports flattened in).
    pub exports: HashMap<String, Vec<ExportEntry>>,
    /// `file path -> module node entity id`, for namespace imports.
    pub modules: HashMap<String, String>,
    /// Memoized `(source file, specifier) -> target file` lookups.
    /// `None` records a miss so it isn't re-probed.
    pub module_resolution: DashMap<(String, String), Option<String>>,
}

/// How a resolution was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMethod {
    /// Full type-checker agreement (reserved for compiler-backed
    /// resolvers).
    Compiler,
    /// Name + module match.
    Heuristic,
    /// Declaration stub (`.d.ts`).
    Stub,
}

impl ResolveMethod {
    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compiler => "compiler",
            Self::Heuristic => "heuristic",
            Self::Stub => "stub",
        }
    }
}

/// A successful binding of one external ref.
#[derive(Debug, Clone)]
pub struct ResolvedRef {
    /// Entity id of the importing symbol.
    pub source_entity_id: String,
    /// Entity id of the bound target.
    pub target_entity_id: String,
    /// File the target lives in, package-relative.
    pub target_file_path: String,
    /// Confidence in `[0, 1]`: compiler 1.0, heuristic 0.7-0.9, stub 0.8.
    pub confidence: f64,
    /// How the binding was established.
    pub method: ResolveMethod,
}

/// Report of resolving one package's refs.
#[derive(Debug, Clone, Default)]
pub struct PackageResolveReport {
    /// Refs considered.
    pub total: usize,
    /// Refs bound to a target.
    pub resolved: usize,
    /// Refs left unresolved.
    pub unresolved: usize,
    /// Wall-clock time.
    pub time_ms: u64,
    /// Non-fatal errors (timeouts, index failures).
    pub errors: Vec<String>,
}

/// A binding paired with the identity of the ref it resolves.
#[derive(Debug, Clone)]
pub struct ResolvedBinding {
    /// `(source_entity_id, module_specifier, imported_symbol)`.
    pub ref_key: (String, String, String),
    /// The binding.
    pub resolved: ResolvedRef,
}

/// Capability set each language resolver implements.
pub trait SemanticResolver: Send + Sync {
    /// Language this resolver handles.
    fn language(&self) -> Language;

    /// Whether the required toolchain support is present.
    fn is_available(&self) -> bool {
        true
    }

    /// Build the export index for a package's seeds on a branch.
    fn build_export_index(&self, package_dir: &Path, branch: &str) -> DevacResult<ExportIndex>;

    /// Bind one ref against the index, or `None` when the target is
    /// outside the package or the symbol isn't exported.
    fn resolve_ref(&self, ext_ref: &ExternalRef, index: &ExportIndex) -> Option<ResolvedRef>;
}

/// Per-language resolvers behind one dispatching facade with a shared
/// index cache.
pub struct ResolverSet {
    config: ResolverConfig,
    resolvers: Vec<Arc<dyn SemanticResolver>>,
    index_cache: DashMap<(PathBuf, Language, String), Arc<ExportIndex>>,
}

impl ResolverSet {
    /// Construct with the reference resolvers registered.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            resolvers: vec![
                Arc::new(typescript::TypeScriptResolver),
                Arc::new(python::PythonResolver),
            ],
            index_cache: DashMap::new(),
        }
    }

    /// Whether resolution runs at all (disabled mode reports false and
    /// resolves nothing).
    pub fn is_available(&self) -> bool {
        self.config.enabled
    }

    /// Drop the cached indexes for one package.
    pub fn clear_cache(&self, package_dir: &Path) {
        self.index_cache.retain(|(dir, _, _), _| dir != package_dir);
    }

    /// Drop every cached index.
    pub fn clear_all_caches(&self) {
        self.index_cache.clear();
    }

    fn resolver_for(&self, language: Language) -> Option<&Arc<dyn SemanticResolver>> {
        // TS and JS share one resolver.
        let effective = match language {
            Language::JavaScript => Language::TypeScript,
            other => other,
        };
        self.resolvers.iter().find(|r| r.language() == effective)
    }

    fn index_for(
        &self,
        package_dir: &Path,
        branch: &str,
        language: Language,
        resolver: &Arc<dyn SemanticResolver>,
    ) -> DevacResult<Arc<ExportIndex>> {
        let key = (package_dir.to_path_buf(), language, branch.to_string());
        if let Some(cached) = self.index_cache.get(&key) {
            return Ok(cached.clone());
        }
        let index = Arc::new(resolver.build_export_index(package_dir, branch)?);
        self.index_cache.insert(key, index.clone());
        Ok(index)
    }

    /// Resolve a package's unresolved refs within the configured time
    /// budget. Stops at the next ref on cancellation or budget
    /// exhaustion; both are recorded, not raised.
    pub fn resolve_package(
        &self,
        package_dir: &Path,
        branch: &str,
        refs: &[ExternalRef],
        cancel: &CancellationToken,
    ) -> (Vec<ResolvedBinding>, PackageResolveReport) {
        let started = Instant::now();
        let mut report = PackageResolveReport::default();
        let mut bindings = Vec::new();

        if !self.config.enabled {
            report.total = refs.len();
            report.unresolved = refs.len();
            return (bindings, report);
        }

        let budget = std::time::Duration::from_millis(self.config.timeout_ms);

        for ext_ref in refs {
            if ext_ref.is_deleted
                || ext_ref.is_resolved
                || ext_ref.import_style == ImportStyle::SideEffect
            {
                continue;
            }
            report.total += 1;

            if cancel.is_cancelled() {
                report.errors.push("resolution cancelled".into());
                report.unresolved += 1;
                continue;
            }
            if started.elapsed() > budget {
                report.errors.push(format!(
                    "resolution timed out after {}ms",
                    started.elapsed().as_millis()
                ));
                report.unresolved += 1;
                continue;
            }

            let language = Language::from_path(&ext_ref.file_path);
            let Some(resolver) = self.resolver_for(language).filter(|r| r.is_available()) else {
                report.unresolved += 1;
                continue;
            };

            let index = match self.index_for(package_dir, branch, language, resolver) {
                Ok(index) => index,
                Err(err) => {
                    report.errors.push(format!("export index failed: {err}"));
                    report.unresolved += 1;
                    continue;
                }
            };

            match resolver.resolve_ref(ext_ref, &index) {
                Some(resolved) => {
                    report.resolved += 1;
                    bindings.push(ResolvedBinding {
                        ref_key: (
                            ext_ref.source_entity_id.clone(),
                            ext_ref.module_specifier.clone(),
                            ext_ref.imported_symbol.clone(),
                        ),
                        resolved,
                    });
                }
                None => report.unresolved += 1,
            }
        }

        report.time_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            package = %package_dir.display(),
            total = report.total,
            resolved = report.resolved,
            unresolved = report.unresolved,
            "package resolution complete"
        );
        (bindings, report)
    }
}

/// Load a package's live nodes and refs from its seed parquet, on a
/// short-lived private connection. Index building is read-only and does
/// not contend for the shared pool.
pub(crate) fn load_seed_rows(
    package_dir: &Path,
    branch: &str,
) -> DevacResult<(Vec<crate::types::Node>, Vec<ExternalRef>)> {
    use crate::builder::load_collection_rows;
    use crate::schema::{Collection, SeedLayout};

    let layout = SeedLayout::new(package_dir);
    let conn = duckdb::Connection::open_in_memory()?;
    let nodes = load_collection_rows(&conn, &layout, branch, Collection::Nodes)?.nodes;
    let refs =
        load_collection_rows(&conn, &layout, branch, Collection::ExternalRefs)?.external_refs;
    Ok((
        nodes.into_iter().filter(|n| !n.is_deleted).collect(),
        refs.into_iter().filter(|r| !r.is_deleted).collect(),
    ))
}

/// Normalize a relative path against the directory of `source_file`:
/// `..` pops a directory, `.` segments are dropped. Returns `None` when
/// the path escapes the package root.
pub(crate) fn join_relative(source_file: &str, relative: &str) -> Option<String> {
    let mut segments: Vec<&str> = match source_file.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_relative() {
        assert_eq!(
            join_relative("src/a/main.ts", "./utils").as_deref(),
            Some("src/a/utils")
        );
        assert_eq!(
            join_relative("src/a/main.ts", "../b/helper").as_deref(),
            Some("src/b/helper")
        );
        assert_eq!(join_relative("main.ts", "./utils").as_deref(), Some("utils"));
        assert_eq!(
            join_relative("main.ts", "../escape"),
            None,
            "refs escaping the package stay unresolved"
        );
    }

    #[test]
    fn test_disabled_mode_resolves_nothing() {
        let set = ResolverSet::new(ResolverConfig { enabled: false, timeout_ms: 1_000 });
        assert!(!set.is_available());

        let refs = vec![ExternalRef {
            source_entity_id: "r:p:module:abcd1234".into(),
            module_specifier: "./utils".into(),
            imported_symbol: "helper".into(),
            local_alias: None,
            import_style: ImportStyle::Named,
            is_type_only: false,
            is_reexport: false,
            is_resolved: false,
            target_entity_id: None,
            file_path: "main.ts".into(),
            start_line: 1,
            start_column: 0,
            branch: "base".into(),
            is_deleted: false,
            updated_at: 0,
        }];
        let (bindings, report) =
            set.resolve_package(Path::new("/nowhere"), "base", &refs, &CancellationToken::new());
        assert!(bindings.is_empty());
        assert_eq!(report.unresolved, 1);
    }
}
