//! TypeScript / JavaScript resolver.
//!
//! Export visibility is explicit (`export` keyword), so the export set
//! is exactly the exported nodes of each file. Re-exports
//! (`export * from`, `export { x as y } from`) are flattened into the
//! exporter's set. Module resolution handles relative specifiers with
//! extension and `index.*` probing; `.d.ts` stubs resolve at confidence
//! 0.8; bare specifiers are external packages and stay unresolved.

use std::path::Path;

use crate::error::DevacResult;
use crate::parser::Language;
use crate::resolver::{
    join_relative, load_seed_rows, ExportEntry, ExportIndex, ResolveMethod, ResolvedRef,
    SemanticResolver,
};
use crate::types::{ExternalRef, ImportStyle, NodeKind};

/// Candidate suffixes probed for a module specifier, in order.
const PROBE_SUFFIXES: [&str; 9] = [
    "",
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    ".d.ts",
    "/index.ts",
    "/index.tsx",
    "/index.js",
];

/// Resolver for TypeScript and JavaScript packages.
pub struct TypeScriptResolver;

impl SemanticResolver for TypeScriptResolver {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn build_export_index(&self, package_dir: &Path, branch: &str) -> DevacResult<ExportIndex> {
        let (nodes, refs) = load_seed_rows(package_dir, branch)?;

        let mut index = ExportIndex {
            package_dir: package_dir.to_path_buf(),
            ..ExportIndex::default()
        };

        for node in &nodes {
            if !is_ts_file(&node.file_path) {
                continue;
            }
            if node.kind == NodeKind::Module {
                index.modules.insert(node.file_path.clone(), node.entity_id.clone());
                continue;
            }
            // Only top-level exported symbols form the export set;
            // members of exported classes are not themselves exports.
            if node.is_exported && node.kind != NodeKind::Method && is_top_level(node) {
                index.exports.entry(node.file_path.clone()).or_default().push(ExportEntry {
                    name: node.name.clone(),
                    kind: node.kind,
                    is_default: node.is_default_export,
                    is_type_only: matches!(node.kind, NodeKind::Type | NodeKind::Interface),
                    target_entity_id: node.entity_id.clone(),
                });
            }
        }

        flatten_reexports(&mut index, &refs);
        Ok(index)
    }

    fn resolve_ref(&self, ext_ref: &ExternalRef, index: &ExportIndex) -> Option<ResolvedRef> {
        if !is_ts_file(&ext_ref.file_path) {
            return None;
        }
        let target_file = resolve_module(index, &ext_ref.file_path, &ext_ref.module_specifier)?;
        let is_stub = target_file.ends_with(".d.ts");

        let (target_entity_id, confidence) = match ext_ref.import_style {
            ImportStyle::Namespace => (index.modules.get(&target_file)?.clone(), 0.9),
            ImportStyle::Default => {
                let entry = index
                    .exports
                    .get(&target_file)?
                    .iter()
                    .find(|e| e.is_default)?;
                (entry.target_entity_id.clone(), 0.85)
            }
            ImportStyle::Named => {
                let entry = index
                    .exports
                    .get(&target_file)?
                    .iter()
                    .find(|e| e.name == ext_ref.imported_symbol)?;
                (entry.target_entity_id.clone(), 0.85)
            }
            ImportStyle::SideEffect => return None,
        };

        Some(ResolvedRef {
            source_entity_id: ext_ref.source_entity_id.clone(),
            target_entity_id,
            target_file_path: target_file,
            confidence: if is_stub { 0.8 } else { confidence },
            method: if is_stub { ResolveMethod::Stub } else { ResolveMethod::Heuristic },
        })
    }
}

/// Resolve a specifier to a known package file, memoized on the index.
fn resolve_module(index: &ExportIndex, source_file: &str, specifier: &str) -> Option<String> {
    let key = (source_file.to_string(), specifier.to_string());
    if let Some(memo) = index.module_resolution.get(&key) {
        return memo.clone();
    }

    let result = probe(index, source_file, specifier);
    index.module_resolution.insert(key, result.clone());
    result
}

fn probe(index: &ExportIndex, source_file: &str, specifier: &str) -> Option<String> {
    let base = if specifier.starts_with("./") || specifier.starts_with("../") {
        // Relative imports resolve against the importing file's directory.
        join_relative(source_file, specifier)?
    } else if specifier.starts_with('@') || specifier.contains(':') {
        // Scoped external packages never live in this package.
        return None;
    } else {
        // Bare specifiers are usually external packages, but a
        // package-root path (tsconfig baseUrl style) can still land on
        // a known file; anything that doesn't is the hub's problem.
        specifier.to_string()
    };

    for suffix in PROBE_SUFFIXES {
        let candidate = format!("{base}{suffix}");
        if index.modules.contains_key(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Whether a node sits directly under its module scope.
fn is_top_level(node: &crate::types::Node) -> bool {
    let module_name = crate::parser::module_name_from_path(&node.file_path);
    node.qualified_name == format!("{module_name}.{}", node.name)
}

fn is_ts_file(path: &str) -> bool {
    matches!(
        Language::from_path(path),
        Language::TypeScript | Language::JavaScript
    )
}

/// Fold re-export refs into the exporters' export sets, iterating to a
/// fixpoint so chains (`a` re-exports `b` re-exports `c`) converge.
fn flatten_reexports(index: &mut ExportIndex, refs: &[ExternalRef]) {
    let reexports: Vec<&ExternalRef> = refs
        .iter()
        .filter(|r| r.is_reexport && is_ts_file(&r.file_path))
        .collect();
    if reexports.is_empty() {
        return;
    }

    for _ in 0..10 {
        let mut changed = false;
        for ext_ref in &reexports {
            let Some(target_file) =
                resolve_module(index, &ext_ref.file_path, &ext_ref.module_specifier)
            else {
                continue;
            };
            let pulled: Vec<ExportEntry> = match ext_ref.imported_symbol.as_str() {
                // `export * from "./m"`: everything except the default.
                "*" if ext_ref.local_alias.is_none() => index
                    .exports
                    .get(&target_file)
                    .map(|entries| entries.iter().filter(|e| !e.is_default).cloned().collect())
                    .unwrap_or_default(),
                // `export * as ns from "./m"` binds a namespace object,
                // which has no entity here.
                "*" => Vec::new(),
                // `export { x as y } from "./m"`.
                name => index
                    .exports
                    .get(&target_file)
                    .and_then(|entries| entries.iter().find(|e| e.name == name))
                    .map(|entry| {
                        let mut entry = entry.clone();
                        if let Some(alias) = &ext_ref.local_alias {
                            entry.name = alias.clone();
                        }
                        vec![entry]
                    })
                    .unwrap_or_default(),
            };

            let exporter = index.exports.entry(ext_ref.file_path.clone()).or_default();
            for entry in pulled {
                if !exporter.iter().any(|e| e.name == entry.name) {
                    exporter.push(entry);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::compute_entity_id;

    fn entry(name: &str, id: &str) -> ExportEntry {
        ExportEntry {
            name: name.into(),
            kind: NodeKind::Function,
            is_default: false,
            is_type_only: false,
            target_entity_id: id.into(),
        }
    }

    fn fixture_index() -> ExportIndex {
        let mut index = ExportIndex::default();
        for file in ["src/utils.ts", "src/index.ts", "src/types.d.ts", "main.ts"] {
            let module_name = crate::parser::module_name_from_path(file);
            index.modules.insert(
                file.to_string(),
                compute_entity_id("r", "p", NodeKind::Module, &module_name, file),
            );
        }
        index
            .exports
            .entry("src/utils.ts".into())
            .or_default()
            .push(entry("helper", "r:p:function:11111111"));
        index
            .exports
            .entry("src/types.d.ts".into())
            .or_default()
            .push(entry("Shape", "r:p:interface:22222222"));
        index
    }

    fn named_ref(file: &str, specifier: &str, symbol: &str) -> ExternalRef {
        ExternalRef {
            source_entity_id: "r:p:module:00000000".into(),
            module_specifier: specifier.into(),
            imported_symbol: symbol.into(),
            local_alias: None,
            import_style: ImportStyle::Named,
            is_type_only: false,
            is_reexport: false,
            is_resolved: false,
            target_entity_id: None,
            file_path: file.into(),
            start_line: 1,
            start_column: 0,
            branch: "base".into(),
            is_deleted: false,
            updated_at: 0,
        }
    }

    #[test]
    fn test_relative_named_import_resolves() {
        let index = fixture_index();
        let resolved = TypeScriptResolver
            .resolve_ref(&named_ref("src/main.ts", "./utils", "helper"), &index)
            .expect("resolved");
        assert_eq!(resolved.target_entity_id, "r:p:function:11111111");
        assert_eq!(resolved.target_file_path, "src/utils.ts");
        assert_eq!(resolved.method, ResolveMethod::Heuristic);
        assert!(resolved.confidence >= 0.7 && resolved.confidence <= 0.9);
    }

    #[test]
    fn test_parent_directory_import() {
        let mut index = fixture_index();
        index.modules.insert("lib/deep/mod.ts".into(), "r:p:module:33333333".into());
        let resolved = TypeScriptResolver
            .resolve_ref(&named_ref("lib/deep/mod.ts", "../../src/utils", "helper"), &index)
            .expect("resolved");
        assert_eq!(resolved.target_file_path, "src/utils.ts");
    }

    #[test]
    fn test_index_file_probe() {
        let index = fixture_index();
        let mut namespace = named_ref("main.ts", "./src", "*");
        namespace.import_style = ImportStyle::Namespace;
        let resolved = TypeScriptResolver.resolve_ref(&namespace, &index).expect("resolved");
        assert_eq!(resolved.target_file_path, "src/index.ts");
    }

    #[test]
    fn test_dts_stub_confidence() {
        let index = fixture_index();
        let resolved = TypeScriptResolver
            .resolve_ref(&named_ref("src/main.ts", "./types", "Shape"), &index)
            .expect("resolved");
        assert_eq!(resolved.method, ResolveMethod::Stub);
        assert!((resolved.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_external_package_stays_unresolved() {
        let index = fixture_index();
        assert!(TypeScriptResolver
            .resolve_ref(&named_ref("src/main.ts", "stripe", "Stripe"), &index)
            .is_none());
        assert!(TypeScriptResolver
            .resolve_ref(&named_ref("src/main.ts", "@aws-sdk/client-s3", "S3"), &index)
            .is_none());
    }

    #[test]
    fn test_unknown_symbol_stays_unresolved() {
        let index = fixture_index();
        assert!(TypeScriptResolver
            .resolve_ref(&named_ref("src/main.ts", "./utils", "nonexistent"), &index)
            .is_none());
    }

    #[test]
    fn test_reexport_flattening() {
        let mut index = fixture_index();
        // src/index.ts: export * from "./utils"; export { helper as util } from "./utils";
        let mut star = named_ref("src/index.ts", "./utils", "*");
        star.is_reexport = true;
        let mut aliased = named_ref("src/index.ts", "./utils", "helper");
        aliased.is_reexport = true;
        aliased.local_alias = Some("util".into());
        flatten_reexports(&mut index, &[star, aliased]);

        let exports = index.exports.get("src/index.ts").expect("exports");
        assert!(exports.iter().any(|e| e.name == "helper"));
        assert!(exports.iter().any(|e| e.name == "util"));

        // Importing through the barrel resolves to the original entity.
        let resolved = TypeScriptResolver
            .resolve_ref(&named_ref("main.ts", "./src/index", "helper"), &index)
            .expect("resolved");
        assert_eq!(resolved.target_entity_id, "r:p:function:11111111");
    }
}
