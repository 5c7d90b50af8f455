//! Python resolver.
//!
//! Visibility is by convention: a leading underscore means private,
//! unless the module declares `__all__`, in which case the allowlist is
//! authoritative (the parser already folds both into `is_exported`).
//! Dotted module paths resolve from the package root; relative imports
//! (`.sib`, `..mod`) resolve against the importing file; a directory is
//! a module when it carries an `__init__.py` marker.

use std::path::Path;

use crate::error::DevacResult;
use crate::parser::Language;
use crate::resolver::{
    load_seed_rows, ExportEntry, ExportIndex, ResolveMethod, ResolvedRef, SemanticResolver,
};
use crate::types::{ExternalRef, ImportStyle, NodeKind};

/// Resolver for Python packages.
pub struct PythonResolver;

impl SemanticResolver for PythonResolver {
    fn language(&self) -> Language {
        Language::Python
    }

    fn build_export_index(&self, package_dir: &Path, branch: &str) -> DevacResult<ExportIndex> {
        let (nodes, _refs) = load_seed_rows(package_dir, branch)?;

        let mut index = ExportIndex {
            package_dir: package_dir.to_path_buf(),
            ..ExportIndex::default()
        };

        for node in &nodes {
            if Language::from_path(&node.file_path) != Language::Python {
                continue;
            }
            if node.kind == NodeKind::Module {
                index.modules.insert(node.file_path.clone(), node.entity_id.clone());
                continue;
            }
            if node.is_exported && node.kind != NodeKind::Method && is_top_level(node) {
                index.exports.entry(node.file_path.clone()).or_default().push(ExportEntry {
                    name: node.name.clone(),
                    kind: node.kind,
                    is_default: false,
                    is_type_only: false,
                    target_entity_id: node.entity_id.clone(),
                });
            }
        }

        Ok(index)
    }

    fn resolve_ref(&self, ext_ref: &ExternalRef, index: &ExportIndex) -> Option<ResolvedRef> {
        if Language::from_path(&ext_ref.file_path) != Language::Python {
            return None;
        }
        let target_file = resolve_module(index, &ext_ref.file_path, &ext_ref.module_specifier)?;

        let (target_entity_id, confidence) = match ext_ref.import_style {
            // `import m` / `from m import *` bind the module object.
            ImportStyle::Namespace => (index.modules.get(&target_file)?.clone(), 0.9),
            ImportStyle::Named => {
                let entry = index
                    .exports
                    .get(&target_file)?
                    .iter()
                    .find(|e| e.name == ext_ref.imported_symbol)?;
                (entry.target_entity_id.clone(), 0.85)
            }
            ImportStyle::Default | ImportStyle::SideEffect => return None,
        };

        Some(ResolvedRef {
            source_entity_id: ext_ref.source_entity_id.clone(),
            target_entity_id,
            target_file_path: target_file,
            confidence,
            method: ResolveMethod::Heuristic,
        })
    }
}

/// Resolve a dotted or relative module specifier to a known file,
/// memoized on the index.
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
    let base = if let Some(stripped) = specifier.strip_prefix('.') {
        // Relative import: one leading dot anchors at the importing
        // file's directory, each further dot pops a parent.
        let mut dir: Vec<&str> = match source_file.rsplit_once('/') {
            Some((dir, _)) => dir.split('/').collect(),
            None => Vec::new(),
        };
        let mut rest = stripped;
        while let Some(more) = rest.strip_prefix('.') {
            dir.pop()?;
            rest = more;
        }
        let mut parts: Vec<String> = dir.iter().map(|s| s.to_string()).collect();
        parts.extend(rest.split('.').filter(|s| !s.is_empty()).map(str::to_string));
        parts.join("/")
    } else {
        // Absolute import: walk from the package root.
        specifier.replace('.', "/")
    };

    if base.is_empty() {
        return None;
    }
    for candidate in [format!("{base}.py"), format!("{base}/__init__.py")] {
        if index.modules.contains_key(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_top_level(node: &crate::types::Node) -> bool {
    let module_name = crate::parser::module_name_from_path(&node.file_path);
    node.qualified_name == format!("{module_name}.{}", node.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_index() -> ExportIndex {
        let mut index = ExportIndex::default();
        for (file, id) in [
            ("app/main.py", "r:p:module:aaaa0001"),
            ("app/utils.py", "r:p:module:aaaa0002"),
            ("app/sub/__init__.py", "r:p:module:aaaa0003"),
            ("helpers.py", "r:p:module:aaaa0004"),
        ] {
            index.modules.insert(file.to_string(), id.to_string());
        }
        index.exports.entry("app/utils.py".into()).or_default().push(ExportEntry {
            name: "helper".into(),
            kind: NodeKind::Function,
            is_default: false,
            is_type_only: false,
            target_entity_id: "r:p:function:bbbb0001".into(),
        });
        index
    }

    fn py_ref(file: &str, specifier: &str, symbol: &str, style: ImportStyle) -> ExternalRef {
        ExternalRef {
            source_entity_id: "r:p:module:aaaa0001".into(),
            module_specifier: specifier.into(),
            imported_symbol: symbol.into(),
            local_alias: None,
            import_style: style,
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
    fn test_absolute_from_import() {
        let index = fixture_index();
        let resolved = PythonResolver
            .resolve_ref(
                &py_ref("app/main.py", "app.utils", "helper", ImportStyle::Named),
                &index,
            )
            .expect("resolved");
        assert_eq!(resolved.target_entity_id, "r:p:function:bbbb0001");
        assert_eq!(resolved.target_file_path, "app/utils.py");
    }

    #[test]
    fn test_relative_import() {
        let index = fixture_index();
        let resolved = PythonResolver
            .resolve_ref(
                &py_ref("app/main.py", ".utils", "helper", ImportStyle::Named),
                &index,
            )
            .expect("resolved");
        assert_eq!(resolved.target_file_path, "app/utils.py");
    }

    #[test]
    fn test_package_marker_resolution() {
        let index = fixture_index();
        let resolved = PythonResolver
            .resolve_ref(&py_ref("app/main.py", "app.sub", "*", ImportStyle::Namespace), &index)
            .expect("resolved");
        assert_eq!(resolved.target_file_path, "app/sub/__init__.py");
        assert_eq!(resolved.target_entity_id, "r:p:module:aaaa0003");
    }

    #[test]
    fn test_parent_relative_import() {
        let index = fixture_index();
        let resolved = PythonResolver
            .resolve_ref(
                &py_ref("app/sub/__init__.py", "..utils", "helper", ImportStyle::Named),
                &index,
            )
            .expect("resolved");
        assert_eq!(resolved.target_file_path, "app/utils.py");
    }

    #[test]
    fn test_stdlib_stays_unresolved() {
        let index = fixture_index();
        assert!(PythonResolver
            .resolve_ref(&py_ref("app/main.py", "os.path", "join", ImportStyle::Named), &index)
            .is_none());
    }

    #[test]
    fn test_private_symbol_not_exported() {
        let index = fixture_index();
        assert!(PythonResolver
            .resolve_ref(
                &py_ref("app/main.py", "app.utils", "_internal", ImportStyle::Named),
                &index,
            )
            .is_none());
    }
}
