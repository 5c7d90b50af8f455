//! Python driver.
//!
//! Extracts functions, classes, methods, module-level assignments,
//! decorators, `__all__`, import sites, and call effects. Visibility
//! follows the leading-underscore convention; when `__all__` is present
//! it is recorded on the module node for the resolver.

use crate::error::{DevacError, DevacResult};
use crate::identity::{compute_effect_id, compute_entity_id};
use crate::parser::{FileParse, Language, LanguageParser, ParseContext};
use crate::types::{
    CodeEffect, Edge, EdgeKind, ExternalRef, ImportStyle, Node, NodeKind, Span, Visibility,
};

/// Driver for Python source files.
pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse_file(&self, ctx: &ParseContext<'_>, content: &str) -> DevacResult<FileParse> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| DevacError::Parse {
                path: ctx.file_path.into(),
                message: format!("failed to set tree-sitter language: {e}"),
            })?;

        let tree = parser.parse(content, None).ok_or_else(|| DevacError::Parse {
            path: ctx.file_path.into(),
            message: "tree-sitter returned None".into(),
        })?;

        let mut collector = Collector::new(ctx, content.as_bytes());
        collector.collect(tree.root_node());
        Ok(collector.finish())
    }
}

struct Collector<'a> {
    ctx: &'a ParseContext<'a>,
    source: &'a [u8],
    module_name: String,
    module_id: String,
    out: FileParse,
    imported_bindings: Vec<String>,
    dunder_all: Option<Vec<String>>,
}

impl<'a> Collector<'a> {
    fn new(ctx: &'a ParseContext<'a>, source: &'a [u8]) -> Self {
        let module_name = crate::parser::module_name_from_path(ctx.file_path);
        let module_id = compute_entity_id(
            ctx.repo,
            ctx.package,
            NodeKind::Module,
            &module_name,
            ctx.file_path,
        );
        Self {
            ctx,
            source,
            module_name,
            module_id,
            out: FileParse::default(),
            imported_bindings: Vec::new(),
            dunder_all: None,
        }
    }

    fn collect(&mut self, root: tree_sitter::Node<'_>) {
        self.push_module_node(root);
        self.walk(root, &[], &self.module_id.clone(), false, false);
    }

    fn finish(mut self) -> FileParse {
        // `__all__` overrides the underscore convention for exports, and
        // is carried on the module node for the resolver.
        if let Some(all) = self.dunder_all.clone() {
            for node in &mut self.out.nodes {
                if node.kind != NodeKind::Module {
                    node.is_exported = all.iter().any(|a| a == &node.name);
                }
            }
            if let Some(module) = self.out.nodes.iter_mut().find(|n| n.kind == NodeKind::Module) {
                module.properties = Some(serde_json::json!({ "dunder_all": all }));
            }
        }
        self.out
    }

    fn push_module_node(&mut self, root: tree_sitter::Node<'_>) {
        let name = self
            .module_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.module_name)
            .to_string();
        self.out.nodes.push(Node {
            entity_id: self.module_id.clone(),
            name,
            qualified_name: self.module_name.clone(),
            kind: NodeKind::Module,
            file_path: self.ctx.file_path.to_string(),
            span: span_of(root),
            source_file_hash: self.ctx.source_file_hash.to_string(),
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
            is_exported: false,
            is_default_export: false,
            visibility: Visibility::Public,
            is_async: false,
            is_generator: false,
            is_static: false,
            is_abstract: false,
            type_signature: None,
            documentation: None,
            decorators: Vec::new(),
            type_parameters: None,
            properties: None,
        });
    }

    fn walk(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        in_class: bool,
        in_async: bool,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "import_statement" | "import_from_statement" => self.collect_import(child),
                "decorated_definition" => {
                    let decorator_names = child
                        .children(&mut child.walk())
                        .filter(|c| c.kind() == "decorator")
                        .map(|c| node_text(c, self.source).trim_start_matches('@').to_string())
                        .collect::<Vec<_>>();
                    if let Some(def) = child.child_by_field_name("definition") {
                        self.collect_definition(def, scope, parent_id, in_class, in_async, decorator_names);
                    }
                }
                "function_definition" | "class_definition" => {
                    self.collect_definition(child, scope, parent_id, in_class, in_async, Vec::new());
                }
                "expression_statement" => {
                    self.collect_assignment(child, scope, parent_id);
                    self.walk(child, scope, parent_id, in_class, in_async);
                }
                "call" => {
                    self.collect_effect(child, parent_id, in_async);
                    self.walk(child, scope, parent_id, in_class, in_async);
                }
                _ => {
                    if child.child_count() > 0 && child.kind() != "string" {
                        self.walk(child, scope, parent_id, in_class, in_async);
                    }
                }
            }
        }
    }

    fn collect_definition(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        in_class: bool,
        in_async: bool,
        decorator_names: Vec<String>,
    ) {
        let Some(name) = field_text(node, "name", self.source) else { return };
        let is_class = node.kind() == "class_definition";
        let is_async = has_keyword_child(node, "async");

        let kind = if is_class {
            NodeKind::Class
        } else if in_class {
            NodeKind::Method
        } else {
            NodeKind::Function
        };

        let sig = if is_class {
            field_text(node, "superclasses", self.source).unwrap_or_default()
        } else {
            field_text(node, "parameters", self.source).unwrap_or_default()
        };

        let qualified_name = qualify(&self.module_name, scope, &name);
        let entity_id = compute_entity_id(
            self.ctx.repo,
            self.ctx.package,
            kind,
            &qualified_name,
            &sig,
        );

        let private = name.starts_with('_') && !name.starts_with("__");
        let dunder = name.starts_with("__") && name.ends_with("__");

        self.out.nodes.push(Node {
            entity_id: entity_id.clone(),
            name: name.clone(),
            qualified_name: qualified_name.clone(),
            kind,
            file_path: self.ctx.file_path.to_string(),
            span: span_of(node),
            source_file_hash: self.ctx.source_file_hash.to_string(),
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
            // Convention: public unless underscore-prefixed; `__all__`
            // rewrites this in `finish` when present.
            is_exported: scope.is_empty() && !private && !dunder,
            is_default_export: false,
            visibility: if private { Visibility::Private } else { Visibility::Public },
            is_async,
            is_generator: false,
            is_static: decorator_names.iter().any(|d| d == "staticmethod"),
            is_abstract: decorator_names.iter().any(|d| d.contains("abstractmethod")),
            type_signature: if is_class { None } else { Some(sig.clone()) },
            documentation: docstring(node, self.source),
            decorators: decorator_names,
            type_parameters: None,
            properties: None,
        });

        self.push_edge(
            parent_id.to_string(),
            entity_id.clone(),
            EdgeKind::Contains,
            line_of(node),
            col_of(node),
        );

        // Superclass edges for locally-defined bases.
        if is_class {
            if let Some(supers) = node.child_by_field_name("superclasses") {
                let mut cursor = supers.walk();
                for base in supers.children(&mut cursor) {
                    if base.kind() == "identifier" {
                        let base_name = node_text(base, self.source).to_string();
                        if let Some(base_node) =
                            self.out.nodes.iter().find(|n| n.name == base_name)
                        {
                            let target = base_node.entity_id.clone();
                            self.push_edge(
                                entity_id.clone(),
                                target,
                                EdgeKind::Extends,
                                line_of(node),
                                col_of(node),
                            );
                        }
                    }
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut inner = scope.to_vec();
            inner.push(name);
            self.walk(body, &inner, &entity_id, is_class, is_async || in_async);
        }
    }

    /// Module-level `NAME = value` assignments become variable/constant
    /// nodes; `__all__` is captured for export rewriting.
    fn collect_assignment(
        &mut self,
        stmt: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
    ) {
        if !scope.is_empty() {
            return;
        }
        let Some(assign) = stmt.named_child(0).filter(|n| n.kind() == "assignment") else {
            return;
        };
        let Some(left) = assign.child_by_field_name("left") else { return };
        if left.kind() != "identifier" {
            return;
        }
        let name = node_text(left, self.source).to_string();

        if name == "__all__" {
            if let Some(right) = assign.child_by_field_name("right") {
                let mut names = Vec::new();
                collect_string_items(right, self.source, &mut names);
                self.dunder_all = Some(names);
            }
            return;
        }

        let kind = if name.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
        {
            NodeKind::Constant
        } else {
            NodeKind::Variable
        };
        let sig = field_text(assign, "type", self.source).unwrap_or_default();
        let qualified_name = qualify(&self.module_name, scope, &name);
        let entity_id =
            compute_entity_id(self.ctx.repo, self.ctx.package, kind, &qualified_name, &sig);

        // Re-assignment of the same module-level name: first one wins.
        if self.out.nodes.iter().any(|n| n.qualified_name == qualified_name) {
            return;
        }

        let private = name.starts_with('_');
        self.out.nodes.push(Node {
            entity_id: entity_id.clone(),
            name,
            qualified_name,
            kind,
            file_path: self.ctx.file_path.to_string(),
            span: span_of(assign),
            source_file_hash: self.ctx.source_file_hash.to_string(),
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
            is_exported: !private,
            is_default_export: false,
            visibility: if private { Visibility::Private } else { Visibility::Public },
            is_async: false,
            is_generator: false,
            is_static: false,
            is_abstract: false,
            type_signature: None,
            documentation: None,
            decorators: Vec::new(),
            type_parameters: None,
            properties: None,
        });
        self.push_edge(
            parent_id.to_string(),
            entity_id,
            EdgeKind::Contains,
            line_of(assign),
            col_of(assign),
        );
    }

    fn collect_import(&mut self, node: tree_sitter::Node<'_>) {
        let line = line_of(node);
        let col = col_of(node);

        if node.kind() == "import_statement" {
            // `import a.b [as c]`
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => {
                        let module = node_text(child, self.source).to_string();
                        let local = module.split('.').next().unwrap_or(&module).to_string();
                        self.imported_bindings.push(local);
                        self.push_ref(&module, "*", None, ImportStyle::Namespace, line, col);
                    }
                    "aliased_import" => {
                        let module = child
                            .child_by_field_name("name")
                            .map(|n| node_text(n, self.source).to_string())
                            .unwrap_or_default();
                        let alias = field_text(child, "alias", self.source);
                        if let Some(alias) = &alias {
                            self.imported_bindings.push(alias.clone());
                        }
                        self.push_ref(&module, "*", alias, ImportStyle::Namespace, line, col);
                    }
                    _ => {}
                }
            }
            return;
        }

        // `from m import a, b as c` / `from m import *`
        let Some(module_node) = node.child_by_field_name("module_name") else { return };
        let module = node_text(module_node, self.source).to_string();

        let mut any_name = false;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" if child.id() != module_node.id() => {
                    any_name = true;
                    let name = node_text(child, self.source).to_string();
                    self.imported_bindings.push(name.clone());
                    self.push_ref(&module, &name, None, ImportStyle::Named, line, col);
                }
                "aliased_import" => {
                    any_name = true;
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| node_text(n, self.source).to_string())
                        .unwrap_or_default();
                    let alias = field_text(child, "alias", self.source);
                    if let Some(alias) = &alias {
                        self.imported_bindings.push(alias.clone());
                    }
                    self.push_ref(&module, &name, alias, ImportStyle::Named, line, col);
                }
                "wildcard_import" => {
                    any_name = true;
                    self.push_ref(&module, "*", None, ImportStyle::Namespace, line, col);
                }
                _ => {}
            }
        }

        if !any_name {
            self.push_ref(&module, "", None, ImportStyle::SideEffect, line, col);
        }
    }

    fn push_ref(
        &mut self,
        specifier: &str,
        imported: &str,
        alias: Option<String>,
        style: ImportStyle,
        line: u32,
        col: u32,
    ) {
        self.out.external_refs.push(ExternalRef {
            source_entity_id: self.module_id.clone(),
            module_specifier: specifier.to_string(),
            imported_symbol: imported.to_string(),
            local_alias: alias,
            import_style: style,
            is_type_only: false,
            is_reexport: false,
            is_resolved: false,
            target_entity_id: None,
            file_path: self.ctx.file_path.to_string(),
            start_line: line,
            start_column: col,
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
        });
    }

    fn collect_effect(&mut self, node: tree_sitter::Node<'_>, parent_id: &str, in_async: bool) {
        let Some(callee_node) = node.child_by_field_name("function") else { return };
        let callee = node_text(callee_node, self.source).to_string();
        if callee.is_empty() || callee.contains('\n') || callee.contains('[') || callee.contains('(')
        {
            return;
        }

        let root = callee.split('.').next().unwrap_or(&callee);
        let is_external = self.imported_bindings.iter().any(|b| b == root);
        let awaited = node.parent().map(|p| p.kind() == "await").unwrap_or(false);
        let line = line_of(node);

        self.out.effects.push(CodeEffect {
            effect_id: compute_effect_id(parent_id, "FunctionCall", &callee, line),
            effect_type: "FunctionCall".into(),
            source_entity_id: parent_id.to_string(),
            file_path: self.ctx.file_path.to_string(),
            start_line: line,
            callee_name: callee,
            is_external,
            is_async: awaited || in_async,
            is_constructor: false,
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
            properties: None,
        });
    }

    fn push_edge(&mut self, source: String, target: String, kind: EdgeKind, line: u32, col: u32) {
        self.out.edges.push(Edge {
            source_entity_id: source,
            target_entity_id: target,
            edge_type: kind,
            file_path: self.ctx.file_path.to_string(),
            start_line: line,
            start_column: col,
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
            properties: None,
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

fn field_text(node: tree_sitter::Node<'_>, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_string())
}

fn line_of(node: tree_sitter::Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

fn col_of(node: tree_sitter::Node<'_>) -> u32 {
    node.start_position().column as u32
}

fn span_of(node: tree_sitter::Node<'_>) -> Span {
    Span {
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        start_column: node.start_position().column as u32,
        end_column: node.end_position().column as u32,
    }
}

fn qualify(module_name: &str, scope: &[String], name: &str) -> String {
    let mut parts = vec![module_name.to_string()];
    parts.extend_from_slice(scope);
    parts.push(name.to_string());
    parts.join(".")
}

fn has_keyword_child(node: tree_sitter::Node<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == keyword);
    found
}

/// First statement docstring of a function or class body.
fn docstring(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0).filter(|n| n.kind() == "string")?;
    let text = node_text(string, source)
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Collect string literal items out of a list/tuple expression.
fn collect_string_items(node: tree_sitter::Node<'_>, source: &[u8], out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "string" {
            out.push(
                node_text(child, source)
                    .trim_matches(|c: char| c == '"' || c == '\'')
                    .to_string(),
            );
        } else if child.child_count() > 0 {
            collect_string_items(child, source, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> FileParse {
        let ctx = ParseContext {
            repo: "api",
            package: "svc",
            branch: "base",
            file_path: "app/main.py",
            source_file_hash: "cafebabe",
            updated_at: 1,
        };
        PythonParser.parse_file(&ctx, src).expect("parse should succeed")
    }

    fn find<'a>(batch: &'a FileParse, name: &str) -> &'a Node {
        batch
            .nodes
            .iter()
            .find(|n| n.name == name)
            .unwrap_or_else(|| panic!("no node named {name}"))
    }

    #[test]
    fn test_function_and_docstring() {
        let batch = parse("def greet(name):\n    \"\"\"Say hello.\"\"\"\n    return name\n");
        let greet = find(&batch, "greet");
        assert_eq!(greet.kind, NodeKind::Function);
        assert!(greet.is_exported);
        assert_eq!(greet.documentation.as_deref(), Some("Say hello."));
        assert_eq!(greet.qualified_name, "app.main.greet");
    }

    #[test]
    fn test_underscore_is_private() {
        let batch = parse("def _internal():\n    pass\n");
        let node = find(&batch, "_internal");
        assert_eq!(node.visibility, Visibility::Private);
        assert!(!node.is_exported);
    }

    #[test]
    fn test_dunder_all_overrides_convention() {
        let batch = parse(
            "__all__ = [\"public_fn\"]\n\ndef public_fn():\n    pass\n\ndef also_public_name():\n    pass\n",
        );
        assert!(find(&batch, "public_fn").is_exported);
        assert!(
            !find(&batch, "also_public_name").is_exported,
            "__all__ is authoritative when present"
        );
        let module = batch.nodes.iter().find(|n| n.kind == NodeKind::Module).expect("module");
        let all = module
            .properties
            .as_ref()
            .and_then(|p| p.get("dunder_all"))
            .expect("dunder_all recorded");
        assert_eq!(all, &serde_json::json!(["public_fn"]));
    }

    #[test]
    fn test_class_with_methods() {
        let batch = parse(
            "class Service:\n    def run(self):\n        pass\n\n    @staticmethod\n    def make():\n        pass\n",
        );
        assert_eq!(find(&batch, "Service").kind, NodeKind::Class);
        assert_eq!(find(&batch, "run").kind, NodeKind::Method);
        assert!(find(&batch, "make").is_static);
        let class_id = &find(&batch, "Service").entity_id;
        let run_id = &find(&batch, "run").entity_id;
        assert!(batch.edges.iter().any(|e| e.edge_type == EdgeKind::Contains
            && &e.source_entity_id == class_id
            && &e.target_entity_id == run_id));
    }

    #[test]
    fn test_local_extends_edge() {
        let batch = parse("class Base:\n    pass\n\nclass Child(Base):\n    pass\n");
        let base = find(&batch, "Base");
        let child = find(&batch, "Child");
        assert!(batch.edges.iter().any(|e| e.edge_type == EdgeKind::Extends
            && e.source_entity_id == child.entity_id
            && e.target_entity_id == base.entity_id));
    }

    #[test]
    fn test_imports() {
        let batch = parse("import boto3\nfrom os.path import join as pjoin\nfrom typing import *\n");
        assert_eq!(batch.external_refs.len(), 3);
        assert_eq!(batch.external_refs[0].module_specifier, "boto3");
        assert_eq!(batch.external_refs[0].import_style, ImportStyle::Namespace);
        assert_eq!(batch.external_refs[1].module_specifier, "os.path");
        assert_eq!(batch.external_refs[1].imported_symbol, "join");
        assert_eq!(batch.external_refs[1].local_alias.as_deref(), Some("pjoin"));
        assert_eq!(batch.external_refs[2].imported_symbol, "*");
    }

    #[test]
    fn test_call_effect() {
        let batch = parse("import boto3\n\ndef put(item):\n    boto3.client(\"dynamodb\").put_item(item)\n");
        let effect = batch
            .effects
            .iter()
            .find(|e| e.callee_name == "boto3.client")
            .expect("effect");
        assert!(effect.is_external);
        assert!(!effect.is_async);
    }

    #[test]
    fn test_async_function_effects() {
        let batch = parse("import db\n\nasync def load():\n    return await db.fetch()\n");
        let load = find(&batch, "load");
        assert!(load.is_async);
        let effect = batch.effects.iter().find(|e| e.callee_name == "db.fetch").expect("effect");
        assert!(effect.is_async);
    }

    #[test]
    fn test_module_constant() {
        let batch = parse("MAX_SIZE = 100\ncounter = 0\n");
        assert_eq!(find(&batch, "MAX_SIZE").kind, NodeKind::Constant);
        assert_eq!(find(&batch, "counter").kind, NodeKind::Variable);
    }
}
