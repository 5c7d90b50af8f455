//! TypeScript / JavaScript driver.
//!
//! Extracts functions, arrow functions, classes, interfaces, type
//! aliases, enums, methods, export markers, import sites, and call
//! effects from TS/TSX/JS sources. One driver instance serves both
//! languages; JSX-capable sources are parsed with the TSX grammar.

use crate::error::{DevacError, DevacResult};
use crate::identity::{compute_effect_id, compute_entity_id};
use crate::parser::{FileParse, Language, LanguageParser, ParseContext};
use crate::types::{
    CodeEffect, Edge, EdgeKind, ExternalRef, ImportStyle, Node, NodeKind, Span, Visibility,
};

/// Driver for TypeScript and JavaScript source files.
pub struct TypeScriptParser {
    language: Language,
}

impl TypeScriptParser {
    /// Driver registered for `.ts` / `.tsx`.
    pub fn typescript() -> Self {
        Self { language: Language::TypeScript }
    }

    /// Driver registered for `.js` / `.jsx` / `.mjs` / `.cjs`.
    pub fn javascript() -> Self {
        Self { language: Language::JavaScript }
    }
}

impl LanguageParser for TypeScriptParser {
    fn language(&self) -> Language {
        self.language
    }

    fn parse_file(&self, ctx: &ParseContext<'_>, content: &str) -> DevacResult<FileParse> {
        let grammar: tree_sitter::Language = if ctx.file_path.ends_with(".ts") {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        } else {
            // TSX is a superset covering .tsx and plain JS/JSX.
            tree_sitter_typescript::LANGUAGE_TSX.into()
        };

        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&grammar).map_err(|e| DevacError::Parse {
            path: ctx.file_path.into(),
            message: format!("failed to set tree-sitter language: {e}"),
        })?;

        let tree = parser.parse(content, None).ok_or_else(|| DevacError::Parse {
            path: ctx.file_path.into(),
            message: "tree-sitter returned None (parse timeout or cancellation)".into(),
        })?;

        let mut collector = Collector::new(ctx, content.as_bytes());
        collector.collect(tree.root_node());
        Ok(collector.finish())
    }
}

// ---------------------------------------------------------------------------
// Collection state
// ---------------------------------------------------------------------------

struct Collector<'a> {
    ctx: &'a ParseContext<'a>,
    source: &'a [u8],
    module_name: String,
    module_id: String,
    out: FileParse,
    /// Local bindings introduced by imports, for `is_external` effects.
    imported_bindings: Vec<String>,
    /// `(source qualified name, heritage name, edge kind, line)` awaiting
    /// local resolution.
    pending_heritage: Vec<(String, String, EdgeKind, u32)>,
    /// `(enclosing entity id, callee root, line)` for local CALLS edges.
    pending_calls: Vec<(String, String, u32)>,
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
            pending_heritage: Vec::new(),
            pending_calls: Vec::new(),
        }
    }

    fn collect(&mut self, root: tree_sitter::Node<'_>) {
        self.push_module_node(root);
        self.walk(root, &[], &self.module_id.clone(), false);
    }

    fn finish(mut self) -> FileParse {
        // Resolve heritage and single-identifier calls against symbols
        // defined in this file.
        let local: Vec<(String, String, String)> = self
            .out
            .nodes
            .iter()
            .map(|n| (n.name.clone(), n.qualified_name.clone(), n.entity_id.clone()))
            .collect();
        let find = |name: &str| {
            local
                .iter()
                .find(|(n, q, _)| n == name || q == name)
                .map(|(_, _, id)| id.clone())
        };

        for (source_qn, target_name, kind, line) in std::mem::take(&mut self.pending_heritage) {
            let Some(source_id) = find(&source_qn) else { continue };
            let Some(target_id) = find(&target_name) else { continue };
            self.push_edge(source_id, target_id, kind, line, 0);
        }
        for (source_id, callee, line) in std::mem::take(&mut self.pending_calls) {
            let Some(target_id) = find(&callee) else { continue };
            if target_id != source_id {
                self.push_edge(source_id, target_id, EdgeKind::Calls, line, 0);
            }
        }

        self.out
    }

    // -- node emission ------------------------------------------------------

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

    #[allow(clippy::too_many_arguments)]
    fn push_symbol(
        &mut self,
        node: tree_sitter::Node<'_>,
        name: &str,
        kind: NodeKind,
        scope: &[String],
        parent_id: &str,
        exported: Exported,
        structural_sig: &str,
    ) -> String {
        let qualified_name = qualify(&self.module_name, scope, name);
        let entity_id = compute_entity_id(
            self.ctx.repo,
            self.ctx.package,
            kind,
            &qualified_name,
            structural_sig,
        );

        let visibility = match accessibility(node, self.source) {
            Some(v) => v,
            None if exported.is_exported => Visibility::Public,
            None => Visibility::Private,
        };

        self.out.nodes.push(Node {
            entity_id: entity_id.clone(),
            name: name.to_string(),
            qualified_name,
            kind,
            file_path: self.ctx.file_path.to_string(),
            span: span_of(node),
            source_file_hash: self.ctx.source_file_hash.to_string(),
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
            is_exported: exported.is_exported,
            is_default_export: exported.is_default,
            visibility,
            is_async: has_keyword_child(node, "async"),
            is_generator: node.kind().contains("generator") || has_keyword_child(node, "*"),
            is_static: has_keyword_child(node, "static"),
            is_abstract: node.kind().starts_with("abstract") || has_keyword_child(node, "abstract"),
            type_signature: type_signature(node, self.source),
            documentation: extract_jsdoc(node, self.source),
            decorators: decorators(node, self.source),
            type_parameters: field_text(node, "type_parameters", self.source),
            properties: None,
        });

        self.push_edge(parent_id.to_string(), entity_id.clone(), EdgeKind::Contains, line_of(node), col_of(node));
        entity_id
    }

    fn is_namespace(&self, entity_id: &str) -> bool {
        self.out
            .nodes
            .iter()
            .any(|n| n.entity_id == entity_id && n.kind == NodeKind::Namespace)
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

    // -- traversal ----------------------------------------------------------

    /// Walk `node`'s children. `scope` is the symbol nesting path,
    /// `parent_id` the enclosing entity, `in_async` whether the
    /// enclosing function is async.
    fn walk(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        in_async: bool,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, scope, parent_id, Exported::no(), in_async);
        }
    }

    fn visit(
        &mut self,
        child: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        exported: Exported,
        in_async: bool,
    ) {
        match child.kind() {
            "import_statement" => self.collect_import(child),
            "export_statement" => self.collect_export(child, scope, parent_id, in_async),
            "function_declaration" | "generator_function_declaration" => {
                self.collect_function(child, scope, parent_id, exported, in_async);
            }
            "class_declaration" | "abstract_class_declaration" => {
                self.collect_class(child, scope, parent_id, exported, in_async);
            }
            "interface_declaration" => {
                self.collect_named(child, NodeKind::Interface, scope, parent_id, exported);
            }
            "type_alias_declaration" => {
                self.collect_named(child, NodeKind::Type, scope, parent_id, exported);
            }
            "enum_declaration" => {
                self.collect_named(child, NodeKind::Enum, scope, parent_id, exported);
            }
            "internal_module" | "module" => {
                self.collect_namespace(child, scope, parent_id, exported, in_async);
            }
            "lexical_declaration" | "variable_declaration" => {
                self.collect_variables(child, scope, parent_id, exported, in_async);
            }
            "method_definition" => {
                self.collect_method(child, scope, parent_id, in_async);
            }
            "call_expression" | "new_expression" => {
                self.collect_effect(child, parent_id, in_async);
                self.walk(child, scope, parent_id, in_async);
            }
            _ => {
                if child.child_count() > 0
                    && child.kind() != "string"
                    && child.kind() != "template_string"
                {
                    self.walk(child, scope, parent_id, in_async);
                }
            }
        }
    }

    fn collect_function(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        exported: Exported,
        _in_async: bool,
    ) {
        let Some(name) = field_text(node, "name", self.source) else { return };
        let params = field_text(node, "parameters", self.source).unwrap_or_default();
        let kind = if name.starts_with("use")
            && name.chars().nth(3).map(char::is_uppercase).unwrap_or(false)
        {
            NodeKind::Hook
        } else {
            NodeKind::Function
        };
        let entity_id = self.push_symbol(node, &name, kind, scope, parent_id, exported, &params);

        let is_async = has_keyword_child(node, "async");
        if let Some(body) = node.child_by_field_name("body") {
            let mut inner = scope.to_vec();
            inner.push(name);
            self.walk(body, &inner, &entity_id, is_async);
        }
    }

    fn collect_class(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        exported: Exported,
        in_async: bool,
    ) {
        let Some(name) = field_text(node, "name", self.source) else { return };
        let heritage = heritage_clauses(node, self.source);
        let sig: String = heritage
            .iter()
            .map(|(n, _)| n.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let entity_id =
            self.push_symbol(node, &name, NodeKind::Class, scope, parent_id, exported, &sig);

        let qualified = qualify(&self.module_name, scope, &name);
        for (target, kind) in heritage {
            self.pending_heritage
                .push((qualified.clone(), target, kind, line_of(node)));
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut inner = scope.to_vec();
            inner.push(name);
            self.walk(body, &inner, &entity_id, in_async);
        }
    }

    fn collect_named(
        &mut self,
        node: tree_sitter::Node<'_>,
        kind: NodeKind,
        scope: &[String],
        parent_id: &str,
        exported: Exported,
    ) {
        let Some(name) = field_text(node, "name", self.source) else { return };
        let sig = field_text(node, "value", self.source)
            .or_else(|| field_text(node, "body", self.source).map(|b| first_line(&b)))
            .unwrap_or_default();
        let entity_id = self.push_symbol(node, &name, kind, scope, parent_id, exported, &sig);

        if kind == NodeKind::Interface {
            for (target, _) in heritage_clauses(node, self.source) {
                self.pending_heritage.push((
                    qualify(&self.module_name, scope, &name),
                    target,
                    EdgeKind::Extends,
                    line_of(node),
                ));
            }
        }
        // Types and interfaces define a type for their container.
        if matches!(kind, NodeKind::Type | NodeKind::Interface | NodeKind::Enum) {
            self.push_edge(
                entity_id,
                self.module_id.clone(),
                EdgeKind::DefinesType,
                line_of(node),
                col_of(node),
            );
        }
    }

    fn collect_namespace(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        exported: Exported,
        in_async: bool,
    ) {
        let Some(name) = field_text(node, "name", self.source) else { return };
        let entity_id =
            self.push_symbol(node, &name, NodeKind::Namespace, scope, parent_id, exported, "");
        if let Some(body) = node.child_by_field_name("body") {
            let mut inner = scope.to_vec();
            inner.push(name);
            self.walk(body, &inner, &entity_id, in_async);
        }
    }

    fn collect_variables(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        exported: Exported,
        in_async: bool,
    ) {
        // Only module- and namespace-level bindings become graph nodes;
        // function locals stay out of the graph but their initializers
        // still yield effects.
        let module_level = parent_id == self.module_id || self.is_namespace(parent_id);
        if !module_level {
            self.walk(node, scope, parent_id, in_async);
            return;
        }

        let is_const = node_text(node, self.source).starts_with("const");
        let mut cursor = node.walk();
        for decl in node.children(&mut cursor) {
            if decl.kind() != "variable_declarator" {
                continue;
            }
            let Some(name) = field_text(decl, "name", self.source) else { continue };
            let value = decl.child_by_field_name("value");
            let value_kind = value.map(|v| v.kind()).unwrap_or("");

            let kind = match value_kind {
                "arrow_function" | "function_expression" | "function" => {
                    if name.starts_with("use")
                        && name.chars().nth(3).map(char::is_uppercase).unwrap_or(false)
                    {
                        NodeKind::Hook
                    } else {
                        NodeKind::Function
                    }
                }
                _ if is_const => NodeKind::Constant,
                _ => NodeKind::Variable,
            };

            let sig = value
                .and_then(|v| v.child_by_field_name("parameters"))
                .map(|p| node_text(p, self.source).to_string())
                .or_else(|| field_text(decl, "type", self.source))
                .unwrap_or_default();

            let entity_id =
                self.push_symbol(decl, &name, kind, scope, parent_id, exported, &sig);

            if let Some(value) = value {
                let is_async = has_keyword_child(value, "async");
                let mut inner = scope.to_vec();
                inner.push(name);
                self.walk(value, &inner, &entity_id, is_async || in_async);
            }
        }
    }

    fn collect_method(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        _in_async: bool,
    ) {
        let Some(name) = field_text(node, "name", self.source) else { return };
        let params = field_text(node, "parameters", self.source).unwrap_or_default();
        let entity_id =
            self.push_symbol(node, &name, NodeKind::Method, scope, parent_id, Exported::no(), &params);

        let is_async = has_keyword_child(node, "async");
        if let Some(body) = node.child_by_field_name("body") {
            let mut inner = scope.to_vec();
            inner.push(name);
            self.walk(body, &inner, &entity_id, is_async);
        }
    }

    // -- exports ------------------------------------------------------------

    fn collect_export(
        &mut self,
        node: tree_sitter::Node<'_>,
        scope: &[String],
        parent_id: &str,
        in_async: bool,
    ) {
        // Re-export: `export ... from "m"`.
        if let Some(source_node) = node.child_by_field_name("source") {
            let specifier = strip_quotes(node_text(source_node, self.source));
            self.collect_reexport(node, &specifier);
            return;
        }

        let is_default = has_keyword_child(node, "default");
        let exported = Exported { is_exported: true, is_default };

        let mut cursor = node.walk();
        for inner in node.children(&mut cursor) {
            match inner.kind() {
                "export_clause" => {
                    // `export { a, b as c }` without a source: flags
                    // already-collected local symbols.
                    let mut names = Vec::new();
                    collect_export_specifiers(inner, self.source, &mut names);
                    for (name, _alias) in names {
                        for n in &mut self.out.nodes {
                            if n.name == name {
                                n.is_exported = true;
                                n.visibility = Visibility::Public;
                            }
                        }
                    }
                }
                "function_declaration"
                | "generator_function_declaration"
                | "class_declaration"
                | "abstract_class_declaration"
                | "interface_declaration"
                | "type_alias_declaration"
                | "enum_declaration"
                | "internal_module"
                | "lexical_declaration"
                | "variable_declaration" => {
                    self.visit(inner, scope, parent_id, exported, in_async);
                }
                _ => {}
            }
        }
    }

    fn collect_reexport(&mut self, node: tree_sitter::Node<'_>, specifier: &str) {
        let mut names: Vec<(String, Option<String>)> = Vec::new();
        let mut cursor = node.walk();
        let mut star = false;
        for inner in node.children(&mut cursor) {
            match inner.kind() {
                "export_clause" => collect_export_specifiers(inner, self.source, &mut names),
                "namespace_export" => {
                    // `export * as ns from "m"`
                    star = true;
                    if let Some(alias) = inner.named_child(0) {
                        names.push(("*".into(), Some(node_text(alias, self.source).to_string())));
                    }
                }
                "*" => star = true,
                _ => {}
            }
        }
        if star && names.is_empty() {
            names.push(("*".into(), None));
        }

        for (name, alias) in names {
            let style = if name == "*" { ImportStyle::Namespace } else { ImportStyle::Named };
            self.push_ref(node, specifier, &name, alias, style, false, true);
        }
    }

    // -- imports ------------------------------------------------------------

    fn collect_import(&mut self, node: tree_sitter::Node<'_>) {
        let Some(source_node) = node.child_by_field_name("source") else { return };
        let specifier = strip_quotes(node_text(source_node, self.source));
        let type_only = node
            .children(&mut node.walk())
            .any(|c| c.kind() == "type" || node_text(c, self.source) == "type");

        let mut found_clause = false;
        let mut cursor = node.walk();
        for clause in node.children(&mut cursor) {
            if clause.kind() != "import_clause" {
                continue;
            }
            found_clause = true;
            let mut inner = clause.walk();
            for item in clause.children(&mut inner) {
                match item.kind() {
                    "identifier" => {
                        // `import Foo from "m"`
                        let local = node_text(item, self.source).to_string();
                        self.imported_bindings.push(local.clone());
                        self.push_ref(
                            node,
                            &specifier,
                            "default",
                            Some(local),
                            ImportStyle::Default,
                            type_only,
                            false,
                        );
                    }
                    "namespace_import" => {
                        // `import * as ns from "m"`
                        let local = item
                            .named_child(0)
                            .map(|n| node_text(n, self.source).to_string())
                            .unwrap_or_default();
                        if !local.is_empty() {
                            self.imported_bindings.push(local.clone());
                        }
                        self.push_ref(
                            node,
                            &specifier,
                            "*",
                            Some(local).filter(|l| !l.is_empty()),
                            ImportStyle::Namespace,
                            type_only,
                            false,
                        );
                    }
                    "named_imports" => {
                        let mut specs = item.walk();
                        for spec in item.children(&mut specs) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let Some(name) = field_text(spec, "name", self.source) else {
                                continue;
                            };
                            let alias = field_text(spec, "alias", self.source);
                            let spec_type_only = type_only
                                || spec
                                    .children(&mut spec.walk())
                                    .any(|c| node_text(c, self.source) == "type");
                            let local = alias.clone().unwrap_or_else(|| name.clone());
                            self.imported_bindings.push(local);
                            self.push_ref(
                                node,
                                &specifier,
                                &name,
                                alias,
                                ImportStyle::Named,
                                spec_type_only,
                                false,
                            );
                        }
                    }
                    _ => {}
                }
            }
        }

        if !found_clause {
            // `import "m"`
            self.push_ref(node, &specifier, "", None, ImportStyle::SideEffect, false, false);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_ref(
        &mut self,
        node: tree_sitter::Node<'_>,
        specifier: &str,
        imported: &str,
        alias: Option<String>,
        style: ImportStyle,
        type_only: bool,
        reexport: bool,
    ) {
        self.out.external_refs.push(ExternalRef {
            source_entity_id: self.module_id.clone(),
            module_specifier: specifier.to_string(),
            imported_symbol: imported.to_string(),
            local_alias: alias,
            import_style: style,
            is_type_only: type_only,
            is_reexport: reexport,
            is_resolved: false,
            target_entity_id: None,
            file_path: self.ctx.file_path.to_string(),
            start_line: line_of(node),
            start_column: col_of(node),
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
        });
    }

    // -- effects ------------------------------------------------------------

    fn collect_effect(&mut self, node: tree_sitter::Node<'_>, parent_id: &str, in_async: bool) {
        let is_constructor = node.kind() == "new_expression";
        let callee_field = if is_constructor { "constructor" } else { "function" };
        let Some(callee_node) = node.child_by_field_name(callee_field) else { return };

        let callee = node_text(callee_node, self.source).replace("?.", ".");
        // Computed, chained-call, or multi-line callees aren't stable
        // identifiers.
        if callee.is_empty() || callee.contains('\n') || callee.contains('[') || callee.contains('(')
        {
            return;
        }

        let root = callee.split('.').next().unwrap_or(&callee);
        let is_external = self.imported_bindings.iter().any(|b| b == root);
        let awaited = node.parent().map(|p| p.kind() == "await_expression").unwrap_or(false);
        let line = line_of(node);

        self.out.effects.push(CodeEffect {
            effect_id: compute_effect_id(parent_id, "FunctionCall", &callee, line),
            effect_type: "FunctionCall".into(),
            source_entity_id: parent_id.to_string(),
            file_path: self.ctx.file_path.to_string(),
            start_line: line,
            callee_name: callee.clone(),
            is_external,
            is_async: awaited || in_async,
            is_constructor,
            branch: self.ctx.branch.to_string(),
            is_deleted: false,
            updated_at: self.ctx.updated_at,
            properties: None,
        });

        if !callee.contains('.') && !is_constructor {
            self.pending_calls.push((parent_id.to_string(), callee, line));
        }
    }
}

/// Export flags carried down through `export_statement` unwrapping.
#[derive(Clone, Copy)]
struct Exported {
    is_exported: bool,
    is_default: bool,
}

impl Exported {
    fn no() -> Self {
        Self { is_exported: false, is_default: false }
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

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c: char| c == '\'' || c == '"' || c == '`').to_string()
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or("").to_string()
}

fn has_keyword_child(node: tree_sitter::Node<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == keyword);
    found
}

/// TS accessibility modifier on class members.
fn accessibility(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<Visibility> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "accessibility_modifier" {
            return Some(match node_text(child, source) {
                "public" => Visibility::Public,
                "protected" => Visibility::Protected,
                _ => Visibility::Private,
            });
        }
    }
    None
}

/// `(params) => ret` for function-like nodes.
fn type_signature(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let params = field_text(node, "parameters", source)?;
    let ret = field_text(node, "return_type", source)
        .map(|r| r.trim_start_matches(':').trim().to_string());
    Some(match ret {
        Some(ret) => format!("{params} => {ret}"),
        None => params,
    })
}

/// `extends X` / `implements Y, Z` targets with their edge kinds.
fn heritage_clauses(node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<(String, EdgeKind)> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_heritage" => {
                let mut inner = child.walk();
                for clause in child.children(&mut inner) {
                    let kind = match clause.kind() {
                        "extends_clause" => EdgeKind::Extends,
                        "implements_clause" => EdgeKind::Implements,
                        _ => continue,
                    };
                    let mut names = clause.walk();
                    for name in clause.children(&mut names) {
                        if matches!(name.kind(), "identifier" | "type_identifier" | "member_expression") {
                            out.push((node_text(name, source).to_string(), kind));
                        }
                    }
                }
            }
            "extends_type_clause" => {
                let mut names = child.walk();
                for name in child.children(&mut names) {
                    if matches!(name.kind(), "type_identifier" | "identifier") {
                        out.push((node_text(name, source).to_string(), EdgeKind::Extends));
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Decorator names preceding a class or method, without the `@`.
fn decorators(node: tree_sitter::Node<'_>, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "decorator" {
            out.push(node_text(child, source).trim_start_matches('@').to_string());
        }
    }
    // Decorators can also precede the declaration as siblings.
    let mut prev = node.prev_sibling();
    while let Some(p) = prev {
        if p.kind() == "decorator" {
            out.insert(0, node_text(p, source).trim_start_matches('@').to_string());
            prev = p.prev_sibling();
        } else {
            break;
        }
    }
    out
}

/// JSDoc comment immediately preceding a node.
fn extract_jsdoc(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let prev = node.prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = node_text(prev, source).trim();
    if !text.starts_with("/**") {
        return None;
    }
    let stripped = text
        .strip_prefix("/**")
        .unwrap_or(text)
        .strip_suffix("*/")
        .unwrap_or(text)
        .trim();
    let cleaned: Vec<&str> = stripped
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("* ")
                .or_else(|| trimmed.strip_prefix('*'))
                .unwrap_or(trimmed)
        })
        .collect();
    let result = cleaned.join("\n").trim().to_string();
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Collect `(name, alias)` pairs from an `export_clause`.
fn collect_export_specifiers(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    out: &mut Vec<(String, Option<String>)>,
) {
    let mut cursor = node.walk();
    for spec in node.children(&mut cursor) {
        if spec.kind() != "export_specifier" {
            continue;
        }
        let Some(name) = field_text(spec, "name", source) else { continue };
        let alias = field_text(spec, "alias", source);
        out.push((name, alias));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> FileParse {
        parse_named("main.ts", src)
    }

    fn parse_named(file: &str, src: &str) -> FileParse {
        let ctx = ParseContext {
            repo: "web",
            package: "pkg",
            branch: "base",
            file_path: file,
            source_file_hash: "deadbeef",
            updated_at: 1,
        };
        TypeScriptParser::typescript()
            .parse_file(&ctx, src)
            .expect("parse should succeed")
    }

    fn find<'a>(batch: &'a FileParse, name: &str) -> &'a Node {
        batch
            .nodes
            .iter()
            .find(|n| n.name == name)
            .unwrap_or_else(|| panic!("no node named {name}"))
    }

    #[test]
    fn test_exported_function() {
        let batch = parse("export function greet(name: string): string {\n  return name;\n}\n");
        let greet = find(&batch, "greet");
        assert_eq!(greet.kind, NodeKind::Function);
        assert!(greet.is_exported);
        assert!(!greet.is_default_export);
        assert_eq!(greet.span.start_line, 1);
        assert_eq!(greet.span.end_line, 3);
        assert_eq!(greet.qualified_name, "main.greet");
    }

    #[test]
    fn test_default_export() {
        let batch = parse("export default function handler() {}\n");
        let handler = find(&batch, "handler");
        assert!(handler.is_exported);
        assert!(handler.is_default_export);
    }

    #[test]
    fn test_class_with_methods_and_contains_edges() {
        let batch = parse(
            "export class UserService {\n  private db: any;\n  getUser(id: string) { return this.db.find(id); }\n}\n",
        );
        let class = find(&batch, "UserService");
        assert_eq!(class.kind, NodeKind::Class);
        let method = find(&batch, "getUser");
        assert_eq!(method.kind, NodeKind::Method);

        let contains: Vec<&Edge> = batch
            .edges
            .iter()
            .filter(|e| e.edge_type == EdgeKind::Contains)
            .collect();
        assert!(contains
            .iter()
            .any(|e| e.source_entity_id == class.entity_id && e.target_entity_id == method.entity_id));
    }

    #[test]
    fn test_extends_edge_resolved_locally() {
        let batch = parse("class Base {}\nclass Derived extends Base {}\n");
        let base = find(&batch, "Base");
        let derived = find(&batch, "Derived");
        assert!(batch.edges.iter().any(|e| e.edge_type == EdgeKind::Extends
            && e.source_entity_id == derived.entity_id
            && e.target_entity_id == base.entity_id));
    }

    #[test]
    fn test_named_imports() {
        let batch = parse("import { helper, other as alias } from \"./utils\";\n");
        assert_eq!(batch.external_refs.len(), 2);
        let helper = &batch.external_refs[0];
        assert_eq!(helper.module_specifier, "./utils");
        assert_eq!(helper.imported_symbol, "helper");
        assert_eq!(helper.import_style, ImportStyle::Named);
        assert!(!helper.is_resolved);
        let aliased = &batch.external_refs[1];
        assert_eq!(aliased.imported_symbol, "other");
        assert_eq!(aliased.local_alias.as_deref(), Some("alias"));
    }

    #[test]
    fn test_default_namespace_and_side_effect_imports() {
        let batch = parse(
            "import stripe from \"stripe\";\nimport * as fs from \"fs\";\nimport \"./polyfill\";\n",
        );
        let styles: Vec<ImportStyle> =
            batch.external_refs.iter().map(|r| r.import_style).collect();
        assert_eq!(
            styles,
            vec![ImportStyle::Default, ImportStyle::Namespace, ImportStyle::SideEffect]
        );
        assert_eq!(batch.external_refs[1].imported_symbol, "*");
        assert_eq!(batch.external_refs[1].local_alias.as_deref(), Some("fs"));
    }

    #[test]
    fn test_type_only_import() {
        let batch = parse("import type { Config } from \"./config\";\n");
        assert!(batch.external_refs[0].is_type_only);
    }

    #[test]
    fn test_reexports() {
        let batch = parse("export * from \"./m\";\nexport { x as y } from \"./m\";\n");
        assert_eq!(batch.external_refs.len(), 2);
        assert!(batch.external_refs.iter().all(|r| r.is_reexport));
        assert_eq!(batch.external_refs[0].imported_symbol, "*");
        assert_eq!(batch.external_refs[1].imported_symbol, "x");
        assert_eq!(batch.external_refs[1].local_alias.as_deref(), Some("y"));
    }

    #[test]
    fn test_call_effect_external_callee() {
        let batch = parse(
            "import stripe from \"stripe\";\nexport async function charge() {\n  await stripe.charges.create({});\n}\n",
        );
        let effect = batch
            .effects
            .iter()
            .find(|e| e.callee_name == "stripe.charges.create")
            .expect("effect");
        assert_eq!(effect.effect_type, "FunctionCall");
        assert!(effect.is_external);
        assert!(effect.is_async);
        assert!(!effect.is_constructor);
        assert_eq!(effect.start_line, 3);
    }

    #[test]
    fn test_new_expression_is_constructor_effect() {
        let batch = parse("function make() { return new Map(); }\n");
        let effect = batch
            .effects
            .iter()
            .find(|e| e.callee_name == "Map")
            .expect("effect");
        assert!(effect.is_constructor);
        assert!(!effect.is_external);
    }

    #[test]
    fn test_local_call_edge() {
        let batch = parse("function a() { b(); }\nfunction b() {}\n");
        let a = find(&batch, "a");
        let b = find(&batch, "b");
        assert!(batch.edges.iter().any(|e| e.edge_type == EdgeKind::Calls
            && e.source_entity_id == a.entity_id
            && e.target_entity_id == b.entity_id));
    }

    #[test]
    fn test_arrow_function_and_const() {
        let batch = parse(
            "export const add = (a: number, b: number) => a + b;\nexport const MAX_RETRIES = 3;\n",
        );
        assert_eq!(find(&batch, "add").kind, NodeKind::Function);
        assert_eq!(find(&batch, "MAX_RETRIES").kind, NodeKind::Constant);
        assert!(find(&batch, "MAX_RETRIES").is_exported);
    }

    #[test]
    fn test_hook_kind() {
        let batch = parse("export function useTheme() { return null; }\n");
        assert_eq!(find(&batch, "useTheme").kind, NodeKind::Hook);
    }

    #[test]
    fn test_interface_and_type_alias() {
        let batch = parse("interface User { id: string }\ntype Id = string;\n");
        assert_eq!(find(&batch, "User").kind, NodeKind::Interface);
        assert_eq!(find(&batch, "Id").kind, NodeKind::Type);
    }

    #[test]
    fn test_jsdoc_extraction() {
        let batch = parse("/** Greets a user. */\nexport function greet() {}\n");
        assert_eq!(find(&batch, "greet").documentation.as_deref(), Some("Greets a user."));
    }

    #[test]
    fn test_entity_id_stable_across_reformat() {
        let compact = parse("export function f(a: number) { return a; }\n");
        let spread = parse("\n\nexport function f(a: number) {\n    return a;\n}\n");
        assert_eq!(
            find(&compact, "f").entity_id,
            find(&spread, "f").entity_id,
            "whitespace must not perturb entity ids"
        );
    }

    #[test]
    fn test_entity_id_changes_on_signature_change() {
        let before = parse("export function f(a: number) {}\n");
        let after = parse("export function f(a: string) {}\n");
        assert_ne!(find(&before, "f").entity_id, find(&after, "f").entity_id);
    }

    #[test]
    fn test_module_node_always_present() {
        let batch = parse("");
        assert_eq!(batch.nodes.len(), 1);
        assert_eq!(batch.nodes[0].kind, NodeKind::Module);
        assert_eq!(batch.nodes[0].qualified_name, "main");
    }

    #[test]
    fn test_determinism() {
        let src = "import { a } from \"./a\";\nexport class C { m() { a(); } }\n";
        let one = parse(src);
        let two = parse(src);
        let ids = |b: &FileParse| b.nodes.iter().map(|n| n.entity_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&one), ids(&two));
        assert_eq!(one.effects.len(), two.effects.len());
    }
}
