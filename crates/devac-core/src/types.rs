//! Core domain types shared across all devac-core subsystems.
//!
//! These types form the API contract between modules and map 1:1 onto the
//! columnar schemas in `schema`. Changing them requires updating all
//! consumers, so they should be stable and minimal.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Branch partitions
// ---------------------------------------------------------------------------

/// Name of the mainline seed partition.
pub const BASE_BRANCH: &str = "base";

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The kind of symbol a node represents. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Free function.
    Function,
    /// Method on a class or object.
    Method,
    /// Class, struct, or record.
    Class,
    /// Interface or protocol.
    Interface,
    /// Type alias.
    Type,
    /// Enumeration.
    Enum,
    /// Namespace declaration.
    Namespace,
    /// Module (usually a file).
    Module,
    /// Mutable binding.
    Variable,
    /// Immutable binding.
    Constant,
    /// React-style hook function.
    Hook,
    /// Raw HTML element.
    HtmlElement,
    /// JSX component.
    JsxComponent,
    /// Storybook story.
    Story,
    /// Storybook meta block.
    Meta,
}

impl NodeKind {
    /// Convert to the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Enum => "enum",
            Self::Namespace => "namespace",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Hook => "hook",
            Self::HtmlElement => "html_element",
            Self::JsxComponent => "jsx_component",
            Self::Story => "story",
            Self::Meta => "meta",
        }
    }

    /// Parse from the persisted string form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "type" => Self::Type,
            "enum" => Self::Enum,
            "namespace" => Self::Namespace,
            "variable" => Self::Variable,
            "constant" => Self::Constant,
            "hook" => Self::Hook,
            "html_element" => Self::HtmlElement,
            "jsx_component" => Self::JsxComponent,
            "story" => Self::Story,
            "meta" => Self::Meta,
            _ => Self::Module,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of a code symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Accessible from outside the declaring scope.
    Public,
    /// Accessible from the declaring class and subclasses.
    Protected,
    /// Accessible only within the declaring scope.
    Private,
}

impl Visibility {
    /// Convert to the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }

    /// Parse from the persisted string form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            "protected" => Self::Protected,
            _ => Self::Private,
        }
    }
}

/// Source span of a symbol or relation. Lines and columns are 1-indexed
/// lines / 0-indexed columns, matching tree-sitter positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// First line of the construct.
    pub start_line: u32,
    /// Last line of the construct (inclusive).
    pub end_line: u32,
    /// Column of the first character.
    pub start_column: u32,
    /// Column past the last character.
    pub end_column: u32,
}

/// A symbol in the code graph.
///
/// `(entity_id, branch)` is unique within a package. Equal entity ids
/// across branches are the same logical entity in different views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable entity id: `{repo}:{package}:{kind}:{hash8}`.
    pub entity_id: String,
    /// Short name (last path component of `qualified_name`).
    pub name: String,
    /// Fully qualified name within the package.
    pub qualified_name: String,
    /// Symbol kind.
    pub kind: NodeKind,
    /// Path relative to the package root.
    pub file_path: String,
    /// Source span.
    pub span: Span,
    /// Content hash of the file this symbol was parsed from.
    pub source_file_hash: String,
    /// Seed partition this row belongs to.
    pub branch: String,
    /// Tombstone flag: true once the symbol left the source.
    pub is_deleted: bool,
    /// Epoch milliseconds of the write that produced this row.
    pub updated_at: i64,

    /// Whether the symbol is exported from its module.
    pub is_exported: bool,
    /// Whether it is the module's default export.
    pub is_default_export: bool,
    /// Declared or conventional visibility.
    pub visibility: Visibility,
    /// Async function/method.
    pub is_async: bool,
    /// Generator function.
    pub is_generator: bool,
    /// Static member.
    pub is_static: bool,
    /// Abstract member or class.
    pub is_abstract: bool,
    /// Rendered type signature, if the parser produced one.
    pub type_signature: Option<String>,
    /// Leading doc comment.
    pub documentation: Option<String>,
    /// Decorator names in source order.
    pub decorators: Vec<String>,
    /// Type parameter list as written.
    pub type_parameters: Option<String>,
    /// Language-specific facts as a JSON bag. Kept off hot paths.
    pub properties: Option<serde_json::Value>,
}

impl Node {
    /// Dedup key within the unified view.
    pub fn dedup_key(&self) -> &str {
        &self.entity_id
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// The kind of relation an edge represents. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Source calls target.
    Calls,
    /// Source lexically contains target.
    Contains,
    /// Source extends/inherits target.
    Extends,
    /// Source implements target.
    Implements,
    /// Source references target (non-call use).
    References,
    /// Source imports target.
    Imports,
    /// Source exports target.
    Exports,
    /// Source defines target as a type.
    DefinesType,
}

impl EdgeKind {
    /// Convert to the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "CALLS",
            Self::Contains => "CONTAINS",
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::References => "REFERENCES",
            Self::Imports => "IMPORTS",
            Self::Exports => "EXPORTS",
            Self::DefinesType => "DEFINES_TYPE",
        }
    }

    /// Parse from the persisted string form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "CALLS" => Self::Calls,
            "CONTAINS" => Self::Contains,
            "EXTENDS" => Self::Extends,
            "IMPLEMENTS" => Self::Implements,
            "IMPORTS" => Self::Imports,
            "EXPORTS" => Self::Exports,
            "DEFINES_TYPE" => Self::DefinesType,
            _ => Self::References,
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed relation between two nodes, identified by
/// `(source, target, edge_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Entity id of the source node.
    pub source_entity_id: String,
    /// Entity id of the target node.
    pub target_entity_id: String,
    /// Relation kind.
    pub edge_type: EdgeKind,
    /// File where the relation appears.
    pub file_path: String,
    /// Line where the relation appears.
    pub start_line: u32,
    /// Column where the relation appears.
    pub start_column: u32,
    /// Seed partition.
    pub branch: String,
    /// Tombstone flag.
    pub is_deleted: bool,
    /// Epoch milliseconds of the write.
    pub updated_at: i64,
    /// Kind-specific attributes (e.g. ARIA relation metadata on
    /// `REFERENCES` edges).
    pub properties: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// External refs
// ---------------------------------------------------------------------------

/// How a symbol was imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStyle {
    /// `import { x } from "m"`.
    Named,
    /// `import x from "m"`.
    Default,
    /// `import * as x from "m"`.
    Namespace,
    /// `import "m"`.
    SideEffect,
}

impl ImportStyle {
    /// Convert to the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Named => "named",
            Self::Default => "default",
            Self::Namespace => "namespace",
            Self::SideEffect => "side_effect",
        }
    }

    /// Parse from the persisted string form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "default" => Self::Default,
            "namespace" => Self::Namespace,
            "side_effect" => Self::SideEffect,
            _ => Self::Named,
        }
    }
}

/// An import site whose target may lie outside the current file.
/// Identified by `(source_entity_id, module_specifier, imported_symbol)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRef {
    /// Entity id of the importing symbol (usually the file's module node).
    pub source_entity_id: String,
    /// The module specifier as written (`"./utils"`, `"stripe"`).
    pub module_specifier: String,
    /// The symbol name being imported (`"*"` for namespace imports).
    pub imported_symbol: String,
    /// Local alias, when renamed at the import site.
    pub local_alias: Option<String>,
    /// Import form.
    pub import_style: ImportStyle,
    /// Type-only import (`import type`).
    pub is_type_only: bool,
    /// Re-export site (`export ... from`).
    pub is_reexport: bool,
    /// Whether the semantic resolver has bound this ref.
    pub is_resolved: bool,
    /// Target entity id once resolved.
    pub target_entity_id: Option<String>,
    /// File where the import appears.
    pub file_path: String,
    /// Line of the import statement.
    pub start_line: u32,
    /// Column of the import statement.
    pub start_column: u32,
    /// Seed partition.
    pub branch: String,
    /// Tombstone flag.
    pub is_deleted: bool,
    /// Epoch milliseconds of the write.
    pub updated_at: i64,
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// A language-level observation emitted by a parser, e.g. a function call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEffect {
    /// Stable effect id (short hash over source entity, type, callee, line).
    pub effect_id: String,
    /// Effect discriminant (e.g. `"FunctionCall"`).
    pub effect_type: String,
    /// Entity id of the enclosing symbol.
    pub source_entity_id: String,
    /// File where the effect appears.
    pub file_path: String,
    /// Line of the effect site.
    pub start_line: u32,
    /// Callee identifier path without call parentheses
    /// (`"stripe.charges.create"`).
    pub callee_name: String,
    /// Whether the callee resolves to an imported/external binding.
    pub is_external: bool,
    /// Whether the call is awaited or the enclosing function is async.
    pub is_async: bool,
    /// Whether the site is a `new` expression.
    pub is_constructor: bool,
    /// Seed partition.
    pub branch: String,
    /// Tombstone flag.
    pub is_deleted: bool,
    /// Epoch milliseconds of the write.
    pub updated_at: i64,
    /// Effect-specific attributes.
    pub properties: Option<serde_json::Value>,
}

/// The rule-engine-enriched form of a code effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEffect {
    /// Id of the code effect this was derived from.
    pub source_effect_id: String,
    /// Domain classification (e.g. `"Database"`).
    pub domain: String,
    /// Action within the domain (e.g. `"Write"`).
    pub action: String,
    /// Id of the rule that matched.
    pub rule_id: String,
    /// Name of the rule that matched.
    pub rule_name: String,
    /// `effect_type` of the source effect.
    pub original_effect_type: String,
    /// Entity id of the enclosing symbol.
    pub source_entity_id: String,
    /// File of the effect site.
    pub file_path: String,
    /// Line of the effect site.
    pub start_line: u32,
    /// Rule metadata merged with the effect's callee/external/async facts.
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Hub records
// ---------------------------------------------------------------------------

/// Lifecycle status of a registered repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    /// Seeds are current with respect to the last reported manifest.
    Active,
    /// A sync failed after its seeds were written; registry data lags.
    Stale,
}

impl RepoStatus {
    /// Convert to the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stale => "stale",
        }
    }

    /// Parse from the persisted string form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "stale" => Self::Stale,
            _ => Self::Active,
        }
    }
}

/// A repository registered with the central hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRegistration {
    /// Unique repo id.
    pub repo_id: String,
    /// Local filesystem path to the repo root.
    pub local_path: PathBuf,
    /// Manifest hash reported by the last sync.
    pub manifest_hash: String,
    /// Epoch milliseconds of the last sync.
    pub last_synced: i64,
    /// Registry status.
    pub status: RepoStatus,
}

/// An edge whose endpoints live in different registered repos.
/// Exists only in the hub; lifetime bounded by both endpoint repos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRepoEdge {
    /// Repo id of the source entity.
    pub source_repo: String,
    /// Entity id of the source.
    pub source_entity_id: String,
    /// Repo id of the target entity.
    pub target_repo: String,
    /// Entity id of the target.
    pub target_entity_id: String,
    /// Relation kind.
    pub edge_type: EdgeKind,
    /// Resolver-provided metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Severity of a unified feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSeverity {
    /// Informational note.
    Note,
    /// Warning.
    Warning,
    /// Error.
    Error,
    /// Critical failure.
    Critical,
}

impl FeedbackSeverity {
    /// Convert to the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
        }
    }

    /// Parse from the persisted string form.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "critical" => Self::Critical,
            "error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Note,
        }
    }
}

/// A validation error or CI failure stored in the hub's unified feedback
/// table. Keyed by `feedback_id` with upsert-on-duplicate semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Unique feedback id.
    pub feedback_id: String,
    /// Repo this feedback belongs to.
    pub repo_id: String,
    /// Producer of the feedback (linter name, CI workflow, ...).
    pub source: String,
    /// File the feedback points at, if any.
    pub file_path: Option<String>,
    /// Line the feedback points at, if any.
    pub line_number: Option<u32>,
    /// Severity level.
    pub severity: FeedbackSeverity,
    /// Free-form category (e.g. `"type-error"`).
    pub category: String,
    /// Short title.
    pub title: String,
    /// Full description.
    pub description: String,
    /// Whether the item has been resolved.
    pub resolved: bool,
    /// Whether the item is actionable by a developer.
    pub actionable: bool,
    /// Epoch milliseconds when first recorded.
    pub created_at: i64,
    /// Epoch milliseconds of the last upsert.
    pub updated_at: i64,
    /// Associated GitHub PR number.
    pub github_pr_number: Option<u32>,
    /// CI workflow name.
    pub workflow_name: Option<String>,
    /// CI run URL.
    pub ci_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_roundtrip() {
        for kind in [
            NodeKind::Function,
            NodeKind::Method,
            NodeKind::Class,
            NodeKind::Interface,
            NodeKind::Type,
            NodeKind::Enum,
            NodeKind::Namespace,
            NodeKind::Module,
            NodeKind::Variable,
            NodeKind::Constant,
            NodeKind::Hook,
            NodeKind::HtmlElement,
            NodeKind::JsxComponent,
            NodeKind::Story,
            NodeKind::Meta,
        ] {
            assert_eq!(NodeKind::from_str_lossy(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_edge_kind_roundtrip() {
        for kind in [
            EdgeKind::Calls,
            EdgeKind::Contains,
            EdgeKind::Extends,
            EdgeKind::Implements,
            EdgeKind::References,
            EdgeKind::Imports,
            EdgeKind::Exports,
            EdgeKind::DefinesType,
        ] {
            assert_eq!(EdgeKind::from_str_lossy(kind.as_str()), kind);
        }
        assert_eq!(EdgeKind::from_str_lossy("whatever"), EdgeKind::References);
    }

    #[test]
    fn test_import_style_serialization() {
        let json = serde_json::to_string(&ImportStyle::SideEffect).expect("serialize");
        assert_eq!(json, "\"side_effect\"");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(FeedbackSeverity::Critical > FeedbackSeverity::Error);
        assert!(FeedbackSeverity::Error > FeedbackSeverity::Warning);
        assert!(FeedbackSeverity::Warning > FeedbackSeverity::Note);
    }
}
