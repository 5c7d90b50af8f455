//! Parsing subsystem: the parser contract plus reference drivers.
//!
//! A parser for a language is a pure function
//! `source -> (nodes, edges, external_refs, effects)`; the same input
//! must yield the same output. Each driver maps tree-sitter AST nodes to
//! graph rows with stable entity ids computed via `identity`.
//!
//! The graph builder looks drivers up by file extension in the
//! `registry` and skips files no driver claims.

pub mod languages;
pub mod registry;

use crate::error::DevacResult;
use crate::types::{CodeEffect, Edge, ExternalRef, Node};

/// Languages with a registered driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// TypeScript (.ts, .tsx).
    TypeScript,
    /// JavaScript (.js, .jsx, .mjs, .cjs).
    JavaScript,
    /// Python (.py).
    Python,
    /// Unknown / unsupported.
    Unknown,
}

impl Language {
    /// Detect language from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "py" => Self::Python,
            _ => Self::Unknown,
        }
    }

    /// Detect language from a file path.
    pub fn from_path(path: &str) -> Self {
        path.rsplit_once('.')
            .map(|(_, ext)| Self::from_extension(ext))
            .unwrap_or(Self::Unknown)
    }

    /// Returns the language identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file context a driver needs to mint rows: identity scope, branch,
/// and the write-batch facts that land on every row.
#[derive(Debug, Clone)]
pub struct ParseContext<'a> {
    /// Repository id.
    pub repo: &'a str,
    /// Package path within the repo.
    pub package: &'a str,
    /// Seed partition being built.
    pub branch: &'a str,
    /// File path relative to the package root.
    pub file_path: &'a str,
    /// Content hash of the file being parsed.
    pub source_file_hash: &'a str,
    /// Epoch milliseconds of the enclosing build.
    pub updated_at: i64,
}

/// Output of parsing one file.
#[derive(Debug, Clone, Default)]
pub struct FileParse {
    /// Symbols found in the file.
    pub nodes: Vec<Node>,
    /// Relations found in the file.
    pub edges: Vec<Edge>,
    /// Import sites found in the file.
    pub external_refs: Vec<ExternalRef>,
    /// Code effects found in the file.
    pub effects: Vec<CodeEffect>,
}

impl FileParse {
    /// Total row count across collections.
    pub fn row_count(&self) -> usize {
        self.nodes.len() + self.edges.len() + self.external_refs.len() + self.effects.len()
    }
}

/// Trait each language driver implements.
pub trait LanguageParser: Send + Sync {
    /// The language this driver handles.
    fn language(&self) -> Language;

    /// Parse one file into graph rows. Must be deterministic.
    fn parse_file(&self, ctx: &ParseContext<'_>, content: &str) -> DevacResult<FileParse>;
}

/// Parse a file by looking up the driver for its extension.
pub fn parse_file(ctx: &ParseContext<'_>, content: &str) -> DevacResult<Option<FileParse>> {
    let language = Language::from_path(ctx.file_path);
    match registry::global_registry().get(language) {
        Some(driver) => driver.parse_file(ctx, content).map(Some),
        None => Ok(None),
    }
}

/// Build a dotted module name from a package-relative file path
/// (`src/auth/token.ts` -> `src.auth.token`).
pub(crate) fn module_name_from_path(file_path: &str) -> String {
    let without_ext = file_path.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file_path);
    without_ext.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("mjs"), Language::JavaScript);
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("rs"), Language::Unknown);
    }

    #[test]
    fn test_module_name_from_path() {
        assert_eq!(module_name_from_path("src/auth/token.ts"), "src.auth.token");
        assert_eq!(module_name_from_path("utils.py"), "utils");
    }

    #[test]
    fn test_parse_file_skips_unknown_extension() {
        let ctx = ParseContext {
            repo: "r",
            package: "p",
            branch: "base",
            file_path: "notes.txt",
            source_file_hash: "abc",
            updated_at: 0,
        };
        let result = parse_file(&ctx, "hello").expect("parse");
        assert!(result.is_none());
    }
}
