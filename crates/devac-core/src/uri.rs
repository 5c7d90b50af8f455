//! Canonical `devac://` entity URIs and relative references.
//!
//! Grammar:
//!
//! ```text
//! devac://<repo>[/<package>][/<file>][#<symbolPath>][?<query>]
//! symbolPath := ( '#' TypeName | '.' TermName ['(' params ')'] )+
//! query      := version=<v> & line=<n> & col=<n> & endLine=<n> & endCol=<n>
//! package    := "." for the repo root, or a slash-delimited path
//! ```
//!
//! The package/file boundary inside the path is resolved by two rules:
//! a literal `.` segment always splits package (before) from file
//! (after), and absent a marker the file begins at the first segment
//! containing a dot. `format` re-inserts the marker whenever the
//! heuristic alone would mis-split, so parse/format round-trip exactly.
//!
//! Relative forms accepted by [`resolve_ref`]:
//! `#Sym`, `.term()`, `./file#Sym`, `../dir/file#Sym`, and
//! `repo[@version]/pkg/file#Sym`.

use serde::{Deserialize, Serialize};

use crate::error::{DevacError, DevacResult};

const SCHEME: &str = "devac://";

/// Whether a symbol path segment names a type or a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    /// `#TypeName` segment.
    Type,
    /// `.termName` segment, optionally with a parameter list.
    Term,
}

/// One segment of a symbol path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSegment {
    /// Type (`#`) or term (`.`) segment.
    pub kind: SegmentKind,
    /// The segment name.
    pub name: String,
    /// Parameter list text for term segments (`Some("")` for `()`).
    pub params: Option<String>,
}

impl SymbolSegment {
    /// A `#TypeName` segment.
    pub fn type_name(name: impl Into<String>) -> Self {
        Self { kind: SegmentKind::Type, name: name.into(), params: None }
    }

    /// A `.termName(params)` segment.
    pub fn term(name: impl Into<String>, params: Option<&str>) -> Self {
        Self { kind: SegmentKind::Term, name: name.into(), params: params.map(str::to_string) }
    }
}

/// A parsed canonical entity URI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityUri {
    /// Repository id.
    pub repo: String,
    /// Package path, `"."` for the repo root, `None` when the URI stops
    /// at the repo.
    pub package: Option<String>,
    /// File path relative to the package root.
    pub file: Option<String>,
    /// Symbol path within the file.
    pub symbol: Vec<SymbolSegment>,
    /// `version` query parameter.
    pub version: Option<String>,
    /// `line` query parameter.
    pub line: Option<u32>,
    /// `col` query parameter.
    pub col: Option<u32>,
    /// `endLine` query parameter.
    pub end_line: Option<u32>,
    /// `endCol` query parameter.
    pub end_col: Option<u32>,
}

/// The context a relative reference is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UriContext {
    /// Repository id.
    pub repo: String,
    /// Version of the context, if pinned.
    pub version: Option<String>,
    /// Package path (`"."` for repo root).
    pub package: String,
    /// File the reference appears in, relative to the package root.
    pub file: Option<String>,
}

fn parse_err(input: &str, detail: impl Into<String>) -> DevacError {
    DevacError::UriParse { input: input.to_string(), detail: detail.into() }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a canonical `devac://` URI.
pub fn parse_uri(input: &str) -> DevacResult<EntityUri> {
    let rest = input
        .strip_prefix(SCHEME)
        .ok_or_else(|| parse_err(input, "missing devac:// scheme"))?;

    // Query comes after the fragment in this grammar, so split it first.
    let (rest, query) = match rest.split_once('?') {
        Some((r, q)) => (r, Some(q)),
        None => (rest, None),
    };

    // Everything from the first '#' on is the symbol path.
    let (path, fragment) = match rest.find('#') {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };

    if path.is_empty() {
        return Err(parse_err(input, "empty repo"));
    }

    let mut segments = path.split('/');
    let repo = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| parse_err(input, "empty repo"))?
        .to_string();
    let tail: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();

    let (package, file) = split_package_file(&tail);

    let mut uri = EntityUri { repo, package, file, ..EntityUri::default() };

    if let Some(fragment) = fragment {
        uri.symbol = parse_symbol_path(input, fragment)?;
    }

    if let Some(query) = query {
        parse_query(input, query, &mut uri)?;
    }

    Ok(uri)
}

/// Split path segments after the repo into (package, file).
fn split_package_file(tail: &[&str]) -> (Option<String>, Option<String>) {
    if tail.is_empty() {
        return (None, None);
    }

    // A literal "." segment is an explicit package/file boundary.
    if let Some(marker) = tail.iter().position(|s| *s == ".") {
        let package = if marker == 0 { ".".to_string() } else { tail[..marker].join("/") };
        let file = if marker + 1 < tail.len() { Some(tail[marker + 1..].join("/")) } else { None };
        return (Some(package), file);
    }

    // Otherwise the file begins at the first dotted segment.
    match tail.iter().position(|s| s.contains('.')) {
        Some(0) => (Some(".".to_string()), Some(tail.join("/"))),
        Some(idx) => (Some(tail[..idx].join("/")), Some(tail[idx..].join("/"))),
        None => (Some(tail.join("/")), None),
    }
}

/// Parse a symbol path. `fragment` is the text after the URI's `#`
/// delimiter, so a leading name is a type segment and a leading `.`
/// introduces a term segment.
fn parse_symbol_path(input: &str, fragment: &str) -> DevacResult<Vec<SymbolSegment>> {
    if fragment.is_empty() {
        return Err(parse_err(input, "empty symbol path"));
    }

    let mut segments = Vec::new();
    let chars: Vec<char> = fragment.chars().collect();
    let mut i = 0;
    // The URI's '#' delimiter doubles as the first segment's separator.
    let mut kind = SegmentKind::Type;

    while i < chars.len() {
        match chars[i] {
            '#' => {
                kind = SegmentKind::Type;
                i += 1;
            }
            '.' => {
                kind = SegmentKind::Term;
                i += 1;
            }
            _ if segments.is_empty() && i == 0 => {
                // leading name after the fragment delimiter: type segment
            }
            c => {
                return Err(parse_err(input, format!("unexpected {c:?} in symbol path")));
            }
        }

        let start = i;
        while i < chars.len() && !matches!(chars[i], '#' | '.' | '(') {
            i += 1;
        }
        if start == i {
            return Err(parse_err(input, "empty symbol segment name"));
        }
        let name: String = chars[start..i].iter().collect();

        let mut params = None;
        if i < chars.len() && chars[i] == '(' {
            if kind == SegmentKind::Type {
                return Err(parse_err(input, "type segments take no parameter list"));
            }
            let close = fragment[i..]
                .find(')')
                .map(|off| i + off)
                .ok_or_else(|| parse_err(input, "unterminated parameter list"))?;
            params = Some(chars[i + 1..close].iter().collect::<String>());
            i = close + 1;
        }

        segments.push(SymbolSegment { kind, name, params });
    }

    Ok(segments)
}

/// Parse the query string into the URI's fixed parameter set.
fn parse_query(input: &str, query: &str, uri: &mut EntityUri) -> DevacResult<()> {
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| parse_err(input, format!("malformed query pair {pair:?}")))?;
        match key {
            "version" => uri.version = Some(value.to_string()),
            "line" => uri.line = Some(parse_num(input, key, value)?),
            "col" => uri.col = Some(parse_num(input, key, value)?),
            "endLine" => uri.end_line = Some(parse_num(input, key, value)?),
            "endCol" => uri.end_col = Some(parse_num(input, key, value)?),
            other => return Err(parse_err(input, format!("unknown query key {other:?}"))),
        }
    }
    Ok(())
}

fn parse_num(input: &str, key: &str, value: &str) -> DevacResult<u32> {
    value
        .parse::<u32>()
        .map_err(|_| parse_err(input, format!("non-numeric {key} value {value:?}")))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Format a URI in canonical form: redundant `./` file markers dropped,
/// query parameters in fixed order.
pub fn format_uri(uri: &EntityUri) -> String {
    let mut out = String::from(SCHEME);
    out.push_str(&uri.repo);

    if let Some(package) = &uri.package {
        let file = uri.file.as_deref().map(normalize_file_path);
        // The boundary marker is needed whenever the dotted-segment
        // heuristic alone would mis-split the path on re-parse: a file
        // whose first segment has no dot, or a root package with no file.
        let file_first_dotted = file
            .as_deref()
            .and_then(|f| f.split('/').next())
            .map(|s| s.contains('.'))
            .unwrap_or(false);

        if package == "." {
            if file.is_none() || !file_first_dotted {
                out.push_str("/.");
            }
        } else {
            out.push('/');
            out.push_str(package);
            if file.is_some() && !file_first_dotted {
                out.push_str("/.");
            }
        }
        if let Some(file) = &file {
            out.push('/');
            out.push_str(file);
        }
    }

    if !uri.symbol.is_empty() {
        out.push('#');
        out.push_str(&format_symbol_path(&uri.symbol));
    }

    let mut params: Vec<String> = Vec::new();
    if let Some(v) = &uri.version {
        params.push(format!("version={v}"));
    }
    if let Some(n) = uri.line {
        params.push(format!("line={n}"));
    }
    if let Some(n) = uri.col {
        params.push(format!("col={n}"));
    }
    if let Some(n) = uri.end_line {
        params.push(format!("endLine={n}"));
    }
    if let Some(n) = uri.end_col {
        params.push(format!("endCol={n}"));
    }
    if !params.is_empty() {
        out.push('?');
        out.push_str(&params.join("&"));
    }

    out
}

/// Render a symbol path without the URI's leading `#` delimiter.
fn format_symbol_path(segments: &[SymbolSegment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        match seg.kind {
            // The first type segment's '#' merges with the fragment delimiter.
            SegmentKind::Type if i > 0 => out.push('#'),
            SegmentKind::Type => {}
            SegmentKind::Term => out.push('.'),
        }
        out.push_str(&seg.name);
        if let Some(params) = &seg.params {
            out.push('(');
            out.push_str(params);
            out.push(')');
        }
    }
    out
}

/// Drop `.` segments and resolve `..` pairs in a file path.
fn normalize_file_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if seg == ".." {
            if out.pop().is_none() {
                out.push(seg);
            }
        } else {
            out.push(seg);
        }
    }
    out.join("/")
}

// ---------------------------------------------------------------------------
// Relative references
// ---------------------------------------------------------------------------

/// Resolve a reference (canonical or relative) against a context.
pub fn resolve_ref(input: &str, ctx: &UriContext) -> DevacResult<EntityUri> {
    if input.starts_with(SCHEME) {
        return parse_uri(input);
    }
    if input.is_empty() {
        return Err(parse_err(input, "empty reference"));
    }

    // Symbol-only refs: `#Sym`, `.term()`
    if let Some(fragment) = input.strip_prefix('#') {
        let mut uri = context_uri(ctx);
        uri.symbol = parse_symbol_path(input, fragment)?;
        return Ok(uri);
    }
    if input.starts_with('.') && !input.starts_with("./") && !input.starts_with("../") {
        let mut uri = context_uri(ctx);
        uri.symbol = parse_symbol_path(input, input)?;
        return Ok(uri);
    }

    // Relative file refs: `./file#Sym`, `../dir/file#Sym`
    if input.starts_with("./") || input.starts_with("../") {
        let (path_part, fragment) = match input.find('#') {
            Some(idx) => (&input[..idx], Some(&input[idx + 1..])),
            None => (input, None),
        };
        let base_dir = ctx
            .file
            .as_deref()
            .and_then(|f| f.rsplit_once('/').map(|(dir, _)| dir))
            .unwrap_or("");
        let joined = if base_dir.is_empty() {
            path_part.to_string()
        } else {
            format!("{base_dir}/{path_part}")
        };
        let mut uri = context_uri(ctx);
        uri.file = Some(normalize_file_path(&joined));
        if let Some(fragment) = fragment {
            uri.symbol = parse_symbol_path(input, fragment)?;
        }
        return Ok(uri);
    }

    // Fully qualified: `repo[@version]/pkg/file#Sym`
    let (path_part, fragment) = match input.find('#') {
        Some(idx) => (&input[..idx], Some(&input[idx + 1..])),
        None => (input, None),
    };
    let mut segments = path_part.split('/');
    let head = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| parse_err(input, "empty repo in qualified reference"))?;
    let (repo, version) = match head.split_once('@') {
        Some((r, v)) if !r.is_empty() && !v.is_empty() => (r.to_string(), Some(v.to_string())),
        Some(_) => return Err(parse_err(input, "malformed repo@version")),
        None => (head.to_string(), None),
    };
    let tail: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
    let (package, file) = split_package_file(&tail);

    let mut uri = EntityUri { repo, package, file, version, ..EntityUri::default() };
    if let Some(fragment) = fragment {
        uri.symbol = parse_symbol_path(input, fragment)?;
    }
    Ok(uri)
}

/// Return the shortest reference equivalent to `uri` in `ctx`:
/// same file yields a symbol-only ref, same package a relative path,
/// anything else the fully qualified form.
pub fn to_relative_ref(uri: &EntityUri, ctx: &UriContext) -> String {
    let same_repo = uri.repo == ctx.repo && uri.version == ctx.version;
    let same_package = same_repo && uri.package.as_deref() == Some(ctx.package.as_str());

    if same_package && uri.file.is_some() && uri.file == ctx.file && !uri.symbol.is_empty() {
        let rendered = format_symbol_path(&uri.symbol);
        return match uri.symbol[0].kind {
            SegmentKind::Type => format!("#{rendered}"),
            SegmentKind::Term => rendered,
        };
    }

    if same_package {
        if let (Some(target), Some(origin)) = (&uri.file, &ctx.file) {
            let mut out = relative_file_path(origin, target);
            if !uri.symbol.is_empty() {
                out.push('#');
                out.push_str(&format_symbol_path(&uri.symbol));
            }
            return out;
        }
    }

    // Fully qualified form.
    let mut out = uri.repo.clone();
    if let Some(v) = &uri.version {
        out.push('@');
        out.push_str(v);
    }
    if let Some(package) = &uri.package {
        out.push('/');
        out.push_str(package);
    }
    if let Some(file) = &uri.file {
        out.push('/');
        out.push_str(file);
    }
    if !uri.symbol.is_empty() {
        out.push('#');
        out.push_str(&format_symbol_path(&uri.symbol));
    }
    out
}

/// Compute a `./`-style path from `origin`'s directory to `target`.
fn relative_file_path(origin: &str, target: &str) -> String {
    let origin_dir: Vec<&str> = match origin.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let target_segs: Vec<&str> = target.split('/').collect();

    let common = origin_dir
        .iter()
        .zip(target_segs.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = origin_dir.len() - common;
    let mut out = String::new();
    if ups == 0 {
        out.push_str("./");
    } else {
        for _ in 0..ups {
            out.push_str("../");
        }
    }
    out.push_str(&target_segs[common..].join("/"));
    out
}

/// Canonical URI for a persisted node. The repo and package come out of
/// the entity id; the symbol path is the node's qualified name minus
/// its module component.
pub fn node_uri(node: &crate::types::Node) -> DevacResult<EntityUri> {
    let mut parts = node.entity_id.splitn(4, ':');
    let (Some(repo), Some(package)) = (parts.next(), parts.next()) else {
        return Err(parse_err(&node.entity_id, "malformed entity id"));
    };

    let module_name = crate::parser::module_name_from_path(&node.file_path);
    let symbol = if node.kind == crate::types::NodeKind::Module {
        Vec::new()
    } else {
        let local = node
            .qualified_name
            .strip_prefix(&format!("{module_name}."))
            .unwrap_or(&node.qualified_name);
        local
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|name| match node.kind {
                crate::types::NodeKind::Class
                | crate::types::NodeKind::Interface
                | crate::types::NodeKind::Type
                | crate::types::NodeKind::Enum
                | crate::types::NodeKind::Namespace => SymbolSegment::type_name(name),
                _ => SymbolSegment::term(name, None),
            })
            .collect()
    };

    Ok(EntityUri {
        repo: repo.to_string(),
        package: Some(package.to_string()),
        file: Some(node.file_path.clone()),
        symbol,
        line: Some(node.span.start_line),
        col: Some(node.span.start_column),
        end_line: Some(node.span.end_line),
        end_col: Some(node.span.end_column),
        ..EntityUri::default()
    })
}

fn context_uri(ctx: &UriContext) -> EntityUri {
    EntityUri {
        repo: ctx.repo.clone(),
        package: Some(ctx.package.clone()),
        file: ctx.file.clone(),
        version: ctx.version.clone(),
        ..EntityUri::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> UriContext {
        UriContext {
            repo: "web".into(),
            version: None,
            package: "pkg/ui".into(),
            file: Some("src/components/button.ts".into()),
        }
    }

    #[test]
    fn test_parse_full_uri() {
        let uri = parse_uri("devac://web/pkg/ui/button.ts#Button.render()?version=2&line=14")
            .expect("parse");
        assert_eq!(uri.repo, "web");
        assert_eq!(uri.package.as_deref(), Some("pkg/ui"));
        assert_eq!(uri.file.as_deref(), Some("button.ts"));
        assert_eq!(uri.symbol.len(), 2);
        assert_eq!(uri.symbol[0], SymbolSegment::type_name("Button"));
        assert_eq!(uri.symbol[1], SymbolSegment::term("render", Some("")));
        assert_eq!(uri.version.as_deref(), Some("2"));
        assert_eq!(uri.line, Some(14));
    }

    #[test]
    fn test_parse_repo_root_package() {
        let uri = parse_uri("devac://web/utils.ts#helper").expect("parse");
        assert_eq!(uri.package.as_deref(), Some("."));
        assert_eq!(uri.file.as_deref(), Some("utils.ts"));
    }

    #[test]
    fn test_parse_explicit_boundary_marker() {
        let uri = parse_uri("devac://web/pkg/ui/./src/button.ts").expect("parse");
        assert_eq!(uri.package.as_deref(), Some("pkg/ui"));
        assert_eq!(uri.file.as_deref(), Some("src/button.ts"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_uri("http://web/pkg").is_err());
        assert!(parse_uri("devac://").is_err());
        assert!(parse_uri("devac://web/a.ts#").is_err());
        assert!(parse_uri("devac://web/a.ts#Sym?line=abc").is_err());
        assert!(parse_uri("devac://web/a.ts#Sym?bogus=1").is_err());
    }

    #[test]
    fn test_format_parse_roundtrip() {
        let cases = [
            "devac://web",
            "devac://web/pkg/ui",
            "devac://web/utils.ts",
            "devac://web/pkg/ui/button.ts",
            "devac://web/pkg/ui/./src/button.ts",
            "devac://web/pkg/ui/button.ts#Button",
            "devac://web/pkg/ui/button.ts#Button.render()",
            "devac://web/pkg/ui/button.ts#.greet(name)",
            "devac://web/pkg/ui/button.ts#Outer#Inner",
            "devac://web/pkg/ui/button.ts#Button?version=3&line=1&col=2&endLine=9&endCol=0",
        ];
        for case in cases {
            let uri = parse_uri(case).expect(case);
            assert_eq!(format_uri(&uri), case, "roundtrip for {case}");
            // parse(format(u)) == u
            assert_eq!(parse_uri(&format_uri(&uri)).expect(case), uri);
        }
    }

    #[test]
    fn test_format_normalizes_query_order_and_dot_segments() {
        let uri = parse_uri("devac://web/pkg/ui/./src/./a.ts#Sym?line=3&version=1").expect("parse");
        assert_eq!(
            format_uri(&uri),
            "devac://web/pkg/ui/./src/a.ts#Sym?version=1&line=3"
        );
    }

    #[test]
    fn test_resolve_symbol_only_refs() {
        let uri = resolve_ref("#Button", &ctx()).expect("resolve");
        assert_eq!(uri.file.as_deref(), Some("src/components/button.ts"));
        assert_eq!(uri.symbol[0], SymbolSegment::type_name("Button"));

        let uri = resolve_ref(".onClick()", &ctx()).expect("resolve");
        assert_eq!(uri.symbol[0], SymbolSegment::term("onClick", Some("")));
    }

    #[test]
    fn test_resolve_relative_file_refs() {
        let uri = resolve_ref("./icon.ts#Icon", &ctx()).expect("resolve");
        assert_eq!(uri.file.as_deref(), Some("src/components/icon.ts"));

        let uri = resolve_ref("../hooks/useTheme.ts#.useTheme()", &ctx()).expect("resolve");
        assert_eq!(uri.file.as_deref(), Some("src/hooks/useTheme.ts"));
        assert_eq!(uri.symbol[0].name, "useTheme");
    }

    #[test]
    fn test_resolve_fully_qualified() {
        let uri = resolve_ref("api@1.2.0/services/auth.ts#AuthService", &ctx()).expect("resolve");
        assert_eq!(uri.repo, "api");
        assert_eq!(uri.version.as_deref(), Some("1.2.0"));
        assert_eq!(uri.package.as_deref(), Some("services"));
        assert_eq!(uri.file.as_deref(), Some("auth.ts"));
    }

    #[test]
    fn test_to_relative_ref_shortens() {
        let c = ctx();

        // Same file: symbol only.
        let mut uri = context_uri(&c);
        uri.symbol = vec![SymbolSegment::type_name("Button")];
        assert_eq!(to_relative_ref(&uri, &c), "#Button");

        let mut uri = context_uri(&c);
        uri.symbol = vec![SymbolSegment::term("onClick", Some(""))];
        assert_eq!(to_relative_ref(&uri, &c), ".onClick()");

        // Same package, sibling file.
        let mut uri = context_uri(&c);
        uri.file = Some("src/components/icon.ts".into());
        uri.symbol = vec![SymbolSegment::type_name("Icon")];
        assert_eq!(to_relative_ref(&uri, &c), "./icon.ts#Icon");

        // Same package, cousin file.
        let mut uri = context_uri(&c);
        uri.file = Some("src/hooks/useTheme.ts".into());
        assert_eq!(to_relative_ref(&uri, &c), "../hooks/useTheme.ts");

        // Different repo: fully qualified.
        let uri = EntityUri {
            repo: "api".into(),
            version: Some("1.2.0".into()),
            package: Some("services".into()),
            file: Some("auth.ts".into()),
            symbol: vec![SymbolSegment::type_name("AuthService")],
            ..EntityUri::default()
        };
        assert_eq!(to_relative_ref(&uri, &c), "api@1.2.0/services/auth.ts#AuthService");
    }

    #[test]
    fn test_node_uri() {
        use crate::types::{Node, NodeKind, Span, Visibility};
        let node = Node {
            entity_id: "web:pkg/ui:function:abcd1234".into(),
            name: "greet".into(),
            qualified_name: "src.greeter.greet".into(),
            kind: NodeKind::Function,
            file_path: "src/greeter.ts".into(),
            span: Span { start_line: 3, end_line: 5, start_column: 0, end_column: 1 },
            source_file_hash: "hash".into(),
            branch: "base".into(),
            is_deleted: false,
            updated_at: 0,
            is_exported: true,
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
        };
        let uri = node_uri(&node).expect("uri");
        assert_eq!(
            format_uri(&uri),
            "devac://web/pkg/ui/./src/greeter.ts#.greet?line=3&col=0&endLine=5&endCol=1"
        );
        assert_eq!(parse_uri(&format_uri(&uri)).expect("reparse"), uri);
    }

    #[test]
    fn test_relative_then_resolve_roundtrip() {
        let c = ctx();
        let uri = EntityUri {
            repo: c.repo.clone(),
            package: Some(c.package.clone()),
            file: Some("src/hooks/useTheme.ts".into()),
            symbol: vec![SymbolSegment::term("useTheme", Some(""))],
            ..EntityUri::default()
        };
        let short = to_relative_ref(&uri, &c);
        let back = resolve_ref(&short, &c).expect("resolve");
        assert_eq!(back, uri);
    }
}
