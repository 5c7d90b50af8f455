//! Stable entity identity.
//!
//! Entity ids have the form `{repo}:{package}:{kind}:{hash8}` where the
//! hash depends only on the symbol's qualified name, kind, and structural
//! signature. Whitespace-only edits therefore never perturb an id; a
//! rename or signature change does.

use sha2::{Digest, Sha256};

use crate::types::NodeKind;

/// Number of hex characters kept from the identity hash.
const HASH_LEN: usize = 8;

/// Compute the stable entity id for a symbol.
///
/// `structural_sig` is a language-defined digest of the symbol's shape
/// (parameter names and types, heritage, member list order); it is the
/// component that makes semantic edits change the id.
pub fn compute_entity_id(
    repo: &str,
    package: &str,
    kind: NodeKind,
    qualified_name: &str,
    structural_sig: &str,
) -> String {
    let hash = content_hash8(qualified_name, kind.as_str(), structural_sig);
    format!("{repo}:{package}:{}:{hash}", kind.as_str())
}

/// Compute a short content hash for an effect site. Effects have no
/// qualified name of their own, so the id is anchored to the enclosing
/// entity plus the site's discriminating facts.
pub fn compute_effect_id(
    source_entity_id: &str,
    effect_type: &str,
    callee_name: &str,
    start_line: u32,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_entity_id.as_bytes());
    hasher.update([0]);
    hasher.update(effect_type.as_bytes());
    hasher.update([0]);
    hasher.update(callee_name.as_bytes());
    hasher.update([0]);
    hasher.update(start_line.to_le_bytes());
    hex::encode(&hasher.finalize()[..HASH_LEN / 2])
}

/// SHA-256 over the identity triple, truncated to 8 hex chars.
/// NUL separators keep `("ab", "c")` and `("a", "bc")` distinct.
fn content_hash8(qualified_name: &str, kind: &str, structural_sig: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(qualified_name.as_bytes());
    hasher.update([0]);
    hasher.update(kind.as_bytes());
    hasher.update([0]);
    hasher.update(structural_sig.as_bytes());
    hex::encode(&hasher.finalize()[..HASH_LEN / 2])
}

/// SHA-256 of file content, full hex. Used for change detection and the
/// `source_file_hash` column.
pub fn file_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Manifest hash over a branch's sorted `(path, file_hash)` input set.
pub fn manifest_hash(entries: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = entries.iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for (path, hash) in sorted {
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(hash.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_shape() {
        let id = compute_entity_id("web", "pkg/ui", NodeKind::Function, "utils.greet", "name:string");
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "web");
        assert_eq!(parts[1], "pkg/ui");
        assert_eq!(parts[2], "function");
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_entity_id_stable_under_cosmetic_change() {
        // The id depends only on (qualified_name, kind, structural_sig),
        // so reformatting the body cannot move it.
        let a = compute_entity_id("r", "p", NodeKind::Function, "m.f", "a:number,b:number");
        let b = compute_entity_id("r", "p", NodeKind::Function, "m.f", "a:number,b:number");
        assert_eq!(a, b);
    }

    #[test]
    fn test_entity_id_changes_on_rename_and_signature() {
        let base = compute_entity_id("r", "p", NodeKind::Function, "m.f", "a:number");
        let renamed = compute_entity_id("r", "p", NodeKind::Function, "m.g", "a:number");
        let resigned = compute_entity_id("r", "p", NodeKind::Function, "m.f", "a:string");
        let rekinded = compute_entity_id("r", "p", NodeKind::Method, "m.f", "a:number");
        assert_ne!(base, renamed);
        assert_ne!(base, resigned);
        assert_ne!(base, rekinded);
    }

    #[test]
    fn test_hash_separator_prevents_collisions() {
        let a = compute_entity_id("r", "p", NodeKind::Function, "ab", "c");
        let b = compute_entity_id("r", "p", NodeKind::Function, "a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_manifest_hash_order_independent() {
        let forward = vec![
            ("a.ts".to_string(), "h1".to_string()),
            ("b.ts".to_string(), "h2".to_string()),
        ];
        let reversed = vec![
            ("b.ts".to_string(), "h2".to_string()),
            ("a.ts".to_string(), "h1".to_string()),
        ];
        assert_eq!(manifest_hash(&forward), manifest_hash(&reversed));
    }

    #[test]
    fn test_effect_id_distinguishes_lines() {
        let a = compute_effect_id("r:p:function:abcd1234", "FunctionCall", "db.put", 10);
        let b = compute_effect_id("r:p:function:abcd1234", "FunctionCall", "db.put", 11);
        assert_ne!(a, b);
    }
}
