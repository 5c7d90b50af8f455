//! Row mapping between domain records and staged/persisted columns.
//!
//! Column order follows `schema` DDL exactly; these functions are the
//! only place rows are marshalled in either direction.

use std::collections::HashMap;
use std::path::PathBuf;

use duckdb::params;

use crate::error::{DevacError, DevacResult};
use crate::parser::FileParse;
use crate::schema::{escape_path, Collection, SeedLayout};
use crate::store::StoreHandle;
use crate::types::{
    CodeEffect, Edge, EdgeKind, ExternalRef, ImportStyle, Node, NodeKind, Span, Visibility,
    BASE_BRANCH,
};

/// Rows loaded from one partition; only the requested collection's
/// vector is populated.
#[derive(Debug, Default)]
pub struct CollectionRows {
    /// Node rows.
    pub nodes: Vec<Node>,
    /// Edge rows.
    pub edges: Vec<Edge>,
    /// External ref rows.
    pub external_refs: Vec<ExternalRef>,
    /// Effect rows.
    pub effects: Vec<CodeEffect>,
}

/// The previous seed state a build diffs against: the raw rows of the
/// current branch partition (base when the branch has none), tombstones
/// included, plus the live file hash set.
#[derive(Debug, Default)]
pub(crate) struct PreviousState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub external_refs: Vec<ExternalRef>,
    pub effects: Vec<CodeEffect>,
    /// `file_path -> source_file_hash` over live node rows.
    pub file_hashes: HashMap<String, String>,
}

impl PreviousState {
    pub fn load(handle: &StoreHandle, layout: &SeedLayout, branch: &str) -> DevacResult<Self> {
        let conn = handle.connection();
        let mut state = Self {
            nodes: load_collection_rows(conn, layout, branch, Collection::Nodes)?.nodes,
            edges: load_collection_rows(conn, layout, branch, Collection::Edges)?.edges,
            external_refs: load_collection_rows(conn, layout, branch, Collection::ExternalRefs)?
                .external_refs,
            effects: load_collection_rows(conn, layout, branch, Collection::Effects)?.effects,
            file_hashes: HashMap::new(),
        };
        for node in state.nodes.iter().filter(|n| !n.is_deleted) {
            state
                .file_hashes
                .insert(node.file_path.clone(), node.source_file_hash.clone());
        }
        Ok(state)
    }
}

/// The partition file a branch reads as its previous state: the
/// branch's own file when present, otherwise base.
fn partition_path(layout: &SeedLayout, branch: &str, collection: Collection) -> Option<PathBuf> {
    let own = layout.collection_path(branch, collection);
    if own.exists() {
        return Some(own);
    }
    if branch != BASE_BRANCH {
        let base = layout.collection_path(BASE_BRANCH, collection);
        if base.exists() {
            return Some(base);
        }
    }
    None
}

/// Load the raw rows (tombstones included) of one collection's current
/// partition for a branch. Missing files yield an empty result.
pub fn load_collection_rows(
    conn: &duckdb::Connection,
    layout: &SeedLayout,
    branch: &str,
    collection: Collection,
) -> DevacResult<CollectionRows> {
    let mut rows = CollectionRows::default();
    let Some(path) = partition_path(layout, branch, collection) else {
        return Ok(rows);
    };

    let sql = format!(
        "SELECT {} FROM read_parquet('{}')",
        collection.select_list(),
        escape_path(&path)
    );
    let mut stmt = conn.prepare(&sql)?;

    match collection {
        Collection::Nodes => {
            let mapped = stmt.query_map([], node_from_row)?;
            for row in mapped {
                rows.nodes.push(row?);
            }
        }
        Collection::Edges => {
            let mapped = stmt.query_map([], edge_from_row)?;
            for row in mapped {
                rows.edges.push(row?);
            }
        }
        Collection::ExternalRefs => {
            let mapped = stmt.query_map([], ref_from_row)?;
            for row in mapped {
                rows.external_refs.push(row?);
            }
        }
        Collection::Effects => {
            let mapped = stmt.query_map([], effect_from_row)?;
            for row in mapped {
                rows.effects.push(row?);
            }
        }
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Row -> record
// ---------------------------------------------------------------------------

fn node_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Node> {
    Ok(Node {
        entity_id: row.get(0)?,
        name: row.get(1)?,
        qualified_name: row.get(2)?,
        kind: NodeKind::from_str_lossy(&row.get::<_, String>(3)?),
        file_path: row.get(4)?,
        span: Span {
            start_line: row.get::<_, i32>(5)? as u32,
            end_line: row.get::<_, i32>(6)? as u32,
            start_column: row.get::<_, i32>(7)? as u32,
            end_column: row.get::<_, i32>(8)? as u32,
        },
        source_file_hash: row.get(9)?,
        branch: row.get(10)?,
        is_deleted: row.get(11)?,
        updated_at: row.get(12)?,
        is_exported: row.get(13)?,
        is_default_export: row.get(14)?,
        visibility: Visibility::from_str_lossy(&row.get::<_, String>(15)?),
        is_async: row.get(16)?,
        is_generator: row.get(17)?,
        is_static: row.get(18)?,
        is_abstract: row.get(19)?,
        type_signature: row.get(20)?,
        documentation: row.get(21)?,
        decorators: row
            .get::<_, Option<String>>(22)?
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        type_parameters: row.get(23)?,
        properties: row
            .get::<_, Option<String>>(24)?
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn edge_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Edge> {
    Ok(Edge {
        source_entity_id: row.get(0)?,
        target_entity_id: row.get(1)?,
        edge_type: EdgeKind::from_str_lossy(&row.get::<_, String>(2)?),
        file_path: row.get(3)?,
        start_line: row.get::<_, i32>(4)? as u32,
        start_column: row.get::<_, i32>(5)? as u32,
        branch: row.get(6)?,
        is_deleted: row.get(7)?,
        updated_at: row.get(8)?,
        properties: row
            .get::<_, Option<String>>(9)?
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn ref_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<ExternalRef> {
    Ok(ExternalRef {
        source_entity_id: row.get(0)?,
        module_specifier: row.get(1)?,
        imported_symbol: row.get(2)?,
        local_alias: row.get(3)?,
        import_style: ImportStyle::from_str_lossy(&row.get::<_, String>(4)?),
        is_type_only: row.get(5)?,
        is_reexport: row.get(6)?,
        is_resolved: row.get(7)?,
        target_entity_id: row.get(8)?,
        file_path: row.get(9)?,
        start_line: row.get::<_, i32>(10)? as u32,
        start_column: row.get::<_, i32>(11)? as u32,
        branch: row.get(12)?,
        is_deleted: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn effect_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<CodeEffect> {
    Ok(CodeEffect {
        effect_id: row.get(0)?,
        effect_type: row.get(1)?,
        source_entity_id: row.get(2)?,
        file_path: row.get(3)?,
        start_line: row.get::<_, i32>(4)? as u32,
        callee_name: row.get(5)?,
        is_external: row.get(6)?,
        is_async: row.get(7)?,
        is_constructor: row.get(8)?,
        branch: row.get(9)?,
        is_deleted: row.get(10)?,
        updated_at: row.get(11)?,
        properties: row
            .get::<_, Option<String>>(12)?
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

// ---------------------------------------------------------------------------
// Record -> staging table
// ---------------------------------------------------------------------------

/// Stage a whole batch into fresh `stage_*` tables on the handle's
/// connection, ready for `COPY TO` parquet.
pub(crate) fn append_batch(handle: &StoreHandle, batch: &FileParse) -> DevacResult<()> {
    let conn = handle.connection();
    for collection in crate::schema::ALL_COLLECTIONS {
        let staging = format!("stage_{}", collection.table_name());
        conn.execute_batch(&collection.create_staging_sql(&staging))?;
    }

    {
        let mut app = conn.appender("stage_nodes")?;
        for node in &batch.nodes {
            let decorators = serde_json::to_string(&node.decorators)
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            let properties = node
                .properties
                .as_ref()
                .map(|p| serde_json::to_string(p))
                .transpose()
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            app.append_row(params![
                node.entity_id,
                node.name,
                node.qualified_name,
                node.kind.as_str(),
                node.file_path,
                node.span.start_line as i32,
                node.span.end_line as i32,
                node.span.start_column as i32,
                node.span.end_column as i32,
                node.source_file_hash,
                node.branch,
                node.is_deleted,
                node.updated_at,
                node.is_exported,
                node.is_default_export,
                node.visibility.as_str(),
                node.is_async,
                node.is_generator,
                node.is_static,
                node.is_abstract,
                node.type_signature,
                node.documentation,
                decorators,
                node.type_parameters,
                properties,
            ])?;
        }
        app.flush()?;
    }

    {
        let mut app = conn.appender("stage_edges")?;
        for edge in &batch.edges {
            let properties = edge
                .properties
                .as_ref()
                .map(|p| serde_json::to_string(p))
                .transpose()
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            app.append_row(params![
                edge.source_entity_id,
                edge.target_entity_id,
                edge.edge_type.as_str(),
                edge.file_path,
                edge.start_line as i32,
                edge.start_column as i32,
                edge.branch,
                edge.is_deleted,
                edge.updated_at,
                properties,
            ])?;
        }
        app.flush()?;
    }

    {
        let mut app = conn.appender("stage_external_refs")?;
        for ext_ref in &batch.external_refs {
            app.append_row(params![
                ext_ref.source_entity_id,
                ext_ref.module_specifier,
                ext_ref.imported_symbol,
                ext_ref.local_alias,
                ext_ref.import_style.as_str(),
                ext_ref.is_type_only,
                ext_ref.is_reexport,
                ext_ref.is_resolved,
                ext_ref.target_entity_id,
                ext_ref.file_path,
                ext_ref.start_line as i32,
                ext_ref.start_column as i32,
                ext_ref.branch,
                ext_ref.is_deleted,
                ext_ref.updated_at,
            ])?;
        }
        app.flush()?;
    }

    {
        let mut app = conn.appender("stage_effects")?;
        for effect in &batch.effects {
            let properties = effect
                .properties
                .as_ref()
                .map(|p| serde_json::to_string(p))
                .transpose()
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            app.append_row(params![
                effect.effect_id,
                effect.effect_type,
                effect.source_entity_id,
                effect.file_path,
                effect.start_line as i32,
                effect.callee_name,
                effect.is_external,
                effect.is_async,
                effect.is_constructor,
                effect.branch,
                effect.is_deleted,
                effect.updated_at,
                properties,
            ])?;
        }
        app.flush()?;
    }

    Ok(())
}
