//! Central hub: the process-wide store of repo registrations, cross-repo
//! edges, unified feedback, and the query cache.
//!
//! The hub owns a single DuckDB file at `<hub>/central.duckdb` and is
//! single-writer: all statements go through one internally serialized
//! connection. A second process must not open the hub for write while
//! `<hub>/mcp.sock` is present; that is surfaced as a `hub_writable`
//! prerequisite failure, not a corruption risk.

use std::path::{Path, PathBuf};

use duckdb::{params, Connection};
use parking_lot::Mutex;

use crate::error::{DevacError, DevacResult};
use crate::types::{
    CrossRepoEdge, DomainEffect, EdgeKind, FeedbackItem, FeedbackSeverity, RepoRegistration,
    RepoStatus,
};

/// File name of the central store.
pub const CENTRAL_DB_FILE: &str = "central.duckdb";
/// Presence of this file means another process holds the hub.
pub const HUB_SOCKET_FILE: &str = "mcp.sock";

/// Default TTL for cached query results.
const DEFAULT_CACHE_TTL_MS: i64 = 5 * 60 * 1000;

const HUB_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repos (
    repo_id VARCHAR PRIMARY KEY,
    local_path VARCHAR NOT NULL,
    manifest_hash VARCHAR NOT NULL,
    last_synced BIGINT NOT NULL,
    status VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS cross_repo_edges (
    source_repo VARCHAR NOT NULL,
    source_entity_id VARCHAR NOT NULL,
    target_repo VARCHAR NOT NULL,
    target_entity_id VARCHAR NOT NULL,
    edge_type VARCHAR NOT NULL,
    metadata VARCHAR
);
CREATE TABLE IF NOT EXISTS feedback (
    feedback_id VARCHAR PRIMARY KEY,
    repo_id VARCHAR NOT NULL,
    source VARCHAR NOT NULL,
    file_path VARCHAR,
    line_number INTEGER,
    severity VARCHAR NOT NULL,
    category VARCHAR NOT NULL,
    title VARCHAR NOT NULL,
    description VARCHAR NOT NULL,
    resolved BOOLEAN NOT NULL,
    actionable BOOLEAN NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    github_pr_number INTEGER,
    workflow_name VARCHAR,
    ci_url VARCHAR
);
CREATE TABLE IF NOT EXISTS domain_effects (
    repo_id VARCHAR NOT NULL,
    package VARCHAR NOT NULL,
    source_effect_id VARCHAR NOT NULL,
    domain VARCHAR NOT NULL,
    action VARCHAR NOT NULL,
    rule_id VARCHAR NOT NULL,
    rule_name VARCHAR NOT NULL,
    original_effect_type VARCHAR NOT NULL,
    source_entity_id VARCHAR NOT NULL,
    file_path VARCHAR NOT NULL,
    start_line INTEGER NOT NULL,
    metadata VARCHAR NOT NULL,
    updated_at BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash VARCHAR PRIMARY KEY,
    result VARCHAR NOT NULL,
    cached_at BIGINT NOT NULL,
    ttl_ms BIGINT NOT NULL
);
";

/// Filter for feedback queries; present fields are ANDed.
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    /// Match this severity.
    pub severity: Option<FeedbackSeverity>,
    /// Match this source.
    pub source: Option<String>,
    /// Match this file path.
    pub file_path: Option<String>,
    /// Match this repo.
    pub repo_id: Option<String>,
    /// Match resolved state.
    pub resolved: Option<bool>,
}

/// Axis for feedback summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackGroupBy {
    /// Group counts by severity.
    Severity,
    /// Group counts by source.
    Source,
}

/// The central hub over its single store file.
pub struct CentralHub {
    conn: Mutex<Connection>,
    hub_dir: PathBuf,
}

impl CentralHub {
    /// Open (or create) the hub at `hub_dir`. Refuses to open while
    /// another process holds the hub socket.
    pub fn open(hub_dir: &Path) -> DevacResult<Self> {
        if !Self::is_writable(hub_dir) {
            return Err(DevacError::HubWrite(format!(
                "hub at {} is held by another process ({HUB_SOCKET_FILE} present)",
                hub_dir.display()
            )));
        }
        std::fs::create_dir_all(hub_dir)?;
        let conn = Connection::open(hub_dir.join(CENTRAL_DB_FILE))?;
        conn.execute_batch(HUB_SCHEMA)?;
        tracing::info!(dir = %hub_dir.display(), "central hub opened");
        Ok(Self { conn: Mutex::new(conn), hub_dir: hub_dir.to_path_buf() })
    }

    /// Whether the hub can be opened for write (no live socket file).
    pub fn is_writable(hub_dir: &Path) -> bool {
        !hub_dir.join(HUB_SOCKET_FILE).exists()
    }

    /// The hub directory.
    pub fn hub_dir(&self) -> &Path {
        &self.hub_dir
    }

    /// Flush and close the central store.
    pub fn shutdown(&self) {
        let conn = self.conn.lock();
        if let Err(err) = conn.execute_batch("CHECKPOINT") {
            tracing::warn!(error = %err, "hub checkpoint on shutdown failed");
        }
        tracing::info!("central hub shut down");
    }

    // -- registry -----------------------------------------------------------

    /// Register a repo; a duplicate `repo_id` upserts (later write wins).
    pub fn add_repo(&self, reg: &RepoRegistration) -> DevacResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO repos (repo_id, local_path, manifest_hash, last_synced, status)
             VALUES (?, ?, ?, ?, ?)",
            params![
                reg.repo_id,
                reg.local_path.to_string_lossy(),
                reg.manifest_hash,
                reg.last_synced,
                reg.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Remove a repo, cascading to every cross-repo edge touching it
    /// and to its stored domain effects. Returns whether the repo
    /// existed.
    pub fn remove_repo(&self, repo_id: &str) -> DevacResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM repos WHERE repo_id = ?", params![repo_id])?;
        conn.execute(
            "DELETE FROM cross_repo_edges WHERE source_repo = ? OR target_repo = ?",
            params![repo_id, repo_id],
        )?;
        conn.execute("DELETE FROM domain_effects WHERE repo_id = ?", params![repo_id])?;
        Ok(removed > 0)
    }

    /// All registered repos.
    pub fn list_repos(&self) -> DevacResult<Vec<RepoRegistration>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT repo_id, local_path, manifest_hash, last_synced, status
             FROM repos ORDER BY repo_id",
        )?;
        let rows = stmt.query_map([], repo_from_row)?;
        let mut repos = Vec::new();
        for row in rows {
            repos.push(row?);
        }
        Ok(repos)
    }

    /// One repo by id.
    pub fn get_repo(&self, repo_id: &str) -> DevacResult<Option<RepoRegistration>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT repo_id, local_path, manifest_hash, last_synced, status
             FROM repos WHERE repo_id = ?",
        )?;
        let mut rows = stmt.query_map(params![repo_id], repo_from_row)?;
        rows.next().transpose().map_err(DevacError::from)
    }

    /// Record a completed sync: new manifest hash, bumped `last_synced`,
    /// status back to active.
    pub fn update_repo_sync(&self, repo_id: &str, manifest_hash: &str) -> DevacResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE repos SET manifest_hash = ?, last_synced = ?, status = ? WHERE repo_id = ?",
            params![manifest_hash, now, RepoStatus::Active.as_str(), repo_id],
        )?;
        if updated == 0 {
            return Err(DevacError::HubWrite(format!("repo {repo_id} is not registered")));
        }
        Ok(())
    }

    /// Mark a repo stale (seeds current, registry lagging).
    pub fn mark_repo_stale(&self, repo_id: &str) -> DevacResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE repos SET status = ? WHERE repo_id = ?",
            params![RepoStatus::Stale.as_str(), repo_id],
        )?;
        Ok(())
    }

    // -- cross-repo edges ---------------------------------------------------

    /// Insert cross-repo edges.
    pub fn add_cross_repo_edges(&self, edges: &[CrossRepoEdge]) -> DevacResult<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "INSERT INTO cross_repo_edges
             (source_repo, source_entity_id, target_repo, target_entity_id, edge_type, metadata)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        for edge in edges {
            let metadata = edge
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            stmt.execute(params![
                edge.source_repo,
                edge.source_entity_id,
                edge.target_repo,
                edge.target_entity_id,
                edge.edge_type.as_str(),
                metadata,
            ])?;
        }
        Ok(())
    }

    /// Delete every cross-repo edge whose source repo is `repo_id`.
    pub fn remove_cross_repo_edges(&self, repo_id: &str) -> DevacResult<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM cross_repo_edges WHERE source_repo = ?",
            params![repo_id],
        )?;
        Ok(removed)
    }

    /// Every cross-repo edge whose target entity is in the given set.
    pub fn get_cross_repo_dependents(
        &self,
        target_entity_ids: &[String],
    ) -> DevacResult<Vec<CrossRepoEdge>> {
        if target_entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; target_entity_ids.len()].join(", ");
        let sql = format!(
            "SELECT source_repo, source_entity_id, target_repo, target_entity_id, edge_type, metadata
             FROM cross_repo_edges WHERE target_entity_id IN ({placeholders})"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn duckdb::ToSql> = target_entity_ids
            .iter()
            .map(|id| id as &dyn duckdb::ToSql)
            .collect();
        let rows = stmt.query_map(params.as_slice(), edge_from_row)?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    /// All cross-repo edges originating from one repo.
    pub fn cross_repo_edges_for(&self, repo_id: &str) -> DevacResult<Vec<CrossRepoEdge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT source_repo, source_entity_id, target_repo, target_entity_id, edge_type, metadata
             FROM cross_repo_edges WHERE source_repo = ?",
        )?;
        let rows = stmt.query_map(params![repo_id], edge_from_row)?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    // -- domain effects -----------------------------------------------------

    /// Replace a package's stored domain effects with the set derived by
    /// the latest sync. The swap is scoped by the hub's write
    /// serialization; an empty set clears the package's rows.
    pub fn replace_domain_effects(
        &self,
        repo_id: &str,
        package: &str,
        effects: &[DomainEffect],
    ) -> DevacResult<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM domain_effects WHERE repo_id = ? AND package = ?",
            params![repo_id, package],
        )?;
        if effects.is_empty() {
            return Ok(0);
        }
        let mut stmt = conn.prepare(
            "INSERT INTO domain_effects
             (repo_id, package, source_effect_id, domain, action, rule_id, rule_name,
              original_effect_type, source_entity_id, file_path, start_line, metadata, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for effect in effects {
            let metadata = serde_json::to_string(&effect.metadata)
                .map_err(|e| DevacError::Serialization(e.to_string()))?;
            stmt.execute(params![
                repo_id,
                package,
                effect.source_effect_id,
                effect.domain,
                effect.action,
                effect.rule_id,
                effect.rule_name,
                effect.original_effect_type,
                effect.source_entity_id,
                effect.file_path,
                effect.start_line as i32,
                metadata,
                now,
            ])?;
        }
        Ok(effects.len())
    }

    /// A repo's stored domain effects, optionally filtered by domain.
    pub fn domain_effects(
        &self,
        repo_id: &str,
        domain: Option<&str>,
    ) -> DevacResult<Vec<DomainEffect>> {
        let mut sql = String::from(
            "SELECT source_effect_id, domain, action, rule_id, rule_name,
                    original_effect_type, source_entity_id, file_path, start_line, metadata
             FROM domain_effects WHERE repo_id = ?",
        );
        let mut values: Vec<String> = vec![repo_id.to_string()];
        if let Some(domain) = domain {
            sql.push_str(" AND domain = ?");
            values.push(domain.to_string());
        }
        sql.push_str(" ORDER BY file_path, start_line");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn duckdb::ToSql> =
            values.iter().map(|v| v as &dyn duckdb::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), domain_effect_from_row)?;
        let mut effects = Vec::new();
        for row in rows {
            effects.push(row?);
        }
        Ok(effects)
    }

    // -- unified feedback ---------------------------------------------------

    /// Insert or update a feedback item (keyed by `feedback_id`).
    pub fn upsert_feedback(&self, item: &FeedbackItem) -> DevacResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO feedback
             (feedback_id, repo_id, source, file_path, line_number, severity, category,
              title, description, resolved, actionable, created_at, updated_at,
              github_pr_number, workflow_name, ci_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                item.feedback_id,
                item.repo_id,
                item.source,
                item.file_path,
                item.line_number.map(|n| n as i32),
                item.severity.as_str(),
                item.category,
                item.title,
                item.description,
                item.resolved,
                item.actionable,
                item.created_at,
                item.updated_at,
                item.github_pr_number.map(|n| n as i32),
                item.workflow_name,
                item.ci_url,
            ],
        )?;
        Ok(())
    }

    /// Feedback matching a filter, newest first.
    pub fn query_feedback(&self, filter: &FeedbackFilter) -> DevacResult<Vec<FeedbackItem>> {
        let mut sql = String::from(
            "SELECT feedback_id, repo_id, source, file_path, line_number, severity, category,
                    title, description, resolved, actionable, created_at, updated_at,
                    github_pr_number, workflow_name, ci_url
             FROM feedback WHERE 1=1",
        );
        let mut values: Vec<String> = Vec::new();
        if let Some(severity) = filter.severity {
            sql.push_str(" AND severity = ?");
            values.push(severity.as_str().to_string());
        }
        if let Some(source) = &filter.source {
            sql.push_str(" AND source = ?");
            values.push(source.clone());
        }
        if let Some(file_path) = &filter.file_path {
            sql.push_str(" AND file_path = ?");
            values.push(file_path.clone());
        }
        if let Some(repo_id) = &filter.repo_id {
            sql.push_str(" AND repo_id = ?");
            values.push(repo_id.clone());
        }
        if let Some(resolved) = filter.resolved {
            sql.push_str(" AND resolved = ?");
            values.push(if resolved { "true".into() } else { "false".into() });
        }
        sql.push_str(" ORDER BY updated_at DESC");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn duckdb::ToSql> =
            values.iter().map(|v| v as &dyn duckdb::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), feedback_from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Delete all feedback for a repo. Returns the count removed.
    pub fn delete_feedback_by_repo(&self, repo_id: &str) -> DevacResult<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM feedback WHERE repo_id = ?", params![repo_id])?)
    }

    /// Delete all feedback from a source. Returns the count removed.
    pub fn delete_feedback_by_source(&self, source: &str) -> DevacResult<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM feedback WHERE source = ?", params![source])?)
    }

    /// Counts grouped by severity or source, descending.
    pub fn feedback_summary(&self, group_by: FeedbackGroupBy) -> DevacResult<Vec<(String, usize)>> {
        let column = match group_by {
            FeedbackGroupBy::Severity => "severity",
            FeedbackGroupBy::Source => "source",
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM feedback GROUP BY {column} ORDER BY COUNT(*) DESC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        let mut summary = Vec::new();
        for row in rows {
            summary.push(row?);
        }
        Ok(summary)
    }

    // -- query cache --------------------------------------------------------

    /// Cache a query result under its hash. A repeat overwrites the
    /// prior entry; `ttl_ms` of zero expires immediately.
    pub fn cache_query(
        &self,
        query_hash: &str,
        result: &serde_json::Value,
        ttl_ms: Option<i64>,
    ) -> DevacResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let payload =
            serde_json::to_string(result).map_err(|e| DevacError::Serialization(e.to_string()))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO query_cache (query_hash, result, cached_at, ttl_ms)
             VALUES (?, ?, ?, ?)",
            params![query_hash, payload, now, ttl_ms.unwrap_or(DEFAULT_CACHE_TTL_MS)],
        )?;
        Ok(())
    }

    /// A cached result, or `None` once past its TTL.
    pub fn get_cached_query(&self, query_hash: &str) -> DevacResult<Option<serde_json::Value>> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT result FROM query_cache
             WHERE query_hash = ? AND cached_at + ttl_ms > ?",
        )?;
        let mut rows = stmt.query_map(params![query_hash, now], |row| row.get::<_, String>(0))?;
        match rows.next().transpose()? {
            Some(payload) => Ok(serde_json::from_str(&payload).ok()),
            None => Ok(None),
        }
    }

    /// Drop every cache entry.
    pub fn clear_cache(&self) -> DevacResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("DELETE FROM query_cache")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn repo_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<RepoRegistration> {
    Ok(RepoRegistration {
        repo_id: row.get(0)?,
        local_path: PathBuf::from(row.get::<_, String>(1)?),
        manifest_hash: row.get(2)?,
        last_synced: row.get(3)?,
        status: RepoStatus::from_str_lossy(&row.get::<_, String>(4)?),
    })
}

fn edge_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<CrossRepoEdge> {
    Ok(CrossRepoEdge {
        source_repo: row.get(0)?,
        source_entity_id: row.get(1)?,
        target_repo: row.get(2)?,
        target_entity_id: row.get(3)?,
        edge_type: EdgeKind::from_str_lossy(&row.get::<_, String>(4)?),
        metadata: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn domain_effect_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<DomainEffect> {
    Ok(DomainEffect {
        source_effect_id: row.get(0)?,
        domain: row.get(1)?,
        action: row.get(2)?,
        rule_id: row.get(3)?,
        rule_name: row.get(4)?,
        original_effect_type: row.get(5)?,
        source_entity_id: row.get(6)?,
        file_path: row.get(7)?,
        start_line: row.get::<_, i32>(8)? as u32,
        metadata: serde_json::from_str(&row.get::<_, String>(9)?)
            .unwrap_or(serde_json::Value::Null),
    })
}

fn feedback_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<FeedbackItem> {
    Ok(FeedbackItem {
        feedback_id: row.get(0)?,
        repo_id: row.get(1)?,
        source: row.get(2)?,
        file_path: row.get(3)?,
        line_number: row.get::<_, Option<i32>>(4)?.map(|n| n as u32),
        severity: FeedbackSeverity::from_str_lossy(&row.get::<_, String>(5)?),
        category: row.get(6)?,
        title: row.get(7)?,
        description: row.get(8)?,
        resolved: row.get(9)?,
        actionable: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        github_pr_number: row.get::<_, Option<i32>>(13)?.map(|n| n as u32),
        workflow_name: row.get(14)?,
        ci_url: row.get(15)?,
    })
}
