//! # devac-core
//!
//! Workspace-scale code graph engine. Source repositories are parsed
//! per package into a language-neutral graph of nodes, edges, external
//! refs, and code effects, persisted as immutable columnar parquet with
//! a base/branch partitioning scheme, and queried through a federated
//! SQL surface that spans every registered repository without copying
//! data.
//!
//! ## Architecture
//!
//! The engine is split into decoupled subsystems:
//!
//! - **`identity` / `uri`** -- Stable entity ids and `devac://` URIs
//! - **`store`** -- Pooled DuckDB handles, parquet I/O, fatal-error recovery
//! - **`schema`** -- Canonical schemas, seed layout, unified-view SQL
//! - **`parser`** -- Parser contract + TypeScript/JavaScript and Python drivers
//! - **`builder`** -- Per-package ingestion with hash diffing and tombstones
//! - **`resolver`** -- Cross-file import binding, pluggable per language
//! - **`rules`** -- Prioritized rewriting of code effects into domain effects
//! - **`hub`** -- Central registry, cross-repo edges, feedback, query cache
//! - **`query`** -- `@package` macro SQL federated over all seeds
//! - **`sync`** -- The per-package build/resolve/rules/hub/verify pipeline
//! - **`verify`** -- Integrity checks over a seed partition
//!
//! Modules communicate via the records in `types`; errors funnel into
//! `error::DevacError`.

pub mod config;
pub mod error;
pub mod types;

pub mod identity;
pub mod uri;

pub mod builder;
pub mod hub;
pub mod parser;
pub mod query;
pub mod resolver;
pub mod rules;
pub mod schema;
pub mod store;
pub mod sync;
pub mod verify;

/// Re-export the primary engine interfaces.
pub use config::Config;
pub use error::{DevacError, DevacResult};
pub use hub::CentralHub;
pub use query::FederatedQuery;
pub use store::StorePool;
pub use sync::SyncOrchestrator;
