//! DevAC CLI.
//!
//! Command-line interface over the engine: package sync, federated hub
//! queries, integrity verification, and hub registry management.
//!
//! Exit codes: 0 success, 1 sync failed, 2 verifier failed, 3 hub
//! unavailable, 4 prerequisites unmet.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use devac_core::hub::FeedbackFilter;
use devac_core::query::QueryOptions;
use devac_core::types::{RepoRegistration, RepoStatus};
use devac_core::verify::IntegrityVerifier;
use devac_core::{CentralHub, Config, FederatedQuery, StorePool, SyncOrchestrator};

const EXIT_SYNC_FAILED: u8 = 1;
const EXIT_VERIFY_FAILED: u8 = 2;
const EXIT_HUB_UNAVAILABLE: u8 = 3;
const EXIT_PREREQUISITES: u8 = 4;

/// DevAC - workspace-scale code graph engine
#[derive(Parser, Debug)]
#[command(name = "devac", version, about = "Code graph sync and federated query")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Hub directory (defaults to the platform data dir or DEVAC_HUB_DIR).
    #[arg(long, global = true)]
    hub_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync a package: build seeds, resolve refs, run rules, verify.
    Sync {
        /// Package directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Repo id to sync under.
        #[arg(long, default_value = "local")]
        repo: String,

        /// Seed branch to write.
        #[arg(long, default_value = "base")]
        branch: String,
    },

    /// Run a federated SQL query across all registered packages.
    Query {
        /// SQL, with optional @package / @* macros.
        sql: String,

        /// Seed branch to read.
        #[arg(long, default_value = "base")]
        branch: String,

        /// Emit rows as JSON lines instead of aligned text.
        #[arg(long)]
        json: bool,
    },

    /// Verify a package's seed integrity.
    Verify {
        /// Package directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Seed branch to verify.
        #[arg(long, default_value = "base")]
        branch: String,
    },

    /// Manage the hub registry.
    Hub {
        #[command(subcommand)]
        command: HubCommands,
    },
}

#[derive(Subcommand, Debug)]
enum HubCommands {
    /// Register a repo (upserts on duplicate id).
    Add {
        /// Repo id.
        repo_id: String,
        /// Local repo path.
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Unregister a repo, cascading its cross-repo edges.
    Remove {
        /// Repo id.
        repo_id: String,
    },
    /// List registered repos.
    List,
    /// Show unresolved feedback counts by severity.
    Feedback,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_level.clone())
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            return ExitCode::from(EXIT_PREREQUISITES);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_SYNC_FAILED)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let hub_dir = cli.hub_dir.clone().unwrap_or_else(Config::hub_dir);

    match cli.command {
        Commands::Sync { path, repo, branch } => {
            if !path.is_dir() {
                eprintln!("error: {} is not a directory", path.display());
                return Ok(ExitCode::from(EXIT_PREREQUISITES));
            }
            let config = match Config::load(&path) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("error: failed to load config: {err}");
                    return Ok(ExitCode::from(EXIT_PREREQUISITES));
                }
            };
            let pool = match StorePool::new(&config.store) {
                Ok(pool) => pool,
                Err(err) => {
                    eprintln!("error: failed to initialize store: {err}");
                    return Ok(ExitCode::from(EXIT_PREREQUISITES));
                }
            };

            let hub = match CentralHub::open(&hub_dir) {
                Ok(hub) => Some(Arc::new(hub)),
                Err(err) => {
                    tracing::warn!(error = %err, "hub unavailable, syncing without registry");
                    None
                }
            };

            let orchestrator = SyncOrchestrator::new(&config, pool.clone(), hub);
            let report = orchestrator
                .sync(&repo, &path, &branch, &CancellationToken::new())
                .await;
            pool.shutdown();

            match report {
                Ok(report) => {
                    println!(
                        "synced {} [{}]: {} parsed, {} unchanged, {} deleted, {} resolved, {} domain effects",
                        path.display(),
                        branch,
                        report.build.files_parsed,
                        report.build.files_unchanged,
                        report.build.files_deleted,
                        report.resolve.resolved,
                        report.domain_effects.len(),
                    );
                    for warning in &report.warnings {
                        eprintln!("warning: {warning}");
                    }
                    if !report.verify.valid {
                        for error in &report.verify.errors {
                            eprintln!("verify error: {error}");
                        }
                        return Ok(ExitCode::from(EXIT_VERIFY_FAILED));
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    eprintln!("sync failed: {err}");
                    Ok(ExitCode::from(EXIT_SYNC_FAILED))
                }
            }
        }

        Commands::Query { sql, branch, json } => {
            let hub = match CentralHub::open(&hub_dir) {
                Ok(hub) => hub,
                Err(err) => {
                    eprintln!("hub unavailable: {err}");
                    return Ok(ExitCode::from(EXIT_HUB_UNAVAILABLE));
                }
            };

            let config = Config::default();
            let pool = match StorePool::new(&config.store) {
                Ok(pool) => pool,
                Err(err) => {
                    eprintln!("error: failed to initialize store: {err}");
                    return Ok(ExitCode::from(EXIT_PREREQUISITES));
                }
            };
            let query = FederatedQuery::new(pool.clone());
            let result = query
                .hub_query(&hub, &sql, &QueryOptions { branch, ..QueryOptions::default() })
                .await;
            pool.shutdown();

            match result {
                Ok(result) => {
                    if json {
                        for row in &result.rows {
                            println!("{}", serde_json::to_string(row)?);
                        }
                    } else {
                        print_rows(&result.rows);
                    }
                    eprintln!("{} rows in {}ms", result.row_count, result.time_ms);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    eprintln!("query failed: {err}");
                    Ok(ExitCode::from(EXIT_SYNC_FAILED))
                }
            }
        }

        Commands::Verify { path, branch } => {
            let config = match Config::load(&path) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("error: failed to load config: {err}");
                    return Ok(ExitCode::from(EXIT_PREREQUISITES));
                }
            };
            let pool = match StorePool::new(&config.store) {
                Ok(pool) => pool,
                Err(err) => {
                    eprintln!("error: failed to initialize store: {err}");
                    return Ok(ExitCode::from(EXIT_PREREQUISITES));
                }
            };
            let report = IntegrityVerifier::new(pool.clone()).verify(&path, &branch).await;
            pool.shutdown();

            match report {
                Ok(report) => {
                    println!(
                        "{}: {} nodes, {} edges, {} refs ({} unresolved), {} files",
                        if report.valid { "valid" } else { "INVALID" },
                        report.stats.node_count,
                        report.stats.edge_count,
                        report.stats.ref_count,
                        report.stats.unresolved_refs,
                        report.stats.file_count,
                    );
                    for warning in &report.warnings {
                        eprintln!("warning: {warning}");
                    }
                    for error in &report.errors {
                        eprintln!("error: {error}");
                    }
                    if report.valid {
                        Ok(ExitCode::SUCCESS)
                    } else {
                        Ok(ExitCode::from(EXIT_VERIFY_FAILED))
                    }
                }
                Err(err) => {
                    eprintln!("verification failed to run: {err}");
                    Ok(ExitCode::from(EXIT_VERIFY_FAILED))
                }
            }
        }

        Commands::Hub { command } => {
            let hub = match CentralHub::open(&hub_dir) {
                Ok(hub) => hub,
                Err(err) => {
                    eprintln!("hub unavailable: {err}");
                    return Ok(ExitCode::from(EXIT_HUB_UNAVAILABLE));
                }
            };

            match command {
                HubCommands::Add { repo_id, path } => {
                    let canonical = match path.canonicalize() {
                        Ok(canonical) => canonical,
                        Err(err) => {
                            eprintln!("error: cannot resolve {}: {err}", path.display());
                            return Ok(ExitCode::from(EXIT_PREREQUISITES));
                        }
                    };
                    if let Err(err) = hub.add_repo(&RepoRegistration {
                        repo_id: repo_id.clone(),
                        local_path: canonical,
                        manifest_hash: String::new(),
                        last_synced: 0,
                        status: RepoStatus::Active,
                    }) {
                        return Ok(hub_failure(&err));
                    }
                    println!("registered {repo_id}");
                }
                HubCommands::Remove { repo_id } => match hub.remove_repo(&repo_id) {
                    Ok(true) => println!("removed {repo_id}"),
                    Ok(false) => eprintln!("{repo_id} was not registered"),
                    Err(err) => return Ok(hub_failure(&err)),
                },
                HubCommands::List => match hub.list_repos() {
                    Ok(repos) => {
                        for repo in repos {
                            println!(
                                "{}\t{}\t{}\tlast_synced={}",
                                repo.repo_id,
                                repo.status.as_str(),
                                repo.local_path.display(),
                                repo.last_synced,
                            );
                        }
                    }
                    Err(err) => return Ok(hub_failure(&err)),
                },
                HubCommands::Feedback => {
                    let unresolved = match hub.query_feedback(&FeedbackFilter {
                        resolved: Some(false),
                        ..FeedbackFilter::default()
                    }) {
                        Ok(items) => items,
                        Err(err) => return Ok(hub_failure(&err)),
                    };
                    println!("{} unresolved items", unresolved.len());
                    match hub.feedback_summary(devac_core::hub::FeedbackGroupBy::Severity) {
                        Ok(summary) => {
                            for (severity, count) in summary {
                                println!("  {severity}: {count}");
                            }
                        }
                        Err(err) => return Ok(hub_failure(&err)),
                    }
                }
            }
            hub.shutdown();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print a hub operation failure and produce the hub-unavailable code.
fn hub_failure(err: &devac_core::DevacError) -> ExitCode {
    eprintln!("hub error: {err}");
    ExitCode::from(EXIT_HUB_UNAVAILABLE)
}

/// Minimal aligned text rendering of row maps.
fn print_rows(rows: &[serde_json::Map<String, serde_json::Value>]) {
    let Some(first) = rows.first() else {
        println!("(no rows)");
        return;
    };
    let columns: Vec<&String> = first.keys().collect();
    println!("{}", columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join("\t"));
    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|c| match row.get(*c) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => String::new(),
            })
            .collect();
        println!("{}", line.join("\t"));
    }
}
