//! CLI command implementations.
//!
//! A thin operational shim over the library: query a project, inspect
//! graph statistics, and run duplicate detection.

// CLI output goes to stdout/stderr by design.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use crate::graph::{FindDuplicatesOptions, MergeOptions};
use crate::models::ContextFormat;
use crate::service::{QueryOptions, RetrievalService};
use crate::{RepolensConfig, Result};
use clap::{Parser, Subcommand};

/// Repository knowledge base serving relevance-ranked context to AI coding
/// assistants.
#[derive(Debug, Parser)]
#[command(name = "repolens", version, about)]
pub struct Cli {
    /// Database path override.
    #[arg(long, env = "REPOLENS_DB_PATH", global = true)]
    pub db_path: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Query a project for relevant context.
    Query {
        /// Project name.
        project: String,
        /// Natural-language query.
        query: String,
        /// Output format (markdown, xml, plain).
        #[arg(long, default_value = "markdown")]
        format: String,
        /// Token budget for the assembled context.
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Maximum candidates.
        #[arg(long)]
        max_results: Option<usize>,
        /// Skip the admission gate.
        #[arg(long)]
        no_gate: bool,
    },
    /// Print graph statistics for a project.
    Stats {
        /// Project name.
        project: String,
    },
    /// Detect and merge duplicate entities in a project.
    Dedupe {
        /// Project name.
        project: String,
        /// Similarity threshold.
        #[arg(long, default_value_t = 0.85)]
        threshold: f32,
        /// Report groups without merging.
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    /// Runs the parsed command.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying operation fails.
    pub fn run(self) -> Result<()> {
        let mut config = RepolensConfig::from_env();
        if let Some(db_path) = self.db_path {
            config.db_path = db_path;
        }
        let service = RetrievalService::new(config)?;

        match self.command {
            Command::Query {
                project,
                query,
                format,
                max_tokens,
                max_results,
                no_gate,
            } => {
                let options = QueryOptions {
                    gate: !no_gate,
                    max_tokens,
                    max_results,
                    format: ContextFormat::parse(&format),
                    ..Default::default()
                };
                let result = service.query_context(&project, &query, &options)?;
                if result.context.is_empty() {
                    eprintln!("no relevant context (confidence {:.2})", result.confidence);
                } else {
                    println!("{}", result.context);
                    eprintln!(
                        "confidence {:.2}, {} tokens{}",
                        result.confidence,
                        result.tokens_used,
                        if result.truncated { ", truncated" } else { "" },
                    );
                }
            },
            Command::Stats { project } => {
                let stats = service.traversal(&project)?.get_statistics()?;
                println!("entities:       {}", stats.entity_count);
                println!("relationships:  {}", stats.relationship_count);
                println!("average degree: {:.2}", stats.average_degree);
                let mut by_type: Vec<_> = stats.relationships_by_type.iter().collect();
                by_type.sort_by(|a, b| b.1.cmp(a.1));
                for (ty, count) in by_type {
                    println!("  {ty}: {count}");
                }
                if !stats.top_connected_entities.is_empty() {
                    println!("most connected:");
                    for (id, degree) in &stats.top_connected_entities {
                        println!("  {id} ({degree})");
                    }
                }
            },
            Command::Dedupe {
                project,
                threshold,
                dry_run,
            } => {
                let resolver = service.resolver(&project)?;
                let groups = resolver.find_duplicates(&FindDuplicatesOptions {
                    threshold,
                    ..Default::default()
                })?;
                if groups.is_empty() {
                    println!("no duplicate groups found");
                    return Ok(());
                }
                for group in &groups {
                    println!(
                        "{} <= {} (similarity {:.2})",
                        group.primary.name,
                        group
                            .duplicates
                            .iter()
                            .map(|d| d.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                        group.similarity,
                    );
                    if !dry_run {
                        let duplicate_ids: Vec<_> =
                            group.duplicates.iter().map(|d| d.id.clone()).collect();
                        let outcome = resolver.merge(
                            &group.primary.id,
                            &duplicate_ids,
                            &MergeOptions::default(),
                        )?;
                        println!(
                            "  merged {} entities, {} edges redirected, {} aliases added",
                            outcome.merged_count,
                            outcome.relationships_redirected,
                            outcome.aliases_added,
                        );
                    }
                }
            },
        }
        Ok(())
    }
}
