use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mixer_core::importer::{load_all, LoadPaths};
use mixer_core::inverted::{build_index, DOCUMENTS, TERMS};
use mixer_core::mapreduce::JobConfig;
use mixer_core::pagerank::{run_pagerank, PageRankConfig};
use mixer_core::IndexStore;
use tracing_subscriber::{EnvFilter, fmt};

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build the inverted index and PageRank, and load them into the store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct TaskArgs {
    /// Parallel map tasks (defaults to the number of CPUs)
    #[arg(long)]
    map_tasks: Option<usize>,
    /// Reduce partitions, one part file each
    #[arg(long)]
    reduce_tasks: Option<usize>,
}

impl TaskArgs {
    fn job_config(&self) -> JobConfig {
        let defaults = JobConfig::default();
        JobConfig {
            map_tasks: self.map_tasks.unwrap_or(defaults.map_tasks),
            reduce_tasks: self.reduce_tasks.unwrap_or(defaults.reduce_tasks),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the inverted index from the corpus data file(s)
    Mapreduce {
        /// Corpus data file or directory of files
        #[arg(long)]
        input: PathBuf,
        /// Output directory for part files
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        tasks: TaskArgs,
    },
    /// Iterate PageRank over the link file(s) until convergence
    Pagerank {
        #[arg(long)]
        links: PathBuf,
        /// Corpus index or data file; every document becomes a node
        #[arg(long)]
        documents: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0.85)]
        damping: f64,
        #[arg(long, default_value_t = 1e-6)]
        epsilon: f64,
        /// 0 iterates until convergence with no limit
        #[arg(long, default_value_t = 100)]
        max_iterations: usize,
        #[command(flatten)]
        tasks: TaskArgs,
    },
    /// Load titles, postings, lengths and ranks into the store
    Import {
        #[arg(long)]
        db: PathBuf,
        /// Corpus data file
        #[arg(long)]
        data: PathBuf,
        /// Corpus index file (id, title)
        #[arg(long)]
        index: PathBuf,
        /// Index builder output (file or directory)
        #[arg(long)]
        postings: PathBuf,
        /// PageRank output (pagerank.txt or an iteration directory)
        #[arg(long)]
        pagerank: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Mapreduce { input, output, tasks } => {
            let report = build_index(&input, &output, &tasks.job_config())?;
            tracing::info!(
                documents = report.counters.get(DOCUMENTS),
                terms = report.counters.get(TERMS),
                parts = report.parts.len(),
                "index written to {}",
                report.output.display()
            );
        }
        Commands::Pagerank { links, documents, output, damping, epsilon, max_iterations, tasks } => {
            let config = PageRankConfig {
                damping,
                epsilon,
                max_iterations: (max_iterations > 0).then_some(max_iterations),
                job: tasks.job_config(),
            };
            let report = run_pagerank(&links, documents.as_deref(), &output, &config)?;
            tracing::info!(
                documents = report.documents,
                dangling = report.dangling,
                dropped_links = report.dropped_links,
                iterations = report.iterations,
                converged = report.converged,
                "ranks written to {}",
                report.output.display()
            );
        }
        Commands::Import { db, data, index, postings, pagerank } => {
            let store = IndexStore::open(&db)?;
            let report = load_all(&store, &LoadPaths { data, index, postings, pagerank })?;
            for (loader, outcome) in &report.outcomes {
                match outcome {
                    Ok(summary) => tracing::info!(
                        loader,
                        records = summary.records,
                        skipped = summary.skipped,
                        elapsed = ?summary.elapsed,
                        "loaded"
                    ),
                    Err(reason) => tracing::error!(loader, %reason, "not loaded"),
                }
            }
            if !report.is_complete() {
                bail!("loaders failed: {}", report.failed().join(", "));
            }
        }
    }
    Ok(())
}
