use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use note_analyzer::{
    AnalysisPipeline, AnalyzerConfig, LlmOracle, MockOracle, RankStrategy, ScoringOracle,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "note-analyzer", about = "Learning-note analysis and scoring pipeline")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a crawler JSON dump into the article store.
    Ingest {
        /// JSON file containing an array of crawled article records.
        file: PathBuf,
    },
    /// Run classification, aggregation, scoring and ranking, then write
    /// the report files.
    Analyze {
        /// Use the deterministic mock oracle instead of the LLM endpoint.
        #[arg(long)]
        offline: bool,

        /// Override the configured ranking strategy.
        #[arg(long)]
        rank_by: Option<RankStrategy>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AnalyzerConfig::load(&cli.config)?;

    match cli.command {
        Command::Ingest { file } => {
            let pipeline = AnalysisPipeline::new(config, None);
            let summary = pipeline.ingest_file(&file)?;
            info!(
                "Ingest complete: {} added, {} duplicates skipped",
                summary.added, summary.skipped_duplicate
            );
        }
        Command::Analyze { offline, rank_by } => {
            let oracle: Option<Arc<dyn ScoringOracle>> = if !config.scoring.enabled {
                None
            } else if offline {
                info!("Running with the mock oracle (--offline)");
                Some(Arc::new(MockOracle::new(80)))
            } else {
                match LlmOracle::new(&config.scoring) {
                    Ok(oracle) => Some(Arc::new(oracle)),
                    Err(e) => {
                        error!("Failed to initialize the scoring oracle: {}", e);
                        return Err(e.into());
                    }
                }
            };

            let pipeline = AnalysisPipeline::new(config, oracle);
            let report = pipeline.run(rank_by).await?;
            info!(
                "Report {} generated: {} notes, {} scored, {} skipped",
                report.run_id,
                report.summary.total_notes,
                report.summary.scored,
                report.summary.skipped
            );
        }
    }

    Ok(())
}
