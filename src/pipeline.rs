use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregator::{TaskAggregator, UserAggregator};
use crate::classifier::NoteClassifier;
use crate::config::AnalyzerConfig;
use crate::oracle::ScoringOracle;
use crate::ranking::{RankStrategy, RankingEngine};
use crate::report::{AnalysisReport, ReportGenerator};
use crate::scoring::{ScoringPipeline, StopHandle};
use crate::store::{ArticleStore, ScoreStore};
use crate::types::{ArticleRecord, IngestSummary, Result};

/// End-to-end analysis pipeline: canonical notes out of the article store,
/// task/user aggregation, oracle scoring, ranking, report.
///
/// Aggregation is recomputed from scratch on every run, so the report is
/// always a pure function of the current canonical note set.
pub struct AnalysisPipeline {
    config: AnalyzerConfig,
    classifier: NoteClassifier,
    scoring: Option<ScoringPipeline>,
}

impl AnalysisPipeline {
    /// `oracle` is required when scoring is enabled in the config; pass
    /// `None` to run aggregation and ranking only.
    pub fn new(config: AnalyzerConfig, oracle: Option<Arc<dyn ScoringOracle>>) -> Self {
        let classifier = NoteClassifier::from_keywords(&config.analysis.filter_keywords);
        let scoring = if config.scoring.enabled {
            oracle.map(|oracle| ScoringPipeline::new(oracle, config.scoring.clone()))
        } else {
            None
        };
        Self {
            config,
            classifier,
            scoring,
        }
    }

    /// Handle for cancelling a scoring run in flight, when scoring is on.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.scoring.as_ref().map(|scoring| scoring.stop_handle())
    }

    /// Feed a crawler JSON dump (an array of article records) into the
    /// article store.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestSummary> {
        let raw = fs::read_to_string(path)?;
        let batch: Vec<ArticleRecord> = serde_json::from_str(&raw)?;
        info!("Read {} crawled records from {}", batch.len(), path.display());

        let mut store = ArticleStore::open(self.config.articles_path())?;
        store.ingest(batch)
    }

    /// Run the full analysis and write the report into the data directory.
    pub async fn run(&self, strategy_override: Option<RankStrategy>) -> Result<AnalysisReport> {
        let articles = ArticleStore::open(self.config.articles_path())?;
        let mut scores = ScoreStore::open(self.config.scores_path())?;

        let notes = self.classifier.canonical_notes(articles.all());
        info!(
            "Classified {} canonical notes out of {} articles",
            notes.len(),
            articles.len()
        );

        let task_stats =
            TaskAggregator::aggregate(&notes, self.config.tasks.expected_population);
        let mut user_stats = UserAggregator::aggregate(&notes);

        let outcome = match &self.scoring {
            Some(scoring) => scoring.score_batch(&notes, &mut scores).await?,
            None => {
                info!("Scoring disabled, ranking on existing scores only");
                Default::default()
            }
        };
        if !outcome.skipped.is_empty() {
            warn!(
                "{} notes left unscored this run",
                outcome.skipped.len()
            );
        }

        UserAggregator::apply_scores(&mut user_stats, &scores);

        let strategy = strategy_override.unwrap_or(self.config.ranking.default_strategy);
        let rankings = RankingEngine::rank(&user_stats, strategy);

        let report = ReportGenerator::build(
            articles.len(),
            &notes,
            &task_stats,
            &user_stats,
            &scores,
            rankings,
            &outcome.skipped,
            strategy,
        );
        ReportGenerator::write(&report, &scores, &notes, &self.config.data_dir)?;

        info!(
            "Analysis run {} complete: {} tasks, {} users, {} scored, {} skipped",
            report.run_id,
            report.summary.total_tasks,
            report.summary.total_users,
            report.summary.scored,
            report.summary.skipped
        );
        Ok(report)
    }
}
