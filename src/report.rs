use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::store::ScoreStore;
use crate::types::{
    AnalyzerError, Note, NoteKey, RankingEntry, Result, SkipReason, TaskStat, UserStat,
};

/// Headline numbers for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_articles: usize,
    pub total_notes: usize,
    pub total_tasks: usize,
    pub total_users: usize,
    pub scored: usize,
    pub skipped: usize,
    pub average_score: Option<f64>,
    pub max_score: Option<u8>,
    pub min_score: Option<u8>,
    pub score_stddev: Option<f64>,
}

/// A note left unscored in this run, with the reason, so unscorable
/// content is never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedNote {
    pub author: String,
    pub task: String,
    pub reason: String,
}

/// Structured analysis document: the pipeline terminus. Pure projection of
/// the aggregation, scoring and ranking results; no business logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub ranking_strategy: String,
    pub summary: ReportSummary,
    pub tasks: Vec<TaskStat>,
    pub users: Vec<UserStat>,
    pub rankings: Vec<RankingEntry>,
    pub skipped_notes: Vec<SkippedNote>,
}

pub struct ReportGenerator;

impl ReportGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        total_articles: usize,
        notes: &[Note],
        task_stats: &BTreeMap<u32, TaskStat>,
        user_stats: &BTreeMap<String, UserStat>,
        scores: &ScoreStore,
        rankings: Vec<RankingEntry>,
        skipped: &[(NoteKey, SkipReason)],
        strategy: impl std::fmt::Display,
    ) -> AnalysisReport {
        let all_scores: Vec<u8> = scores.all().into_iter().map(|record| record.score).collect();
        let summary = ReportSummary {
            total_articles,
            total_notes: notes.len(),
            total_tasks: task_stats.len(),
            total_users: user_stats.len(),
            scored: all_scores.len(),
            skipped: skipped.len(),
            average_score: mean(&all_scores),
            max_score: all_scores.iter().copied().max(),
            min_score: all_scores.iter().copied().min(),
            score_stddev: stddev(&all_scores),
        };

        AnalysisReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            ranking_strategy: strategy.to_string(),
            summary,
            tasks: task_stats.values().cloned().collect(),
            users: user_stats.values().cloned().collect(),
            rankings,
            skipped_notes: skipped
                .iter()
                .map(|(key, reason)| SkippedNote {
                    author: key.author.clone(),
                    task: key.task.clone(),
                    reason: reason.to_string(),
                })
                .collect(),
        }
    }

    pub fn to_json(report: &AnalysisReport) -> Result<String> {
        serde_json::to_string_pretty(report)
            .map_err(|e| AnalyzerError::Render(format!("report serialization failed: {}", e)))
    }

    /// Per-note score rows with the fixed column set downstream consumers
    /// expect: author, task, score, comment, content_length, title.
    pub fn score_rows_csv(scores: &ScoreStore, notes: &[Note]) -> String {
        let titles: BTreeMap<&NoteKey, &str> = notes
            .iter()
            .map(|note| (&note.key, note.title.as_str()))
            .collect();

        let mut csv = String::from("author,task,score,comment,content_length,title\n");
        for record in scores.all() {
            let key = record.key();
            let title = titles.get(&key).copied().unwrap_or("");
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                csv_field(&record.author),
                csv_field(&record.task),
                record.score,
                csv_field(&record.comment),
                record.content_length,
                csv_field(title),
            ));
        }
        csv
    }

    /// One row per ranked author.
    pub fn ranking_csv(rankings: &[RankingEntry]) -> String {
        let mut csv = String::from("rank,author,checkin_count,average_score,current_streak\n");
        for entry in rankings {
            csv.push_str(&format!(
                "{},{},{},{:.2},{}\n",
                entry.rank,
                csv_field(&entry.author),
                entry.checkin_count,
                entry.average_score,
                entry.current_streak,
            ));
        }
        csv
    }

    /// Write the nested JSON report plus both CSV exports into `dir`.
    /// Failure here is fatal to the report only, never to upstream state.
    pub fn write(
        report: &AnalysisReport,
        scores: &ScoreStore,
        notes: &[Note],
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let report_path = dir.join("report.json");
        fs::write(&report_path, Self::to_json(report)?)?;

        let scores_path = dir.join("note_scores.csv");
        fs::write(&scores_path, Self::score_rows_csv(scores, notes))?;

        let ranking_path = dir.join("ranking.csv");
        fs::write(&ranking_path, Self::ranking_csv(&report.rankings))?;

        info!("Report written to {}", dir.display());
        Ok(vec![report_path, scores_path, ranking_path])
    }
}

fn mean(scores: &[u8]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let total: u64 = scores.iter().map(|&s| s as u64).sum();
    Some(total as f64 / scores.len() as f64)
}

fn stddev(scores: &[u8]) -> Option<f64> {
    let mean = mean(scores)?;
    if scores.len() < 2 {
        return Some(0.0);
    }
    let variance = scores
        .iter()
        .map(|&s| {
            let diff = s as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / (scores.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
