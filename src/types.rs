use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::oracle::ScoringError;

/// A crawled forum article as delivered by the external crawler.
///
/// Immutable once ingested; re-crawled duplicates are identified by
/// [`ArticleRecord::fingerprint`] and dropped, never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Source thread id, used to build the public note link.
    pub id: String,
    pub title: String,
    pub author_name: String,
    pub task_name: Option<String>,
    pub content: String,
    pub views: u64,
    pub likes: u64,
    pub replies: u64,
    pub published_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Stable content fingerprint: SHA-256 over title, author and publish
    /// timestamp. Dedup identity for ingestion.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.author_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.published_at.timestamp_millis().to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Content length in characters, the unit the scoring reports use.
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Derived note identity: one author checking into one task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteKey {
    pub author: String,
    pub task: String,
}

impl std::fmt::Display for NoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.author, self.task)
    }
}

/// A recognized check-in task, e.g. `DAY3` with index 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLabel {
    pub index: u32,
    pub name: String,
}

impl TaskLabel {
    pub fn from_index(index: u32) -> Self {
        Self {
            index,
            name: format!("DAY{}", index),
        }
    }
}

/// The canonical check-in note chosen for a [`NoteKey`], projected out of
/// the winning [`ArticleRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub key: NoteKey,
    pub task_index: u32,
    pub article_id: String,
    pub title: String,
    pub content: String,
    pub views: u64,
    pub likes: u64,
    pub replies: u64,
    pub published_at: DateTime<Utc>,
}

impl Note {
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Per-task check-in statistics, recomputed from scratch each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStat {
    pub task: String,
    pub task_index: u32,
    pub total_checkins: usize,
    /// Distinct authors who checked in, sorted by name.
    pub participants: Vec<String>,
    pub expected_population: usize,
    /// Distinct participants over expected population, in [0, 1].
    pub completion_ratio: f64,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_replies: u64,
    pub avg_content_length: f64,
}

/// Per-author participation statistics, recomputed from scratch each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStat {
    pub author: String,
    /// Sorted distinct task indices this author checked into.
    pub task_indices: Vec<u32>,
    pub tasks: Vec<String>,
    pub total_notes: usize,
    pub longest_streak: u32,
    /// Run of consecutive check-ins ending at the dataset's latest task
    /// index; 0 when the author is absent there.
    pub current_streak: u32,
    /// Distinct tasks over the dataset's distinct task count, in [0, 1].
    pub completion_rate: f64,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_replies: u64,
    pub avg_content_length: f64,
    pub average_score: Option<f64>,
}

/// Latest oracle grade for one note. Exists only after a successful
/// scoring call; absence means "not yet scored", never "scored as zero".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub author: String,
    pub task: String,
    /// Oracle grade in [0, 100].
    pub score: u8,
    pub comment: String,
    pub content_length: usize,
    pub scored_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn key(&self) -> NoteKey {
        NoteKey {
            author: self.author.clone(),
            task: self.task.clone(),
        }
    }
}

/// One row of a ranking: derived on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub author: String,
    pub checkin_count: usize,
    pub average_score: f64,
    pub current_streak: u32,
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub added: usize,
    pub skipped_duplicate: usize,
}

/// Why a note ended up unscored in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RateLimited,
    Timeout,
    InvalidResponse,
    OracleRejected(String),
    Cancelled,
}

impl From<ScoringError> for SkipReason {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::RateLimited => SkipReason::RateLimited,
            ScoringError::Timeout => SkipReason::Timeout,
            ScoringError::InvalidResponse(_) => SkipReason::InvalidResponse,
            ScoringError::OracleRejected(reason) => SkipReason::OracleRejected(reason),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::RateLimited => write!(f, "rate limited"),
            SkipReason::Timeout => write!(f, "timed out"),
            SkipReason::InvalidResponse => write!(f, "invalid oracle response"),
            SkipReason::OracleRejected(reason) => write!(f, "oracle rejected: {}", reason),
            SkipReason::Cancelled => write!(f, "cancelled before dispatch"),
        }
    }
}

/// Partition of one scoring batch. A failed note never aborts the rest.
#[derive(Debug, Clone, Default)]
pub struct ScoringOutcome {
    pub scored: Vec<NoteKey>,
    pub skipped: Vec<(NoteKey, SkipReason)>,
    /// Notes left alone because their stored score is still current.
    pub unchanged: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Report render error: {0}")]
    Render(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
