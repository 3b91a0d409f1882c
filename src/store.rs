use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::types::{ArticleRecord, IngestSummary, NoteKey, Result, ScoreRecord};

/// Persisted collection of crawled articles with dedup-aware insert and
/// incremental-diff queries.
///
/// Records are kept in insertion order; a fingerprint index enforces
/// set-insert semantics, so ingesting the same batch twice is a no-op.
pub struct ArticleStore {
    path: PathBuf,
    records: Vec<ArticleRecord>,
    index: HashMap<String, usize>,
}

impl ArticleStore {
    /// Open the store at `path`, loading the existing snapshot if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: Vec<ArticleRecord> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };

        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            index.entry(record.fingerprint()).or_insert(position);
        }

        info!(
            "Opened article store at {} with {} records",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            records,
            index,
        })
    }

    /// Ingest a batch of crawled records. Duplicates (same fingerprint) are
    /// counted and discarded; the first-written record wins.
    pub fn ingest(&mut self, batch: Vec<ArticleRecord>) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();

        for record in batch {
            let fingerprint = record.fingerprint();
            if self.index.contains_key(&fingerprint) {
                debug!("Skipping duplicate article: {}", record.title);
                summary.skipped_duplicate += 1;
                continue;
            }
            self.index.insert(fingerprint, self.records.len());
            self.records.push(record);
            summary.added += 1;
        }

        if summary.added > 0 {
            self.persist()?;
        }
        info!(
            "Ingested batch: {} added, {} duplicates skipped",
            summary.added, summary.skipped_duplicate
        );
        Ok(summary)
    }

    /// Records published strictly after `cursor`. Advancing the cursor is
    /// the caller's responsibility; the store only answers "what's new".
    pub fn diff_since(&self, cursor: DateTime<Utc>) -> Vec<&ArticleRecord> {
        self.records
            .iter()
            .filter(|record| record.published_at > cursor)
            .collect()
    }

    /// All records in insertion order.
    pub fn all(&self) -> &[ArticleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<()> {
        write_json_snapshot(&self.path, &self.records)
    }
}

/// Persisted map from note identity to its latest oracle grade.
///
/// The scoring pipeline is the sole writer; `upsert` is last-write-wins
/// per key and flushes immediately so an interrupted run resumes cleanly.
pub struct ScoreStore {
    path: PathBuf,
    records: HashMap<NoteKey, ScoreRecord>,
}

impl ScoreStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stored: Vec<ScoreRecord> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };

        let mut records = HashMap::with_capacity(stored.len());
        for record in stored {
            records.insert(record.key(), record);
        }

        info!(
            "Opened score store at {} with {} records",
            path.display(),
            records.len()
        );
        Ok(Self { path, records })
    }

    /// Insert or replace the grade for the record's note key.
    pub fn upsert(&mut self, record: ScoreRecord) -> Result<()> {
        debug!("Upserting score {} for {}", record.score, record.key());
        self.records.insert(record.key(), record);
        self.persist()
    }

    pub fn get(&self, key: &NoteKey) -> Option<&ScoreRecord> {
        self.records.get(key)
    }

    /// All records, ordered by note key for deterministic output.
    pub fn all(&self) -> Vec<&ScoreRecord> {
        let mut records: Vec<&ScoreRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let snapshot: Vec<&ScoreRecord> = self.all();
        write_json_snapshot(&self.path, &snapshot)
    }
}

/// Serialize to a sibling temp file, then rename over the target, so a
/// failed write leaves the committed snapshot intact.
fn write_json_snapshot<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialized = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, serialized)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
