use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::ScoringConfig;
use crate::oracle::{OracleVerdict, ScoringError, ScoringOracle};
use crate::store::ScoreStore;
use crate::types::{Note, Result, ScoreRecord, ScoringOutcome, SkipReason};

/// Process-wide courtesy throttle: enforces a minimum delay between
/// consecutive oracle dispatches. All concurrent callers serialize through
/// the slot, so the aggregate call rate never exceeds the ceiling.
pub struct RateGate {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Waits for the inter-call interval while holding the slot.
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Cooperative cancellation for a scoring run: in-flight calls finish, no
/// new calls are dispatched.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<RwLock<bool>>,
}

impl StopHandle {
    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("Scoring cancellation requested");
    }
}

/// Submits every new or changed note to the oracle, with bounded retry,
/// shared rate limiting and bounded concurrency. One note's failure never
/// aborts the batch.
pub struct ScoringPipeline {
    oracle: Arc<dyn ScoringOracle>,
    gate: RateGate,
    config: ScoringConfig,
    running: Arc<RwLock<bool>>,
}

impl ScoringPipeline {
    pub fn new(oracle: Arc<dyn ScoringOracle>, config: ScoringConfig) -> Self {
        let gate = RateGate::new(Duration::from_millis(config.request_delay_ms));
        Self {
            oracle,
            gate,
            config,
            running: Arc::new(RwLock::new(true)),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    /// Score every note that lacks a current record, upserting each success
    /// into the store as it completes. Returns the batch partition.
    pub async fn score_batch(
        &self,
        notes: &[Note],
        store: &mut ScoreStore,
    ) -> Result<ScoringOutcome> {
        let mut outcome = ScoringOutcome::default();
        let mut pending: Vec<Note> = Vec::new();
        for note in notes {
            if needs_scoring(note, store) {
                pending.push(note.clone());
            } else {
                outcome.unchanged += 1;
            }
        }

        info!(
            "Scoring {} notes with {} ({} already current)",
            pending.len(),
            self.oracle.oracle_name(),
            outcome.unchanged
        );

        let mut results = stream::iter(pending)
            .map(|note| async move {
                if !*self.running.read().await {
                    return (note, Err(SkipReason::Cancelled));
                }
                match self.score_with_retry(&note).await {
                    Ok(verdict) => (note, Ok(verdict)),
                    Err(err) => (note, Err(SkipReason::from(err))),
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1));

        while let Some((note, result)) = results.next().await {
            match result {
                Ok(verdict) => {
                    let record = ScoreRecord {
                        author: note.key.author.clone(),
                        task: note.key.task.clone(),
                        score: verdict.score,
                        comment: verdict.comment,
                        content_length: note.content_chars(),
                        scored_at: Utc::now(),
                    };
                    store.upsert(record)?;
                    outcome.scored.push(note.key);
                }
                Err(reason) => {
                    warn!("Note {} left unscored: {}", note.key, reason);
                    outcome.skipped.push((note.key, reason));
                }
            }
        }

        info!(
            "Scoring finished: {} scored, {} skipped",
            outcome.scored.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    /// Retry policy per failure class: RateLimited/Timeout retried up to
    /// the attempt cap with exponential backoff; InvalidResponse retried
    /// exactly once with the strict prompt; OracleRejected never retried.
    async fn score_with_retry(
        &self,
        note: &Note,
    ) -> std::result::Result<OracleVerdict, ScoringError> {
        let retry_seed = Duration::from_millis(self.config.retry_delay_ms);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: retry_seed,
            initial_interval: retry_seed,
            max_interval: retry_seed * 8,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.dispatch(note, false).await {
                Ok(verdict) => return Ok(verdict),
                Err(err @ (ScoringError::RateLimited | ScoringError::Timeout)) => {
                    if attempt >= max_attempts {
                        warn!(
                            "Giving up on {} after {} attempts: {}",
                            note.key, attempt, err
                        );
                        return Err(err);
                    }
                    let delay = backoff.next_backoff().unwrap_or(retry_seed);
                    warn!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt, note.key, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(ScoringError::InvalidResponse(_)) => {
                    warn!(
                        "Unparseable verdict for {}, retrying once with a strict prompt",
                        note.key
                    );
                    return self.dispatch(note, true).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One oracle call: pays the rate gate, then runs under the mandatory
    /// per-call timeout.
    async fn dispatch(
        &self,
        note: &Note,
        strict: bool,
    ) -> std::result::Result<OracleVerdict, ScoringError> {
        self.gate.acquire().await;
        let call = self.oracle.score_one(note, strict);
        match tokio::time::timeout(Duration::from_secs(self.config.timeout_seconds), call).await {
            Ok(result) => result,
            Err(_) => Err(ScoringError::Timeout),
        }
    }
}

/// A note needs scoring when no record exists or the canonical content
/// changed since it was last scored.
fn needs_scoring(note: &Note, store: &ScoreStore) -> bool {
    match store.get(&note.key) {
        None => true,
        Some(record) => record.content_length != note.content_chars(),
    }
}
