use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{RankingEntry, UserStat};

/// Closed set of composite ranking keys. Each strategy is a tuple
/// comparison with explicit field order; the final tie-break is always the
/// author name ascending, so the resulting order is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankStrategy {
    /// Check-in count, then average score.
    CheckinsThenScore,
    /// Average score, then check-in count.
    ScoreThenCheckins,
    /// Current streak, then check-in count.
    StreakThenCheckins,
}

impl FromStr for RankStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "checkins_then_score" => Ok(RankStrategy::CheckinsThenScore),
            "score_then_checkins" => Ok(RankStrategy::ScoreThenCheckins),
            "streak_then_checkins" => Ok(RankStrategy::StreakThenCheckins),
            other => Err(format!(
                "unknown ranking strategy '{}' (expected checkins_then_score, score_then_checkins or streak_then_checkins)",
                other
            )),
        }
    }
}

impl std::fmt::Display for RankStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RankStrategy::CheckinsThenScore => "checkins_then_score",
            RankStrategy::ScoreThenCheckins => "score_then_checkins",
            RankStrategy::StreakThenCheckins => "streak_then_checkins",
        };
        write!(f, "{}", name)
    }
}

/// Sorts authors by the chosen composite key and assigns strict 1-based
/// ranks. Output is a derived view, never persisted.
pub struct RankingEngine;

impl RankingEngine {
    pub fn rank(user_stats: &BTreeMap<String, UserStat>, strategy: RankStrategy) -> Vec<RankingEntry> {
        let mut entries: Vec<RankingEntry> = user_stats
            .values()
            .map(|stat| RankingEntry {
                rank: 0,
                author: stat.author.clone(),
                checkin_count: stat.total_notes,
                average_score: stat.average_score.unwrap_or(0.0),
                current_streak: stat.current_streak,
            })
            .collect();

        entries.sort_by(|a, b| compare(a, b, strategy));
        for (position, entry) in entries.iter_mut().enumerate() {
            entry.rank = position + 1;
        }

        debug!("Ranked {} authors by {}", entries.len(), strategy);
        entries
    }
}

/// Descending on the strategy's key fields, ascending author name last.
/// The name tie-break makes ties impossible by construction.
fn compare(a: &RankingEntry, b: &RankingEntry, strategy: RankStrategy) -> Ordering {
    let keyed = match strategy {
        RankStrategy::CheckinsThenScore => b
            .checkin_count
            .cmp(&a.checkin_count)
            .then(b.average_score.total_cmp(&a.average_score)),
        RankStrategy::ScoreThenCheckins => b
            .average_score
            .total_cmp(&a.average_score)
            .then(b.checkin_count.cmp(&a.checkin_count)),
        RankStrategy::StreakThenCheckins => b
            .current_streak
            .cmp(&a.current_streak)
            .then(b.checkin_count.cmp(&a.checkin_count)),
    };
    keyed.then_with(|| a.author.cmp(&b.author))
}
