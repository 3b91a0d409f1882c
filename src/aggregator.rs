use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::store::ScoreStore;
use crate::types::{Note, TaskStat, UserStat};

/// Groups canonical notes by task and computes check-in completeness.
///
/// Runs as a single pass over the full note set and recomputes everything
/// from scratch, so the output is always a pure function of the input.
pub struct TaskAggregator;

impl TaskAggregator {
    /// `expected_population` overrides the denominator of the completion
    /// ratio; `None` infers it from the distinct authors in the dataset.
    pub fn aggregate(
        notes: &[Note],
        expected_population: Option<usize>,
    ) -> BTreeMap<u32, TaskStat> {
        let inferred_population = notes
            .iter()
            .map(|note| note.key.author.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let population = expected_population.unwrap_or(inferred_population);

        let mut stats: BTreeMap<u32, TaskStat> = BTreeMap::new();
        let mut content_totals: BTreeMap<u32, usize> = BTreeMap::new();

        for note in notes {
            let stat = stats.entry(note.task_index).or_insert_with(|| TaskStat {
                task: note.key.task.clone(),
                task_index: note.task_index,
                total_checkins: 0,
                participants: Vec::new(),
                expected_population: population,
                completion_ratio: 0.0,
                total_views: 0,
                total_likes: 0,
                total_replies: 0,
                avg_content_length: 0.0,
            });

            stat.total_checkins += 1;
            if !stat.participants.contains(&note.key.author) {
                stat.participants.push(note.key.author.clone());
            }
            stat.total_views += note.views;
            stat.total_likes += note.likes;
            stat.total_replies += note.replies;
            *content_totals.entry(note.task_index).or_insert(0) += note.content_chars();
        }

        for stat in stats.values_mut() {
            stat.participants.sort();
            stat.completion_ratio = if population > 0 {
                stat.participants.len() as f64 / population as f64
            } else {
                0.0
            };
            let content_total = content_totals.get(&stat.task_index).copied().unwrap_or(0);
            if stat.total_checkins > 0 {
                stat.avg_content_length = content_total as f64 / stat.total_checkins as f64;
            }
        }

        info!("Aggregated {} tasks from {} notes", stats.len(), notes.len());
        stats
    }
}

/// Groups canonical notes by author and computes participation stats,
/// including streaks measured against the dataset's latest task index.
pub struct UserAggregator;

impl UserAggregator {
    pub fn aggregate(notes: &[Note]) -> BTreeMap<String, UserStat> {
        let distinct_tasks: BTreeSet<u32> = notes.iter().map(|note| note.task_index).collect();
        let total_tasks = distinct_tasks.len();
        let latest_task_index = distinct_tasks.iter().next_back().copied().unwrap_or(0);

        let mut stats: BTreeMap<String, UserStat> = BTreeMap::new();
        let mut content_totals: BTreeMap<String, usize> = BTreeMap::new();
        let mut task_sets: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();

        for note in notes {
            let author = note.key.author.clone();
            let stat = stats.entry(author.clone()).or_insert_with(|| UserStat {
                author: author.clone(),
                task_indices: Vec::new(),
                tasks: Vec::new(),
                total_notes: 0,
                longest_streak: 0,
                current_streak: 0,
                completion_rate: 0.0,
                total_views: 0,
                total_likes: 0,
                total_replies: 0,
                avg_content_length: 0.0,
                average_score: None,
            });

            stat.total_notes += 1;
            stat.total_views += note.views;
            stat.total_likes += note.likes;
            stat.total_replies += note.replies;
            *content_totals.entry(author.clone()).or_insert(0) += note.content_chars();
            task_sets.entry(author).or_default().insert(note.task_index);
        }

        for (author, stat) in stats.iter_mut() {
            let indices: Vec<u32> = task_sets
                .get(author)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            let (longest, current) = streaks(&indices, latest_task_index);

            stat.tasks = indices
                .iter()
                .map(|index| format!("DAY{}", index))
                .collect();
            stat.task_indices = indices;
            stat.longest_streak = longest;
            stat.current_streak = current;
            stat.completion_rate = if total_tasks > 0 {
                stat.task_indices.len() as f64 / total_tasks as f64
            } else {
                0.0
            };
            let content_total = content_totals.get(author).copied().unwrap_or(0);
            if stat.total_notes > 0 {
                stat.avg_content_length = content_total as f64 / stat.total_notes as f64;
            }
        }

        info!("Aggregated {} authors from {} notes", stats.len(), notes.len());
        stats
    }

    /// Join score averages into the user stats once scoring has run.
    pub fn apply_scores(stats: &mut BTreeMap<String, UserStat>, scores: &ScoreStore) {
        for stat in stats.values_mut() {
            let author_scores: Vec<u8> = scores
                .all()
                .into_iter()
                .filter(|record| record.author == stat.author)
                .map(|record| record.score)
                .collect();
            if !author_scores.is_empty() {
                let total: u64 = author_scores.iter().map(|&s| s as u64).sum();
                stat.average_score = Some(total as f64 / author_scores.len() as f64);
            }
        }
    }
}

/// Longest and current streak over sorted distinct task indices.
///
/// A streak increments while consecutive indices are present without a
/// gap. The current streak is the run ending at `latest_task_index`; an
/// author absent there has a current streak of 0.
fn streaks(indices: &[u32], latest_task_index: u32) -> (u32, u32) {
    if indices.is_empty() {
        return (0, 0);
    }

    let mut longest = 1u32;
    let mut run = 1u32;
    for window in indices.windows(2) {
        if window[1] == window[0] + 1 {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
    }

    let current = if *indices.last().unwrap_or(&0) == latest_task_index {
        run
    } else {
        0
    };
    (longest, current)
}
