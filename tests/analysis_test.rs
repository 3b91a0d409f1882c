use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use note_analyzer::types::*;
use note_analyzer::{NoteClassifier, RankStrategy, RankingEngine, TaskAggregator, UserAggregator};

fn published(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 26, hour, 0, 0).unwrap()
}

fn article(author: &str, task_name: Option<&str>, title: &str, content: &str, hour: u32) -> ArticleRecord {
    ArticleRecord {
        id: format!("{}-{}", author, hour),
        title: title.to_string(),
        author_name: author.to_string(),
        task_name: task_name.map(str::to_string),
        content: content.to_string(),
        views: 5,
        likes: 1,
        replies: 0,
        published_at: published(hour),
    }
}

fn note(author: &str, task_index: u32) -> Note {
    Note {
        key: NoteKey {
            author: author.to_string(),
            task: format!("DAY{}", task_index),
        },
        task_index,
        article_id: format!("{}-{}", author, task_index),
        title: format!("DAY{} notes", task_index),
        content: "some reflection".to_string(),
        views: 5,
        likes: 1,
        replies: 0,
        published_at: published(8),
    }
}

#[test]
fn test_classification_is_pure_and_total() {
    let classifier = NoteClassifier::from_keywords(&["kickoff-review".to_string()]);
    let matching = article("alice", None, "kickoff-review: my first note", "body", 8);
    let other = article("alice", None, "random musings", "body", 8);

    let first = classifier.classify(&matching);
    let second = classifier.classify(&matching);
    assert_eq!(first, second, "same record must classify identically");
    assert_eq!(first.map(|l| l.index), Some(1));
    assert!(classifier.classify(&other).is_none());
}

#[test]
fn test_keyword_order_defines_day_index() {
    let keywords = vec!["warmup".to_string(), "deep-dive".to_string()];
    let classifier = NoteClassifier::from_keywords(&keywords);

    let second_day = article("bob", Some("deep-dive session"), "untitled", "body", 8);
    let label = classifier.classify(&second_day).expect("should classify");
    assert_eq!(label.index, 2);
    assert_eq!(label.name, "DAY2");
}

#[test]
fn test_day_token_fallback() {
    let classifier = NoteClassifier::from_keywords(&[]);

    let by_task = article("carol", Some("DAY7"), "untitled", "body", 8);
    assert_eq!(classifier.classify(&by_task).map(|l| l.index), Some(7));

    let by_title = article("carol", None, "my day12 study log", "body", 8);
    assert_eq!(classifier.classify(&by_title).map(|l| l.index), Some(12));
}

#[test]
fn test_canonical_selection_is_order_independent() {
    let classifier = NoteClassifier::from_keywords(&[]);
    let early = article("alice", Some("DAY1"), "early take", "short", 8);
    let late = article("alice", Some("DAY1"), "late take", "short", 11);

    let forward = classifier.canonical_notes(&[early.clone(), late.clone()]);
    let reversed = classifier.canonical_notes(&[late, early]);

    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].title, "late take", "later publish time wins");
    assert_eq!(reversed[0].title, "late take", "regardless of input order");
}

#[test]
fn test_canonical_tie_breaks_on_content_length() {
    let classifier = NoteClassifier::from_keywords(&[]);
    let brief = article("alice", Some("DAY1"), "brief", "tiny", 8);
    let thorough = article("alice", Some("DAY1"), "thorough", "a much longer reflection", 8);

    let notes = classifier.canonical_notes(&[brief, thorough]);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "thorough");
}

#[test]
fn test_streaks_with_gap() {
    // Check-ins at {1, 2, 3, 5}; the dataset's latest task is 5.
    let notes = vec![
        note("alice", 1),
        note("alice", 2),
        note("alice", 3),
        note("alice", 5),
        note("bob", 5),
    ];
    let stats = UserAggregator::aggregate(&notes);

    let alice = &stats["alice"];
    assert_eq!(alice.longest_streak, 3);
    assert_eq!(alice.current_streak, 1, "run ending at the latest task is just {{5}}");
}

#[test]
fn test_current_streak_breaks_when_absent_at_latest_task() {
    let notes = vec![
        note("alice", 1),
        note("alice", 2),
        note("alice", 3),
        note("bob", 5),
    ];
    let stats = UserAggregator::aggregate(&notes);

    let alice = &stats["alice"];
    assert_eq!(alice.longest_streak, 3);
    assert_eq!(alice.current_streak, 0, "absent at task 5");

    let bob = &stats["bob"];
    assert_eq!(bob.current_streak, 1);
}

#[test]
fn test_task_aggregation_infers_population() {
    let notes = vec![
        note("alice", 1),
        note("bob", 1),
        note("carol", 1),
        note("alice", 2),
    ];
    let stats = TaskAggregator::aggregate(&notes, None);

    let day1 = &stats[&1];
    assert_eq!(day1.participants, vec!["alice", "bob", "carol"]);
    assert!((day1.completion_ratio - 1.0).abs() < f64::EPSILON);

    let day2 = &stats[&2];
    assert!((day2.completion_ratio - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_task_aggregation_respects_configured_population() {
    let notes = vec![note("alice", 1), note("bob", 1)];
    let stats = TaskAggregator::aggregate(&notes, Some(10));
    assert!((stats[&1].completion_ratio - 0.2).abs() < 1e-9);
}

#[test]
fn test_ranking_is_a_strict_total_order() {
    let mut user_stats: BTreeMap<String, UserStat> = BTreeMap::new();
    for author in ["mallory", "alice", "bob"] {
        let notes = vec![note(author, 1)];
        let stats = UserAggregator::aggregate(&notes);
        user_stats.insert(author.to_string(), stats[author].clone());
    }

    for strategy in [
        RankStrategy::CheckinsThenScore,
        RankStrategy::ScoreThenCheckins,
        RankStrategy::StreakThenCheckins,
    ] {
        let entries = RankingEngine::rank(&user_stats, strategy);
        let ranks: Vec<usize> = entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3], "ranks must be strict 1..N");

        // All key fields equal, so the name tie-break decides.
        let authors: Vec<&str> = entries.iter().map(|e| e.author.as_str()).collect();
        assert_eq!(authors, vec!["alice", "bob", "mallory"]);
    }
}

#[test]
fn test_ranking_strategy_field_order() {
    let notes = vec![
        note("alice", 1),
        note("alice", 2),
        note("bob", 4),
        note("bob", 5),
        note("bob", 6),
        note("carol", 6),
    ];
    let mut user_stats = UserAggregator::aggregate(&notes);
    for (author, average) in [("alice", 95.0), ("bob", 70.0), ("carol", 80.0)] {
        if let Some(stat) = user_stats.get_mut(author) {
            stat.average_score = Some(average);
        }
    }

    let by_checkins = RankingEngine::rank(&user_stats, RankStrategy::CheckinsThenScore);
    assert_eq!(by_checkins[0].author, "bob", "most check-ins first");

    let by_score = RankingEngine::rank(&user_stats, RankStrategy::ScoreThenCheckins);
    assert_eq!(by_score[0].author, "alice", "highest average first");

    let by_streak = RankingEngine::rank(&user_stats, RankStrategy::StreakThenCheckins);
    assert_eq!(by_streak[0].author, "bob", "longest current streak first");
}
