use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use note_analyzer::types::*;
use note_analyzer::{AnalysisPipeline, AnalyzerConfig, MockOracle, RankStrategy};
use tempfile::TempDir;
use tracing::info;

fn article(author: &str, task: &str, hour: u32) -> ArticleRecord {
    ArticleRecord {
        id: format!("{}-{}", author, task),
        title: format!("{} study log from {}", task, author),
        author_name: author.to_string(),
        task_name: Some(task.to_string()),
        content: format!("What {} learned during {}.", author, task),
        views: 20,
        likes: 3,
        replies: 1,
        published_at: Utc.with_ymd_and_hms(2025, 7, 26, hour, 0, 0).unwrap(),
    }
}

fn test_config(dir: &TempDir) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default();
    config.data_dir = dir.path().to_path_buf();
    config.scoring.request_delay_ms = 0;
    config.scoring.retry_delay_ms = 1;
    config
}

#[tokio::test]
async fn test_end_to_end_analysis() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let dir = TempDir::new()?;
    let config = test_config(&dir);

    // Crawler output: three DAY1 check-ins and one DAY2 check-in.
    let crawl = vec![
        article("alice", "DAY1", 8),
        article("bob", "DAY1", 9),
        article("carol", "DAY1", 10),
        article("alice", "DAY2", 11),
    ];
    let crawl_path = dir.path().join("crawl.json");
    fs::write(&crawl_path, serde_json::to_string(&crawl)?)?;

    let pipeline = AnalysisPipeline::new(config, Some(Arc::new(MockOracle::new(80))));

    let summary = pipeline.ingest_file(&crawl_path)?;
    assert_eq!(summary.added, 4);

    // Re-ingesting the same dump must be a no-op.
    let repeat = pipeline.ingest_file(&crawl_path)?;
    assert_eq!(repeat.added, 0);
    assert_eq!(repeat.skipped_duplicate, 4);

    let report = pipeline.run(Some(RankStrategy::ScoreThenCheckins)).await?;

    info!("Report {} generated", report.run_id);
    assert_eq!(report.summary.total_articles, 4);
    assert_eq!(report.summary.total_notes, 4);
    assert_eq!(report.summary.total_tasks, 2);
    assert_eq!(report.summary.total_users, 3);
    assert_eq!(report.summary.scored, 4);
    assert_eq!(report.summary.skipped, 0);

    // DAY1: all three inferred participants checked in.
    let day1 = report
        .tasks
        .iter()
        .find(|t| t.task == "DAY1")
        .expect("DAY1 stat");
    assert_eq!(day1.total_checkins, 3);
    assert!((day1.completion_ratio - 1.0).abs() < f64::EPSILON);

    let day2 = report
        .tasks
        .iter()
        .find(|t| t.task == "DAY2")
        .expect("DAY2 stat");
    assert!((day2.completion_ratio - 1.0 / 3.0).abs() < 1e-9);

    // Alice checked into both tasks; the latest task is DAY2.
    let alice = report
        .users
        .iter()
        .find(|u| u.author == "alice")
        .expect("alice stat");
    assert_eq!(alice.current_streak, 2);
    assert_eq!(alice.longest_streak, 2);
    assert_eq!(alice.average_score, Some(80.0));

    let bob = report.users.iter().find(|u| u.author == "bob").expect("bob stat");
    assert_eq!(bob.current_streak, 0, "bob is absent at the latest task");

    // Equal averages everywhere, so check-in count puts alice first and
    // the name tie-break orders bob before carol.
    let ranked: Vec<&str> = report.rankings.iter().map(|e| e.author.as_str()).collect();
    assert_eq!(ranked, vec!["alice", "bob", "carol"]);
    assert_eq!(report.rankings[0].rank, 1);
    assert_eq!(report.rankings[0].checkin_count, 2);

    // Exported artifacts.
    let csv = fs::read_to_string(dir.path().join("note_scores.csv"))?;
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("author,task,score,comment,content_length,title"),
        "fixed column set for downstream consumers"
    );
    assert_eq!(lines.count(), 4, "one row per scored note");

    assert!(dir.path().join("report.json").exists());
    assert!(dir.path().join("ranking.csv").exists());

    // Scoring is idempotent across runs: unchanged notes keep one record.
    let second = pipeline.run(Some(RankStrategy::ScoreThenCheckins)).await?;
    assert_eq!(second.summary.scored, 4, "records persist, none duplicated");
    Ok(())
}

#[tokio::test]
async fn test_run_with_scoring_disabled_still_reports() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = test_config(&dir);
    config.scoring.enabled = false;

    let crawl = vec![article("alice", "DAY1", 8)];
    let crawl_path = dir.path().join("crawl.json");
    fs::write(&crawl_path, serde_json::to_string(&crawl)?)?;

    let pipeline = AnalysisPipeline::new(config, None);
    pipeline.ingest_file(&crawl_path)?;
    let report = pipeline.run(None).await?;

    assert_eq!(report.summary.total_notes, 1);
    assert_eq!(report.summary.scored, 0);
    let alice = report.users.iter().find(|u| u.author == "alice").expect("alice");
    assert_eq!(alice.average_score, None, "no score invented for unscored notes");
    Ok(())
}
