use chrono::{DateTime, TimeZone, Utc};
use note_analyzer::types::*;
use note_analyzer::{ArticleStore, ScoreStore};
use tempfile::TempDir;

fn published(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 26, hour, 0, 0).unwrap()
}

fn record(id: &str, title: &str, author: &str, content: &str, hour: u32) -> ArticleRecord {
    ArticleRecord {
        id: id.to_string(),
        title: title.to_string(),
        author_name: author.to_string(),
        task_name: Some("DAY1".to_string()),
        content: content.to_string(),
        views: 10,
        likes: 2,
        replies: 1,
        published_at: published(hour),
    }
}

#[test]
fn test_ingest_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("articles.json");

    let batch = vec![
        record("1", "DAY1 notes", "alice", "first note", 8),
        record("2", "DAY1 notes", "bob", "second note", 9),
    ];

    let mut store = ArticleStore::open(&path)?;
    let first = store.ingest(batch.clone())?;
    assert_eq!(first.added, 2);
    assert_eq!(first.skipped_duplicate, 0);

    let second = store.ingest(batch)?;
    assert_eq!(second.added, 0, "repeated batch must add nothing");
    assert_eq!(second.skipped_duplicate, 2);
    assert_eq!(store.len(), 2);
    Ok(())
}

#[test]
fn test_first_write_wins_on_fingerprint_collision() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("articles.json");

    // Same title, author and publish time => same fingerprint, different payload.
    let original = record("1", "DAY1 notes", "alice", "original body", 8);
    let recrawled = record("1", "DAY1 notes", "alice", "recrawled body", 8);
    assert_eq!(original.fingerprint(), recrawled.fingerprint());

    let mut store = ArticleStore::open(&path)?;
    store.ingest(vec![original])?;
    let summary = store.ingest(vec![recrawled])?;

    assert_eq!(summary.skipped_duplicate, 1);
    assert_eq!(store.all()[0].content, "original body");
    Ok(())
}

#[test]
fn test_diff_since_returns_strictly_newer_records() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("articles.json");

    let mut store = ArticleStore::open(&path)?;
    store.ingest(vec![
        record("1", "a", "alice", "x", 8),
        record("2", "b", "bob", "y", 10),
        record("3", "c", "carol", "z", 12),
    ])?;

    let newer = store.diff_since(published(10));
    assert_eq!(newer.len(), 1);
    assert_eq!(newer[0].id, "3");

    assert_eq!(store.diff_since(published(12)).len(), 0);
    assert_eq!(store.diff_since(published(7)).len(), 3);
    Ok(())
}

#[test]
fn test_article_store_survives_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("articles.json");

    {
        let mut store = ArticleStore::open(&path)?;
        store.ingest(vec![record("1", "a", "alice", "x", 8)])?;
    }

    let mut reopened = ArticleStore::open(&path)?;
    assert_eq!(reopened.len(), 1);

    // The fingerprint index must be rebuilt on load.
    let summary = reopened.ingest(vec![record("1", "a", "alice", "x", 8)])?;
    assert_eq!(summary.skipped_duplicate, 1);
    Ok(())
}

#[test]
fn test_score_store_upsert_is_last_write_wins() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("scores.json");

    let mut store = ScoreStore::open(&path)?;
    let key = NoteKey {
        author: "alice".to_string(),
        task: "DAY1".to_string(),
    };

    store.upsert(ScoreRecord {
        author: "alice".to_string(),
        task: "DAY1".to_string(),
        score: 70,
        comment: "fine".to_string(),
        content_length: 100,
        scored_at: published(8),
    })?;
    store.upsert(ScoreRecord {
        author: "alice".to_string(),
        task: "DAY1".to_string(),
        score: 85,
        comment: "better".to_string(),
        content_length: 120,
        scored_at: published(9),
    })?;

    assert_eq!(store.len(), 1, "upsert must not create a second record");
    assert_eq!(store.get(&key).map(|r| r.score), Some(85));

    let reopened = ScoreStore::open(&path)?;
    assert_eq!(reopened.get(&key).map(|r| r.score), Some(85));
    Ok(())
}
