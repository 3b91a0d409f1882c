use std::collections::HashMap;

use tracing::{debug, warn};

use crate::types::{ArticleRecord, Note, NoteKey, TaskLabel};

/// Pure classifier: decides whether an article is a dated check-in note
/// and which task it belongs to. No side effects, no external calls.
///
/// A record is a note when its task name or title contains one of the
/// configured filter keywords (keyword `i` maps to `DAY{i+1}`, matching
/// the community's campaign calendar), or carries a literal `DAY<n>`
/// token.
pub struct NoteClassifier {
    keyword_labels: Vec<(String, TaskLabel)>,
}

impl NoteClassifier {
    pub fn from_keywords(keywords: &[String]) -> Self {
        let keyword_labels = keywords
            .iter()
            .enumerate()
            .map(|(i, keyword)| (keyword.clone(), TaskLabel::from_index(i as u32 + 1)))
            .collect();
        Self { keyword_labels }
    }

    /// Classify one record. Total and deterministic: the same record always
    /// yields the same label or none.
    pub fn classify(&self, record: &ArticleRecord) -> Option<TaskLabel> {
        let task_name = record.task_name.as_deref().unwrap_or("");

        for (keyword, label) in &self.keyword_labels {
            if record.title.contains(keyword.as_str()) || task_name.contains(keyword.as_str()) {
                return Some(label.clone());
            }
        }

        parse_day_token(task_name)
            .or_else(|| parse_day_token(&record.title))
            .map(TaskLabel::from_index)
    }

    /// Reduce the full article set to one canonical note per `(author,
    /// task)` key.
    ///
    /// Tie-break between candidates for the same key: later publish time
    /// wins; on equal timestamps the longer content wins; a tie on both is
    /// logged and the earlier-inserted record is kept.
    pub fn canonical_notes(&self, records: &[ArticleRecord]) -> Vec<Note> {
        let mut canonical: HashMap<NoteKey, (&ArticleRecord, TaskLabel)> = HashMap::new();

        for record in records {
            let Some(label) = self.classify(record) else {
                continue;
            };
            let key = NoteKey {
                author: record.author_name.clone(),
                task: label.name.clone(),
            };

            match canonical.get(&key) {
                None => {
                    canonical.insert(key, (record, label));
                }
                Some((incumbent, _)) => {
                    if supersedes(record, incumbent) {
                        debug!("Superseding note {} with a later record", key);
                        canonical.insert(key, (record, label));
                    } else if record.published_at == incumbent.published_at
                        && record.content_chars() == incumbent.content_chars()
                    {
                        warn!(
                            "Ambiguous canonical candidates for {}, keeping the earlier record",
                            key
                        );
                    }
                }
            }
        }

        let mut notes: Vec<Note> = canonical
            .into_iter()
            .map(|(key, (record, label))| Note {
                key,
                task_index: label.index,
                article_id: record.id.clone(),
                title: record.title.clone(),
                content: record.content.clone(),
                views: record.views,
                likes: record.likes,
                replies: record.replies,
                published_at: record.published_at,
            })
            .collect();
        notes.sort_by(|a, b| {
            (a.task_index, &a.key.author).cmp(&(b.task_index, &b.key.author))
        });
        notes
    }
}

/// Whether `candidate` replaces `incumbent` as the canonical record for a
/// shared note key.
fn supersedes(candidate: &ArticleRecord, incumbent: &ArticleRecord) -> bool {
    if candidate.published_at != incumbent.published_at {
        return candidate.published_at > incumbent.published_at;
    }
    candidate.content_chars() > incumbent.content_chars()
}

/// Scan for a `DAY<n>` token (case-insensitive) and return its index.
fn parse_day_token(text: &str) -> Option<u32> {
    let upper = text.to_uppercase();
    let mut search = upper.as_str();
    while let Some(pos) = search.find("DAY") {
        let tail = &search[pos + 3..];
        let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            if let Ok(index) = digits.parse::<u32>() {
                if index > 0 {
                    return Some(index);
                }
            }
        }
        search = &search[pos + 3..];
    }
    None
}
