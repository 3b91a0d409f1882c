use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::ScoringConfig;
use crate::types::{AnalyzerError, Note, Result};

/// Failure taxonomy for one oracle call. The scoring pipeline decides per
/// variant whether to retry, retry once strictly, or skip.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScoringError {
    #[error("oracle rate limited")]
    RateLimited,

    #[error("oracle call timed out")]
    Timeout,

    #[error("unparseable oracle response: {0}")]
    InvalidResponse(String),

    #[error("oracle rejected the note: {0}")]
    OracleRejected(String),
}

/// A numeric grade plus free-text commentary for one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleVerdict {
    /// Grade in [0, 100].
    pub score: u8,
    pub comment: String,
}

/// Capability interface for the external scoring oracle.
///
/// This is the seam test doubles substitute: pipeline logic never touches
/// HTTP directly. `strict` requests a response format the lenient parse
/// fallback can always handle; it is set on the single retry after an
/// unparseable response.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    fn oracle_name(&self) -> String;

    async fn score_one(
        &self,
        note: &Note,
        strict: bool,
    ) -> std::result::Result<OracleVerdict, ScoringError>;
}

/// Oracle client backed by an OpenAI-compatible chat-completions endpoint.
pub struct LlmOracle {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmOracle {
    pub fn new(config: &ScoringConfig) -> Result<Self> {
        Url::parse(&config.api_url)
            .map_err(|e| AnalyzerError::Config(format!("invalid oracle URL {}: {}", config.api_url, e)))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AnalyzerError::Config("scoring enabled but no API key configured (set LLM_API_KEY)".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AnalyzerError::General(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn build_prompt(note: &Note, strict: bool) -> String {
        // The prompt caps content at 1000 chars to bound token usage.
        let excerpt: String = note.content.chars().take(1000).collect();
        let mut prompt = format!(
            "Please grade the following learning note on a 0-100 scale and give a short comment.\n\n\
             Title: {}\n\
             Content: {}\n\n\
             Grading criteria:\n\
             1. Content quality and depth (40 points)\n\
             2. Learning takeaways and reflection (30 points)\n\
             3. Clarity of expression (20 points)\n\
             4. Practical applicability (10 points)\n\n\
             Return the result as JSON:\n\
             {{\"score\": <integer>, \"comment\": \"<comment>\"}}",
            note.title, excerpt
        );
        if strict {
            prompt.push_str("\n\nRespond with ONLY the JSON object. No surrounding text, no code fences.");
        }
        prompt
    }
}

#[async_trait]
impl ScoringOracle for LlmOracle {
    fn oracle_name(&self) -> String {
        format!("llm ({})", self.model)
    }

    async fn score_one(
        &self,
        note: &Note,
        strict: bool,
    ) -> std::result::Result<OracleVerdict, ScoringError> {
        let prompt = Self::build_prompt(note, strict);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a strict but fair grader of community learning notes.",
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("Submitting note {} to oracle", note.key);
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ScoringError::RateLimited);
        }
        if status.is_client_error() {
            // 4xx other than 429: the oracle refused this request outright.
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::OracleRejected(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            // 5xx is transient; let the retry policy handle it.
            return Err(ScoringError::Timeout);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| ScoringError::InvalidResponse("empty choices".to_string()))?;

        parse_verdict(content, strict)
    }
}

fn classify_transport_error(err: reqwest::Error) -> ScoringError {
    if err.is_timeout() || err.is_connect() {
        ScoringError::Timeout
    } else {
        ScoringError::InvalidResponse(err.to_string())
    }
}

/// Deterministic stand-in oracle for development and tests.
pub struct MockOracle {
    score: u8,
    comment: String,
    response_delay_ms: u64,
}

impl MockOracle {
    pub fn new(score: u8) -> Self {
        Self {
            score: score.min(100),
            comment: "mock verdict".to_string(),
            response_delay_ms: 0,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl ScoringOracle for MockOracle {
    fn oracle_name(&self) -> String {
        "mock".to_string()
    }

    async fn score_one(
        &self,
        _note: &Note,
        _strict: bool,
    ) -> std::result::Result<OracleVerdict, ScoringError> {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.response_delay_ms)).await;
        }
        Ok(OracleVerdict {
            score: self.score,
            comment: self.comment.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct RawVerdict {
    score: serde_json::Value,
    #[serde(default)]
    comment: String,
}

/// Parse an oracle reply into a verdict.
///
/// Parsing ladder: direct JSON, then code-fence stripping, then extraction
/// of the first embedded JSON object. With `lenient` (the strict-prompt
/// retry), a final score-token scan is attempted before giving up.
pub fn parse_verdict(raw: &str, lenient: bool) -> std::result::Result<OracleVerdict, ScoringError> {
    let trimmed = raw.trim();

    if let Some(verdict) = try_parse_json(trimmed) {
        return Ok(verdict);
    }

    let unfenced = strip_code_fences(trimmed);
    if let Some(verdict) = try_parse_json(unfenced) {
        return Ok(verdict);
    }

    if let Some(object) = extract_json_object(trimmed) {
        if let Some(verdict) = try_parse_json(object) {
            return Ok(verdict);
        }
    }

    if lenient {
        if let Some(verdict) = scan_score_token(trimmed) {
            warn!("Recovered verdict from unstructured oracle output");
            return Ok(verdict);
        }
    }

    let preview: String = trimmed.chars().take(200).collect();
    Err(ScoringError::InvalidResponse(preview))
}

fn try_parse_json(text: &str) -> Option<OracleVerdict> {
    let raw: RawVerdict = serde_json::from_str(text).ok()?;
    let score = coerce_score(&raw.score)?;
    let comment = if raw.comment.is_empty() {
        "no comment provided".to_string()
    } else {
        raw.comment
    };
    Some(OracleVerdict { score, comment })
}

fn coerce_score(value: &serde_json::Value) -> Option<u8> {
    let score = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(score.clamp(0.0, 100.0).round() as u8)
}

fn strip_code_fences(text: &str) -> &str {
    let mut inner = text;
    if let Some(rest) = inner.strip_prefix("```json") {
        inner = rest;
    } else if let Some(rest) = inner.strip_prefix("```") {
        inner = rest;
    }
    if let Some(rest) = inner.strip_suffix("```") {
        inner = rest;
    }
    inner.trim()
}

/// First balanced `{ ... }` span in the text, if any.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Last-ditch extraction: find a `score` token followed by digits and take
/// the rest of that line's text as commentary.
fn scan_score_token(text: &str) -> Option<OracleVerdict> {
    // Scan the lowercased copy only; offsets into the original are not
    // byte-stable under case folding.
    let lower = text.to_lowercase();
    let pos = lower.find("score")?;
    let digits: String = lower[pos + 5..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let score = digits.parse::<f64>().ok()?.clamp(0.0, 100.0).round() as u8;

    let comment = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.to_lowercase().contains("score"))
        .unwrap_or("no comment provided")
        .to_string();
    Some(OracleVerdict { score, comment })
}
