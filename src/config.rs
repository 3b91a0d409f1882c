use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ranking::RankStrategy;
use crate::types::Result;

/// Top-level configuration, loaded from a YAML file and merged with
/// environment overrides. Every component receives its slice of this at
/// construction; nothing reads ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub data_dir: PathBuf,
    pub analysis: AnalysisConfig,
    pub scoring: ScoringConfig,
    pub ranking: RankingConfig,
    pub tasks: TaskConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            analysis: AnalysisConfig::default(),
            scoring: ScoringConfig::default(),
            ranking: RankingConfig::default(),
            tasks: TaskConfig::default(),
        }
    }
}

/// Note classification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Title/task keywords marking dated check-ins; keyword `i` maps to
    /// day index `i + 1`.
    pub filter_keywords: Vec<String>,
}

/// Scoring oracle settings: endpoint, prompt limits, throttle and retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Minimum delay between consecutive oracle calls, shared across all
    /// concurrent callers.
    pub request_delay_ms: u64,
    /// Cap on attempts per note for transient failures. Never unbounded.
    pub max_attempts: u32,
    /// Seed interval for the exponential retry backoff.
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
    pub max_concurrency: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.modelarts-maas.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "deepseek-v3".to_string(),
            max_tokens: 500,
            temperature: 0.3,
            request_delay_ms: 1000,
            max_attempts: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 30,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub default_strategy: RankStrategy,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_strategy: RankStrategy::CheckinsThenScore,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Expected participants per task; `None` infers the population from
    /// the distinct authors in the dataset.
    pub expected_population: Option<usize>,
}

impl AnalyzerConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file is absent, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let config: AnalyzerConfig = serde_yaml::from_str(&raw)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            warn!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            AnalyzerConfig::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Merge recognized environment variables over the file values.
    pub fn apply_env(&mut self) {
        if let Ok(key) = env::var("LLM_API_KEY") {
            if !key.is_empty() {
                self.scoring.api_key = Some(key);
            }
        }
        if let Ok(api_url) = env::var("LLM_API_URL") {
            if !api_url.is_empty() {
                self.scoring.api_url = api_url;
            }
        }
        if let Ok(data_dir) = env::var("DATA_DIR") {
            if !data_dir.is_empty() {
                self.data_dir = PathBuf::from(data_dir);
            }
        }
    }

    pub fn articles_path(&self) -> PathBuf {
        self.data_dir.join("articles.json")
    }

    pub fn scores_path(&self) -> PathBuf {
        self.data_dir.join("scores.json")
    }
}
