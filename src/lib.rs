pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod oracle;
pub mod pipeline;
pub mod ranking;
pub mod report;
pub mod scoring;
pub mod store;
pub mod types;

pub use aggregator::{TaskAggregator, UserAggregator};
pub use classifier::NoteClassifier;
pub use config::AnalyzerConfig;
pub use oracle::{LlmOracle, MockOracle, OracleVerdict, ScoringError, ScoringOracle};
pub use pipeline::AnalysisPipeline;
pub use ranking::{RankStrategy, RankingEngine};
pub use report::{AnalysisReport, ReportGenerator};
pub use scoring::{RateGate, ScoringPipeline, StopHandle};
pub use store::{ArticleStore, ScoreStore};
pub use types::*;
