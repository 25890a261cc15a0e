//! Core orchestration for Mojarung.
//!
//! Ties the parsers, deduplication, LLM and storage crates together into
//! the news and company pipelines, and holds the preference and
//! recommendation logic used by the HTTP layer.

pub mod companies;
pub mod enrichment;
pub mod jobs;
pub mod pipeline;
pub mod preferences;
pub mod recommendation;

#[cfg(test)]
mod test_support;

pub use companies::{CompanyPipelineConfig, CompanyReport, run_company_pipeline};
pub use jobs::{JobGuard, JobKind, JobRegistry};
pub use pipeline::{
    NewsPipeline, NewsPipelineConfig, PipelineProgress, PipelineReport, SilentProgress,
    run_news_pipeline,
};
pub use preferences::{Reaction, TagBuckets, apply_reaction, interest_filter};
pub use recommendation::{
    Recommendation, UserContext, answer_question, recommend, user_operations,
};
