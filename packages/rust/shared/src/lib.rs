//! Shared types, error model, and configuration for Mojarung.
//!
//! This crate is the foundation depended on by all other Mojarung crates.
//! It provides:
//! - [`MojarungError`] — the unified error type
//! - The sector catalogue ([`Tag`], [`TagScores`])
//! - Domain types ([`User`], [`RawNews`], [`NewsArticle`], [`Company`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod tags;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AuthConfig, CompaniesConfig, DatabaseConfig, DedupSettings, InvestConfig,
    LlmConfig, ParsersConfig, RemoteEmbedderConfig, ServerConfig, config_dir, config_file_path,
    embeddings_key, expand_home, init_config, load_config, load_config_from, secret_key,
    validate_llm_key,
};
pub use error::{MojarungError, Result};
pub use tags::{Tag, TagScores, join_tags};
pub use types::{
    Company, CompanyUpsert, NewArticle, NewUser, NewsArticle, NewsFilter, RawNews,
    ScrapedArticle, User, UserUpdate, split_list,
};
