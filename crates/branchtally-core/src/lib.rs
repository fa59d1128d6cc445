//! Core types, configuration, and error handling for branchtally.
//!
//! This crate provides the shared foundation used by all other branchtally crates:
//! - [`TallyError`] — unified error type using `thiserror`
//! - [`TallyConfig`] — configuration loaded from `.branchtally.toml`
//! - Shared types: [`CommitRecord`], [`IdentityPolicy`], [`TimeRange`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{GitHubConfig, PatternConfig, TallyConfig, TimeRangeConfig};
pub use error::TallyError;
pub use types::{CommitRecord, IdentityPolicy, OutputFormat, TimeRange, UNKNOWN_AUTHOR};

/// A convenience `Result` type for branchtally operations.
pub type Result<T> = std::result::Result<T, TallyError>;
