//! Commit statistics engine: cross-branch deduplication and anomaly heuristics.
//!
//! Folds per-branch commit streams into per-author statistics, crediting
//! each unique commit to the first branch that contributes it, and flags
//! suspicious contribution patterns for a single author. Local branch
//! streams are mined with git2; everything else is pure computation over
//! [`branchtally_core::CommitRecord`]s.

pub mod aggregate;
pub mod identity;
pub mod merge;
pub mod mining;
pub mod patterns;
