//! GitHub commit provider for branchtally.
//!
//! [`client::GitHubClient`] pages branch lists and per-branch commit
//! histories through the REST API. [`pipeline`] fetches several branches
//! concurrently while folding them into an aggregation strictly in branch
//! order.

pub mod client;
pub mod pipeline;
