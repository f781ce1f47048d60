//! Crawl orchestration for AgencyScout.
//!
//! This crate provides:
//! - [`engine`] — the frontier state machine and worker pool
//! - [`frontier`] — delayed work queue, leases, and dedup admission
//! - [`session`] — rotatable session pool with good/bad verdicts
//! - [`fetch`] — page fetching and block-signal classification

pub mod engine;
pub mod fetch;
pub mod frontier;
pub mod session;

pub use engine::{Engine, RunStats};
pub use fetch::{BlockReason, FetchFailure, RawPage};
pub use frontier::{Frontier, Visited, VisitedKind};
pub use session::{SessionHandle, SessionPool};
