//! Ranking services: the score model, vote application, batch rescoring and
//! the scheduler that drives it.
//!
//! Services only see the port traits from `domains`; wire them up with any
//! adapter from `storage-adapters`.

pub mod documents;
pub mod rescore;
pub mod retry;
pub mod scheduler;
pub mod score;
pub mod voting;

pub use documents::DocumentService;
pub use rescore::{BatchReport, RescoreConfig, RescoreService};
pub use retry::RetryPolicy;
pub use scheduler::run_rescore_loop;
pub use score::{recalculate_score, ScoreInput, ScoreModel, ScoreParams};
pub use voting::{VoteOutcome, VoteRequest, VoteService};
