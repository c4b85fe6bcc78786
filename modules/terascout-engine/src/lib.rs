//! The per-scout execution core: isolated state store, checkpointed step
//! runner, page fetcher, change analyst, mailer, and the polling engine.

pub mod analyst;
pub mod engine;
pub mod fetcher;
pub mod notify;
pub mod sources;
pub mod steps;
pub mod store;
pub mod testing;

pub use analyst::{ChangeAnalysis, ChangeAnalyst, ClaudeAnalyst, SearchPlan};
pub use engine::ScoutEngine;
pub use fetcher::{HttpFetcher, PageFetcher};
pub use notify::{Mailer, SmtpMailer};
pub use sources::TimeWindow;
pub use store::ScoutStore;
