//! Search orchestration module
//!
//! Request and outcome types, the provider cascade, and the service that
//! adds quotas and query enhancement around it.

mod models;
mod orchestrator;
mod service;

pub use models::*;
pub use orchestrator::SearchOrchestrator;
pub use service::{SearchParams, SearchService};
