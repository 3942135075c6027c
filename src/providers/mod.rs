//! Upstream search providers
//!
//! Each adapter turns a [`SearchRequest`](crate::search::SearchRequest) into
//! one upstream call and normalizes the reply into
//! [`ProviderResults`](crate::search::ProviderResults).

mod chat;
mod context;
mod credentials;
mod probe;
mod registry;
mod traits;

pub mod answer;
pub mod suggestion;
pub mod web;

pub use answer::AnswerProvider;
pub use context::ProviderContext;
pub use credentials::ProviderCredentials;
pub use registry::{Provider, ProviderPool, ProviderStatus};
pub use suggestion::SuggestionProvider;
pub use traits::*;
pub use web::WebProvider;
