//! Web server module
//!
//! JSON API over the search service. Authentication happens upstream; the
//! authenticated user arrives in the `x-user-id` header.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use handlers::USER_HEADER;
pub use routes::create_router;
pub use state::{AppState, EndpointLimiter};
