//! HTTP API.
//!
//! JSON endpoints under `/api/`. Public: health, register, login. All
//! other routes require `Authorization: Bearer <token>` and see only the
//! authenticated user's records.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve_until_ctrl_c, start_api_server, ApiServer, ServerError};
pub use types::ApiContext;
