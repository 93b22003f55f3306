//! API middleware stack.
//!
//! Execution order (outermost to innermost):
//! 1. Auth validator: resolves the bearer token, injects `UserContext`
//! 2. Access logger: logs after auth, has the user id

pub mod access_log;
pub mod auth;
