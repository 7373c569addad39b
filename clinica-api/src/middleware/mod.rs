//! Middleware modules for the CLINICA API
//!
//! - `auth`: JWT bearer authentication middleware and the typed extractor
//!   route handlers use to require an authenticated caller.

mod auth;

pub use auth::{auth_middleware, AuthExtractor, AuthMiddlewareError, AuthMiddlewareState};
