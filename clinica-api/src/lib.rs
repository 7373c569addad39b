//! CLINICA API
//!
//! Schema-adaptive REST API for clinical records over PostgreSQL. The
//! physical schema is not assumed: each request discovers which table
//! and columns back every logical entity through the catalog, then
//! builds its SQL from those verified identifiers. Request values only
//! ever travel as bind parameters.
//!
//! Modules:
//! - `schema`: catalog discovery and the shape vocabulary
//! - `query`: SQL builders over discovered shapes
//! - `policy`: role-based row visibility and ownership
//! - `stats`: aggregation pipelines with per-metric degradation
//! - `routes`: Axum handlers for the HTTP surface

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod policy;
pub mod query;
pub mod routes;
pub mod schema;
pub mod state;
pub mod stats;
pub mod types;
pub mod validation;

pub use auth::{AuthConfig, AuthContext};
pub use config::ApiConfig;
pub use db::{Db, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
