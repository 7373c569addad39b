//! REST API Routes
//!
//! Router assembly for the HTTP surface. Everything except `/health`
//! sits behind the JWT middleware; authorization beyond authentication
//! is decided per handler through the access policy.

pub mod auth;
pub mod comments;
pub mod health;
pub mod records;
pub mod sessions;
pub mod stats;
pub mod users;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;

/// Build the CORS layer from configuration. An empty origin list allows
/// everything (dev mode).
fn build_cors(config: &ApiConfig) -> ApiResult<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(config.cors_max_age_secs));

    if config.cors_allow_any() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid CORS origin: {}", o)))
        })
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Create the complete API router.
pub fn create_api_router(
    db: Db,
    api_config: &ApiConfig,
    auth_config: AuthConfig,
) -> ApiResult<Router> {
    let state = AppState::new(db);
    let auth_state = AuthMiddlewareState::new(auth_config);
    let cors = build_cors(api_config)?;

    let protected = Router::new()
        .route(
            "/records",
            get(records::list_records).post(records::create_record),
        )
        .route(
            "/records/:id",
            put(records::update_record).delete(records::delete_record),
        )
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/comments",
            get(comments::comment_feed).post(comments::create_log_comment),
        )
        .route(
            "/sessions/:id/comments",
            get(comments::list_session_comments).post(comments::create_comment),
        )
        .route("/stats/overview", get(stats::overview))
        .route("/stats/records", get(stats::records_report))
        .route("/stats/modules", get(stats::modules))
        .route("/stats/module/:kind/summary", get(stats::module_summary))
        .route("/stats/module/:kind/series", get(stats::module_series))
        .route("/stats/module/:kind/top-records", get(stats::module_top))
        .route("/stats/notes", get(stats::recent_notes))
        .route("/users", get(users::list_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/active", post(users::set_user_active))
        .route("/auth/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    let app = Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(api_config.request_timeout));

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_rejects_unparseable_origin() {
        let config = ApiConfig {
            cors_origins: vec!["not a header\nvalue".to_string()],
            ..ApiConfig::default()
        };
        assert!(build_cors(&config).is_err());
    }

    #[test]
    fn test_cors_allows_any_when_unconfigured() {
        assert!(build_cors(&ApiConfig::default()).is_ok());
    }

    #[test]
    fn test_router_builds() {
        let db = Db::from_config(&crate::db::DbConfig::default()).unwrap();
        let router = create_api_router(db, &ApiConfig::default(), AuthConfig::default());
        assert!(router.is_ok());
    }
}
