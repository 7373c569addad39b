//! Authentication REST Routes
//!
//! Token issuance happens outside this service; the only route here
//! reflects the validated token back at the caller.

use axum::{response::IntoResponse, Json};

use crate::error::ApiResult;
use crate::middleware::AuthExtractor;
use crate::types::MeResponse;

/// GET /auth/me - Identity of the presented token
pub async fn me(AuthExtractor(ctx): AuthExtractor) -> ApiResult<impl IntoResponse> {
    Ok(Json(MeResponse {
        id: ctx.user_id,
        role: ctx.role.to_string(),
        name: ctx.name.clone(),
        email: ctx.email.clone(),
    }))
}
