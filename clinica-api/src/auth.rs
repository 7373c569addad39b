//! Authentication Module
//!
//! This module provides JWT authentication for the CLINICA API (via
//! Authorization: Bearer header). Tokens are minted by the deployment's
//! login system, so the claim layout varies: user ids arrive under `id`,
//! roles under `rol` or `role`, names under `nombre` or `name`. Serde
//! aliases absorb the drift; role normalization lives in `clinica_core`.

use crate::error::{ApiError, ApiResult};
use clinica_core::{EntityId, Role};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// CLOCK ABSTRACTION (FOR DETERMINISTIC TESTS + CI ROBUSTNESS)
// ============================================================================

/// Clock abstraction for JWT time validation.
///
/// By owning time validation ourselves (instead of letting `jsonwebtoken`
/// do it), we avoid the `SystemTime::now().duration_since(UNIX_EPOCH)`
/// panic path and make tests fully deterministic.
pub trait JwtClock: Send + Sync {
    /// Get current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

/// Test clock helpers for common scenarios.
#[cfg(test)]
pub mod test_clocks {
    use super::FixedClock;

    /// 2024-01-01 00:00:00 UTC - always valid for tests
    pub fn valid() -> FixedClock {
        FixedClock(1704067200)
    }

    /// 2030-01-01 00:00:00 UTC - far future for expiry tests
    pub fn future() -> FixedClock {
        FixedClock(1893456000)
    }
}

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

const INSECURE_DEFAULT: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Type-safe JWT secret that prevents accidental logging.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret. Empty input falls back to the insecure
    /// development default, which `validate_for_production` rejects.
    pub fn new(secret: String) -> Self {
        let normalized = if secret.trim().is_empty() {
            INSECURE_DEFAULT.to_string()
        } else {
            secret
        };
        Self(SecretString::new(normalized.into()))
    }

    /// Expose the secret value (use sparingly, only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Get the length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    /// Check if the secret is empty without exposing it.
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Check if the secret is the insecure default.
    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing and verification
    pub jwt_secret: JwtSecret,

    /// JWT algorithm (default: HS256)
    pub jwt_algorithm: Algorithm,

    /// JWT token expiration in seconds (default: 8 hours)
    pub jwt_expiration_secs: i64,

    /// JWT clock skew tolerance in seconds (default: 60)
    pub jwt_clock_skew_secs: i64,

    /// Clock for JWT time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret::new(
                std::env::var("CLINICA_JWT_SECRET").unwrap_or_default(),
            ),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: 8 * 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CLINICA_JWT_SECRET`: JWT signing secret
    /// - `CLINICA_JWT_EXPIRATION_SECS`: JWT token expiration (default: 28800)
    /// - `CLINICA_JWT_CLOCK_SKEW_SECS`: JWT clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        Self {
            jwt_secret: JwtSecret::new(
                std::env::var("CLINICA_JWT_SECRET").unwrap_or_default(),
            ),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("CLINICA_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8 * 3600),
            jwt_clock_skew_secs: std::env::var("CLINICA_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            clock: Arc::new(SystemClock),
        }
    }

    /// Validate the authentication configuration for production use.
    ///
    /// Called at server startup. In development mode, warnings are logged
    /// but the server continues; in production, insecure secrets are fatal.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let environment = std::env::var("CLINICA_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();

        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Cannot start server in production with insecure JWT secret. \
                     Set CLINICA_JWT_SECRET to a secure value. \
                     CLINICA_ENVIRONMENT={}",
                    environment
                )));
            } else {
                tracing::warn!(
                    "SECURITY WARNING: Using insecure default JWT secret. \
                     Set CLINICA_JWT_SECRET before deploying (minimum 32 characters)."
                );
            }
        }

        if self.jwt_secret.len() < 32 {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least 32 characters long.",
                    self.jwt_secret.len()
                )));
            } else if !self.jwt_secret.is_insecure_default() {
                tracing::warn!(
                    "SECURITY WARNING: JWT secret is short ({} chars). \
                     For production, use at least 32 characters.",
                    self.jwt_secret.len()
                );
            }
        }

        Ok(())
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// JWT claims structure.
///
/// Serde aliases accept the claim names observed across deployments: the
/// login systems mint `id`/`rol`/`nombre`, newer ones `sub`/`role`/`name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    #[serde(alias = "sub")]
    pub id: EntityId,

    /// Free-text role claim, normalized through `Role::from_claim`
    #[serde(alias = "role", default)]
    pub rol: String,

    /// Display name
    #[serde(alias = "name", default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,

    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims for a user using a clock.
    pub fn new(user_id: EntityId, role: &str, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();

        Self {
            id: user_id,
            rol: role.to_string(),
            nombre: None,
            email: None,
            iat: now,
            exp: now + expiration_secs,
        }
    }

    /// Normalized role for this token.
    pub fn role(&self) -> Role {
        Role::from_claim(&self.rol)
    }

    /// Check if the token has expired according to a clock.
    pub fn is_expired(&self, clock: &dyn JwtClock) -> bool {
        self.exp < clock.now_epoch_secs()
    }
}

// ============================================================================
// AUTHENTICATION CONTEXT
// ============================================================================

/// Authentication context extracted from request.
///
/// This is injected into Axum request extensions after successful
/// authentication and carried into access policy decisions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User id (from the token's id/sub claim)
    pub user_id: EntityId,

    /// Normalized role
    pub role: Role,

    /// Display name, when the token carries one
    pub name: Option<String>,

    /// Email address, when the token carries one
    pub email: Option<String>,
}

impl AuthContext {
    /// Build the context from validated claims.
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.id,
            role: claims.role(),
            name: claims.nombre.clone(),
            email: claims.email.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

// ============================================================================
// AUTHENTICATION FUNCTIONS
// ============================================================================

/// Validate JWT claim times using our own clock logic.
fn validate_claim_times(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    // Allow slightly-in-the-past expiry within leeway
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Validate a JWT token and extract claims.
///
/// This performs signature validation ONLY (no time validation) and then
/// applies our own expiry check with the injected clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false; // We'll do this ourselves with our clock
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::invalid_token("Token is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?;

    let claims = token_data.claims;

    let now = config.clock.now_epoch_secs();
    validate_claim_times(now, claims.exp, config.jwt_clock_skew_secs)?;

    Ok(claims)
}

/// Generate a signed JWT token for the given claims.
pub fn generate_jwt_token(config: &AuthConfig, claims: &Claims) -> ApiResult<String> {
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

/// Authenticate a bearer token and build the request context.
pub fn authenticate(config: &AuthConfig, bearer_token: &str) -> ApiResult<AuthContext> {
    let claims = validate_jwt_token(config, bearer_token)?;
    Ok(AuthContext::from_claims(&claims))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(clock: FixedClock) -> AuthConfig {
        AuthConfig {
            jwt_secret: JwtSecret::new("test-secret-that-is-long-enough-123456".to_string()),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(clock),
        }
    }

    #[test]
    fn test_jwt_generation_and_validation() -> ApiResult<()> {
        let config = test_config(test_clocks::valid());
        let claims = Claims::new(7, "TERAPEUTA", 3600, config.clock.as_ref());

        let token = generate_jwt_token(&config, &claims)?;
        let decoded = validate_jwt_token(&config, &token)?;

        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.role(), clinica_core::Role::Clinician);
        Ok(())
    }

    #[test]
    fn test_expired_token() -> ApiResult<()> {
        let config = test_config(test_clocks::valid());
        let claims = Claims::new(7, "ADMIN", 3600, config.clock.as_ref());
        let token = generate_jwt_token(&config, &claims)?;

        // Same token, clock far in the future
        let future = test_config(test_clocks::future());
        let err = validate_jwt_token(&future, &token).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::TokenExpired);
        Ok(())
    }

    #[test]
    fn test_wrong_secret_rejected() -> ApiResult<()> {
        let config = test_config(test_clocks::valid());
        let claims = Claims::new(1, "ADMIN", 3600, config.clock.as_ref());
        let token = generate_jwt_token(&config, &claims)?;

        let mut other = test_config(test_clocks::valid());
        other.jwt_secret = JwtSecret::new("a-completely-different-secret-0123456789".to_string());

        let err = validate_jwt_token(&other, &token).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidToken);
        Ok(())
    }

    #[test]
    fn test_claim_aliases() {
        // Tokens minted by older login systems use id/rol/nombre
        let legacy: Claims = serde_json::from_value(serde_json::json!({
            "id": 42,
            "rol": "ADMINISTRADOR",
            "nombre": "Ana",
            "exp": 1893456000i64
        }))
        .unwrap();
        assert_eq!(legacy.id, 42);
        assert_eq!(legacy.role(), clinica_core::Role::Administrator);
        assert_eq!(legacy.nombre.as_deref(), Some("Ana"));

        let modern: Claims = serde_json::from_value(serde_json::json!({
            "sub": 9,
            "role": "therapist",
            "name": "Luis",
            "exp": 1893456000i64
        }))
        .unwrap();
        assert_eq!(modern.id, 9);
        assert_eq!(modern.role(), clinica_core::Role::Clinician);
    }

    #[test]
    fn test_missing_role_claim_is_least_privilege() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "id": 3,
            "exp": 1893456000i64
        }))
        .unwrap();
        assert_eq!(claims.role(), clinica_core::Role::Clinician);
    }

    #[test]
    fn test_auth_context_from_claims() {
        let claims = Claims {
            id: 11,
            rol: "SUPER_ADMIN".to_string(),
            nombre: Some("Root".to_string()),
            email: Some("root@clinica.test".to_string()),
            iat: 0,
            exp: i64::MAX,
        };
        let ctx = AuthContext::from_claims(&claims);
        assert_eq!(ctx.user_id, 11);
        assert!(ctx.is_admin());
        assert_eq!(ctx.email.as_deref(), Some("root@clinica.test"));
    }

    #[test]
    fn test_clock_skew_tolerated() -> ApiResult<()> {
        let config = test_config(FixedClock(1000));
        // Expired 30s ago, inside the 60s leeway
        assert!(validate_claim_times(1000, 970, 60).is_ok());
        // Expired 120s ago, outside leeway
        assert!(validate_claim_times(1000, 880, 60).is_err());
        let _ = config;
        Ok(())
    }

    #[test]
    fn test_production_validation() {
        let config = test_config(test_clocks::valid());
        assert!(config.validate_for_production().is_ok());

        let insecure = AuthConfig {
            jwt_secret: JwtSecret::new(String::new()),
            ..test_config(test_clocks::valid())
        };
        assert!(insecure.jwt_secret.is_insecure_default());
    }
}
