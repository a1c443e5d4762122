/*!
 * # Authentication and Authorization
 *
 * Bearer JWTs (HS256) carry the user id and role. `auth_middleware` validates
 * them and stores an [`AuthUser`] in the request extensions; handlers turn it
 * into an [`Actor`] that services use for per-operation ownership checks.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::user::{self, Role};
use crate::errors::{ForbiddenReason, ServiceError};

pub mod password;

pub use password::{hash_password, verify_password};

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Role,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub token_id: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

/// Who is performing an operation. Passed explicitly into every service call
/// that needs an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn worker(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Worker,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(ForbiddenReason::AdminOnly))
        }
    }

    /// Admins act on anyone's behalf; workers only on their own.
    pub fn require_self_or_admin(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if self.is_admin() || self.user_id == user_id {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(ForbiddenReason::NotOwner))
        }
    }
}

impl From<&AuthUser> for Actor {
    fn from(user: &AuthUser) -> Self {
        user.actor()
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub token_lifetime: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        token_lifetime: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            token_lifetime,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        )
    }
}

/// Issued token plus the profile of the user it belongs to
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: user::Model,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

/// Issues and validates session tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Generate a JWT for a user
    pub fn generate_token(&self, user_id: Uuid, role: Role) -> Result<String, AuthError> {
        let now = Utc::now();
        let lifetime = ChronoDuration::from_std(self.config.token_lifetime)
            .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Verifies credentials and issues a token
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<LoginResponse, AuthError> {
        let found = user::Entity::find()
            .filter(user::Column::Username.eq(credentials.username.trim()))
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        let Some(account) = found else {
            debug!(username = %credentials.username, "Login for unknown user");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&credentials.password, &account.password_hash) {
            warn!(user_id = %account.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.generate_token(account.id, account.role)?;
        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.token_lifetime.as_secs() as i64,
            user: account,
        })
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidToken)?;

        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            role: claims.role,
            token_id: claims.jti,
        })
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "auth_missing",
                "Authentication required".to_string(),
            ),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "auth_invalid_credentials",
                "Invalid username or password".to_string(),
            ),
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "auth_missing_token",
                "No authentication token provided".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "auth_invalid_token",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "auth_token_expired",
                "Token has expired".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "admin_only",
                "Insufficient permissions".to_string(),
            ),
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "auth_internal_error",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self, "Authentication failed");
        }

        let body = crate::errors::ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: code.to_string(),
            message,
            details: None,
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Validates the bearer token and stores the caller in the request extensions
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match auth_service.authenticate(request.headers()) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Role middleware; must run inside `auth_middleware`
pub async fn role_middleware(
    State(required_role): State<Role>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if user.role != required_role {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self, auth_service: Arc<AuthService>) -> Self;
    fn with_role(self, role: Role, auth_service: Arc<AuthService>) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self, auth_service: Arc<AuthService>) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            auth_service,
            auth_middleware,
        ))
    }

    fn with_role(self, role: Role, auth_service: Arc<AuthService>) -> Self {
        self.layer(axum::middleware::from_fn_with_state(role, role_middleware))
            .with_auth(auth_service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> AuthService {
        // token handling never touches the database
        let db = DatabaseConnection::default();
        AuthService::new(
            AuthConfig::new(
                secret.to_string(),
                "sklad-clients".into(),
                "sklad-api".into(),
                Duration::from_secs(3600),
            ),
            Arc::new(db),
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        headers
    }

    #[test]
    fn token_round_trip_keeps_role() {
        let auth = service("unit-test-secret-with-enough-entropy-42");
        let user_id = Uuid::new_v4();
        let token = auth.generate_token(user_id, Role::Admin).unwrap();

        let caller = auth.authenticate(&bearer(&token)).unwrap();
        assert_eq!(caller.user_id, user_id);
        assert!(caller.is_admin());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = service("unit-test-secret-with-enough-entropy-42");
        let verifier = service("a-completely-different-secret-value-77");
        let token = issuer.generate_token(Uuid::new_v4(), Role::Worker).unwrap();

        assert!(matches!(
            verifier.authenticate(&bearer(&token)),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn missing_header_is_reported() {
        let auth = service("unit-test-secret-with-enough-entropy-42");
        assert!(matches!(
            auth.authenticate(&HeaderMap::new()),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn actor_checks() {
        let me = Uuid::new_v4();
        let worker = Actor::worker(me);
        assert!(worker.require_admin().is_err());
        assert!(worker.require_self_or_admin(me).is_ok());
        assert!(matches!(
            worker.require_self_or_admin(Uuid::new_v4()),
            Err(ServiceError::Forbidden(ForbiddenReason::NotOwner))
        ));
        assert!(Actor::admin(me).require_self_or_admin(Uuid::new_v4()).is_ok());
    }
}
