//! JWT Authentication Middleware
//!
//! Access tokens travel in the `access_token` cookie or an
//! `Authorization: Bearer` header. The middleware re-reads the user so role
//! and status changes take effect before the token expires.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    db::UserRepository,
    models::{User, UserRole, UserStatus},
    services::Actor,
    utils::{error::ErrorResponse, AppError, AppResult},
    AppState,
};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User e-mail at issue time
    pub email: String,
    /// Role at issue time; the middleware trusts the database copy instead
    pub role: UserRole,
    /// Owning tenant (absent for super admins)
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Not before timestamp
    pub nbf: i64,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// Authenticated user, refreshed from the database on every request
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// User ID
    pub id: Uuid,
    /// Current e-mail
    pub email: String,
    /// Current role
    pub role: UserRole,
    /// Current lifecycle status
    pub status: UserStatus,
    /// Owning tenant (None for super admins)
    pub tenant_id: Option<Uuid>,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            status: user.status,
            tenant_id: user.tenant_id,
        }
    }
}

impl AuthUser {
    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }

    pub fn is_tenant_admin(&self) -> bool {
        self.role == UserRole::TenantAdmin
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            tenant_id: self.tenant_id,
        }
    }

    pub fn require_super_admin(&self) -> AppResult<()> {
        if self.is_super_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Super admin role required"))
        }
    }

    /// Super admins or tenant admins
    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_super_admin() || self.is_tenant_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Administrator role required"))
        }
    }

    /// The caller's tenant
    pub fn require_tenant(&self) -> AppResult<Uuid> {
        self.tenant_id
            .ok_or_else(|| AppError::forbidden("You do not belong to an organization"))
    }

    /// Tenant of an administrator of that tenant
    pub fn require_tenant_admin(&self) -> AppResult<Uuid> {
        if !self.is_tenant_admin() {
            return Err(AppError::forbidden("Tenant administrator role required"));
        }
        self.require_tenant()
    }

    pub fn require_active(&self) -> AppResult<()> {
        if self.status == UserStatus::Active {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "This action requires an active account (current status: {})",
                self.status
            )))
        }
    }
}

/// Extractor for AuthUser from request extensions
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "Authentication required")),
            )
        })
    }
}

/// Create a new JWT access token
pub fn create_access_token(
    user: &User,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role,
        tenant_id: user.tenant_id.map(|t| t.to_string()),
        iat: now.timestamp(),
        exp: exp.timestamp(),
        nbf: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate and decode a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<TokenData<Claims>, AuthError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })
}

/// Session cookie carrying the access token
pub fn session_cookie(config: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie matching the session cookie, for `CookieJar::remove`
pub fn removal_cookie(config: &AuthConfig) -> Cookie<'static> {
    Cookie::build(config.cookie_name.clone()).path("/").build()
}

/// Authentication error types
#[derive(Debug)]
pub enum AuthError {
    /// No bearer header and no session cookie
    MissingToken,
    /// Bad signature, malformed claims or unknown user
    InvalidToken,
    TokenExpired,
    /// The user's status no longer allows sign-in
    AccountDisabled,
    /// The user could not be loaded
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing authentication token",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid authentication token",
            ),
            AuthError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication token has expired",
            ),
            AuthError::AccountDisabled => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "This account can no longer sign in",
            ),
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An unexpected error occurred. Please try again later.",
            ),
        };

        (status, Json(ErrorResponse::new(error, message))).into_response()
    }
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}

/// Token from the Authorization header, else the session cookie
fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
    {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Authentication middleware
///
/// Validates the token, loads the user and injects [`AuthUser`] into the
/// request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_token(request.headers(), &state.config.auth.cookie_name)
        .ok_or(AuthError::MissingToken)?;
    let token_data = validate_token(&token, &state.config.auth.jwt_secret)?;

    // Reload the user so status and role changes apply to live sessions
    let user_id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| AuthError::InvalidToken)?;

    let user = UserRepository::new(&state.db)
        .get_by_id(user_id)
        .await
        .map_err(|e| {
            error!("Failed to load authenticated user: {:#}", e);
            AuthError::Internal
        })?
        .ok_or(AuthError::InvalidToken)?;

    if !user.status.can_login() {
        return Err(AuthError::AccountDisabled);
    }

    request.extensions_mut().insert(AuthUser::from(&user));

    Ok(next.run(request).await)
}
