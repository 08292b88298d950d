use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{Actor, UserRole};
use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String,  // user id
    pub role: String, // student, teacher or admin
    pub exp: usize,
    pub iat: usize,
}

impl JwtClaims {
    pub fn for_actor(actor: &Actor, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: actor.id.clone(),
            role: actor.role.as_str().to_string(),
            exp: (now + ttl_seconds) as usize,
            iat: now as usize,
        }
    }

    pub fn actor(&self) -> Result<Actor, AuthError> {
        let role = UserRole::parse(&self.role).ok_or(AuthError::UnknownRole)?;
        Ok(Actor::new(self.sub.clone(), role))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Unknown role in token")]
    UnknownRole,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        use jsonwebtoken::errors::ErrorKind;

        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)
}

/// Resolves the bearer token into an [`Actor`] request extension
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let actor = bearer_token(&headers)
        .and_then(|token| jwt_service.validate_token(token))
        .and_then(|claims| claims.actor())
        .map_err(|e| {
            tracing::warn!("Authentication failed: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

    tracing::debug!("Authenticated user: {} (role: {})", actor.id, actor.role.as_str());

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

/// Teacher or admin only. Must run after [`auth_middleware`].
pub async fn staff_guard_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    match request.extensions().get::<Actor>() {
        Some(actor) if actor.is_staff() => Ok(next.run(request).await),
        Some(actor) => {
            tracing::warn!("Access denied for {}: staff role required", actor.id);
            Err(StatusCode::FORBIDDEN)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
