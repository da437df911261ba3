//! Bearer token authentication
//!
//! Tokens are HS256 JWTs issued by the identity provider. `sub` carries the
//! owner account id; the verified identity is attached to the request as an
//! [`AuthenticatedUser`] extension.

use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
    Extension,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::ApiError;

#[derive(Clone)]
pub struct JwtConfig {
    key: Arc<DecodingKey>,
    validation: Validation,
}

impl JwtConfig {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret)),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, ApiError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthenticated("invalid or expired token".to_string())
        })?;

        let owner_id = Uuid::parse_str(&data.claims.sub).map_err(|_| {
            ApiError::Unauthenticated("token subject is not a user id".to_string())
        })?;

        Ok(AuthenticatedUser {
            owner_id,
            email: data.claims.email,
        })
    }
}

/// Claims read from session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Identity of the caller, available to handlers behind [`jwt_auth`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub owner_id: Uuid,
    pub email: Option<String>,
}

pub async fn jwt_auth(
    Extension(config): Extension<JwtConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".to_string()))?;

    let user = config.verify(token.trim())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
