//! Bearer token authentication.

use crate::api::AppState;
use crate::error::VideoError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Issuer stamped on access tokens
pub const TOKEN_ISSUER: &str = "tubely-access";

/// JWT claims of an access token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub iss: String,
    /// Subject (user ID)
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, VideoError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| VideoError::Authentication("Couldn't find JWT".to_string()))?
        .to_str()
        .map_err(|_| VideoError::Authentication("Malformed authorization header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            VideoError::Authentication("Authorization must use Bearer scheme".to_string())
        })?;

    Ok(token)
}

/// Verify an HS256 token and return the user it was issued to
pub fn validate_token(token: &str, secret: &str) -> Result<Uuid, VideoError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[TOKEN_ISSUER]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| VideoError::Authentication(format!("Couldn't validate JWT: {}", e)))?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| VideoError::Authentication("Invalid subject in JWT".to_string()))
}

/// The caller's identity, taken from a verified bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = VideoError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let user_id = validate_token(token, &state.jwt_secret)?;
        Ok(AuthenticatedUser(user_id))
    }
}

#[cfg(test)]
pub(crate) fn issue_token(user_id: Uuid, secret: &str, expires_in_seconds: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: TOKEN_ISSUER.to_string(),
        sub: user_id.to_string(),
        iat: now as usize,
        exp: (now + expires_in_seconds) as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
