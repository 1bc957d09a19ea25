use crate::error::{AppError, Result};
use crate::models::{NewProfile, Profile};
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{headers, TypedHeader};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Identity asserted by the upstream identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// External user id
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(external_user_id: &str, name: &str, email: &str, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: external_user_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            image_url: None,
            exp: (now + Duration::hours(expires_in_hours)).timestamp(),
            iat: now.timestamp(),
        }
    }

    fn into_new_profile(self) -> NewProfile {
        NewProfile {
            external_user_id: self.sub,
            name: self.name,
            email: self.email,
            image_url: self.image_url,
        }
    }
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String> {
    let token = encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Verify a bearer token and return its profile, creating the profile on first contact.
pub async fn profile_from_token(state: &AppState, token: &str) -> Result<Profile> {
    let claims = verify_token(token, &state.config.jwt_secret)?;
    state.store.get_or_create_profile(claims.into_new_profile()).await
}

/// Extractor for authenticated requests
pub struct CurrentProfile(pub Profile);

impl FromRequestParts<AppState> for CurrentProfile {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        let TypedHeader(auth_header) = parts
            .extract::<TypedHeader<headers::Authorization<headers::authorization::Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let profile = profile_from_token(state, auth_header.token()).await?;
        Ok(CurrentProfile(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_identity() {
        let mut claims = Claims::new("user_123", "Ada", "ada@example.com", 1);
        claims.image_url = Some("https://img.example/ada.png".to_string());
        let token = create_token(&claims, "secret").unwrap();

        let verified = verify_token(&token, "secret").unwrap();
        assert_eq!(verified.sub, "user_123");
        assert_eq!(verified.image_url.as_deref(), Some("https://img.example/ada.png"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims::new("user_123", "Ada", "ada@example.com", 1);
        let token = create_token(&claims, "secret").unwrap();
        let err = verify_token(&token, "other").unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims::new("user_123", "Ada", "ada@example.com", -2);
        let token = create_token(&claims, "secret").unwrap();
        assert!(verify_token(&token, "secret").is_err());
    }
}
