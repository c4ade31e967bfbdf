use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::beach_day_error::BeachDayError;

pub const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues an HS256 token for `username` that expires after `ttl`.
pub fn sign(username: &str, secret: &str, ttl: Duration) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        username: username.to_owned(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn verify(token: Option<&str>, secret: &str) -> Result<Claims, BeachDayError> {
    let token = token
        .filter(|token| !token.is_empty())
        .ok_or(BeachDayError::InvalidToken)?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|error| {
            tracing::debug!("rejected token: {error}");
            BeachDayError::InvalidToken
        })
}

pub async fn hash_password(password: String, cost: u32) -> anyhow::Result<String> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

pub async fn verify_password(password: String, hash: String) -> anyhow::Result<bool> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}
