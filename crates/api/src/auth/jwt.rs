//! JWT validation for bearer tokens issued by the identity service

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Acting user id
    pub sub: Uuid,
    /// "business" for owner accounts, "admin" for back-office staff
    pub role: String,
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// HS256 token validator
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    /// Issue a token; used by local tooling and tests, the identity
    /// service signs production tokens with the same secret
    pub fn create_token(
        &self,
        user_id: Uuid,
        role: &str,
        email: Option<&str>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            role: role.to_string(),
            email: email.map(|e| e.to_string()),
            iat: now.unix_timestamp(),
            exp: (now + time::Duration::hours(self.expiry_hours)).unix_timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}
