//! Bearer token encoding and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Caller identity carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "UserRoleID")]
    pub user_role_id: i64,
    #[serde(rename = "RoleSlug")]
    pub role_slug: String,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_info: UserInfo,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// HS256 token issuer and validator.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_token_ttl: Duration::minutes(config.jwt_access_token_expiry_minutes),
        }
    }

    /// Issue an access token valid from now.
    pub fn issue(&self, user_info: UserInfo) -> Result<String> {
        self.issue_at(user_info, Utc::now())
    }

    pub fn issue_at(&self, user_info: UserInfo, issued_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            user_info,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.access_token_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Verify signature and expiry and return the claims.
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))?;
        if data.claims.user_info.id <= 0 {
            return Err(AppError::Authentication("Token has no user".into()));
        }
        Ok(data.claims)
    }
}
