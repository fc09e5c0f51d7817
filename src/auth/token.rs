/// JWT issuing and verification
use crate::error::{AppError, AppResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token kind carried in the token_type claim. An access token is never
/// accepted where a refresh token is expected and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Unique token id
    pub jti: String,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Parse the subject back into a user id
    pub fn user_id(&self) -> AppResult<i64> {
        self.sub
            .parse()
            .map_err(|_| AppError::invalid_credentials())
    }
}

/// Access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// JWT token service
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    access_ttl: u64,
    refresh_ttl: u64,
}

impl TokenService {
    pub fn new(secret: String, access_ttl: u64, refresh_ttl: u64) -> Self {
        Self {
            secret,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Issue an access/refresh pair for a user
    pub fn issue_pair(&self, user_id: i64) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenType::Access, self.access_ttl as i64)?,
            refresh_token: self.issue(user_id, TokenType::Refresh, self.refresh_ttl as i64)?,
        })
    }

    fn issue(&self, user_id: i64, token_type: TokenType, ttl_secs: i64) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            token_type: token_type.as_str().to_string(),
            iat: now,
            exp: now + ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and expiry and return the claims
    pub fn decode(&self, token: &str) -> AppResult<Claims> {
        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        // Allow some clock skew (5 minutes)
        validation.leeway = 300;

        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!("JWT verification failed: {}", e);
            AppError::invalid_credentials()
        })?;

        Ok(data.claims)
    }

    /// Decode and require an access token
    pub fn decode_access(&self, token: &str) -> AppResult<Claims> {
        self.decode_typed(token, TokenType::Access)
    }

    /// Decode and require a refresh token
    pub fn decode_refresh(&self, token: &str) -> AppResult<Claims> {
        self.decode_typed(token, TokenType::Refresh)
    }

    fn decode_typed(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let claims = self.decode(token)?;

        if claims.token_type != expected.as_str() {
            return Err(AppError::invalid_credentials());
        }

        Ok(claims)
    }
}
