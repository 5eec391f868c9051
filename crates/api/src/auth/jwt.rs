//! Bearer tokens identifying the lock requester.
//!
//! Tokens are HS256 JWTs issued by the identity service that fronts the
//! editors; this server only verifies them. [`issue_token`] exists for tests
//! and local tooling.

use editlock_core::error::CoreError;
use editlock_core::roles::ROLE_ADMIN;
use editlock_core::types::UserId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::parse_env;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The lock holder identity.
    pub sub: UserId,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Lifetime of tokens minted by [`issue_token`].
    pub token_ttl_mins: i64,
    /// Clock tolerance applied to `exp`.
    pub leeway_secs: u64,
}

impl JwtConfig {
    /// | Env Var             | Required | Default |
    /// |---------------------|----------|---------|
    /// | `JWT_SECRET`        | **yes**  | --      |
    /// | `JWT_TOKEN_TTL_MINS`| no       | `15`    |
    /// | `JWT_LEEWAY_SECS`   | no       | `30`    |
    pub fn from_env() -> Result<Self, CoreError> {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::Validation("JWT_SECRET must be set".into()))?;

        Ok(Self {
            secret,
            token_ttl_mins: parse_env("JWT_TOKEN_TTL_MINS", 15)?,
            leeway_secs: parse_env("JWT_LEEWAY_SECS", 30)?,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation
    }
}

pub fn issue_token(user_id: UserId, role: &str, config: &JwtConfig) -> Result<String, CoreError> {
    let iat = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: iat + config.token_ttl_mins * 60,
        iat,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| CoreError::Internal(format!("Failed to sign token: {e}")))
}

/// Check signature and expiry. Failures are always `Unauthorized`.
pub fn verify_token(token: &str, config: &JwtConfig) -> Result<Claims, CoreError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &config.validation(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => CoreError::Unauthorized("Token has expired".into()),
        _ => CoreError::Unauthorized("Invalid token".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use editlock_core::roles::ROLE_EDITOR;

    fn config(secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            token_ttl_mins: 15,
            leeway_secs: 0,
        }
    }

    #[test]
    fn test_issued_token_verifies() {
        let config = config("test-secret-that-is-long-enough-for-hmac");
        let token = issue_token(42, ROLE_EDITOR, &config).unwrap();

        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, 42);
        assert!(!claims.is_admin());
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_expired_token_is_reported_as_expired() {
        let config = JwtConfig {
            token_ttl_mins: -5,
            ..config("test-secret-that-is-long-enough-for-hmac")
        };
        let token = issue_token(1, ROLE_ADMIN, &config).unwrap();

        assert_matches!(
            verify_token(&token, &config),
            Err(CoreError::Unauthorized(msg)) if msg == "Token has expired"
        );
    }

    #[test]
    fn test_token_from_another_secret_is_invalid() {
        let token = issue_token(1, ROLE_EDITOR, &config("secret-alpha")).unwrap();
        assert_matches!(
            verify_token(&token, &config("secret-bravo")),
            Err(CoreError::Unauthorized(msg)) if msg == "Invalid token"
        );
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert_matches!(
            verify_token("not-a-jwt", &config("s")),
            Err(CoreError::Unauthorized(_))
        );
    }
}
