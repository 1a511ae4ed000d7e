//! Auth verifier: the gateway's only dependency on the authentication
//! backend, which is an external collaborator to this core.
//! `verify_token` is a narrow interface; the default implementation
//! decodes and checks a JWT, without the login/session-registry
//! machinery that belongs to the excluded administration surface.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<String, CoreError>;
}

pub struct JwtAuthVerifier {
    secret: String,
}

impl JwtAuthVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }
}

#[async_trait]
impl AuthVerifier for JwtAuthVerifier {
    async fn verify_token(&self, token: &str) -> Result<String, CoreError> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| CoreError::AuthInvalid(e.to_string()))?;
        Ok(decoded.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[tokio::test]
    async fn valid_token_yields_user_id() {
        let secret = "test-secret";
        let claims = Claims { sub: "user-1".into(), iat: 0, exp: 9_999_999_999 };
        let token =
            encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
                .unwrap();

        let verifier = JwtAuthVerifier::new(secret);
        let user_id = verifier.verify_token(&token).await.unwrap();
        assert_eq!(user_id, "user-1");
    }

    #[tokio::test]
    async fn garbage_token_is_auth_invalid() {
        let verifier = JwtAuthVerifier::new("test-secret");
        let err = verifier.verify_token("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, CoreError::AuthInvalid(_)));
    }
}
