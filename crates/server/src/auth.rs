//! Credential handling: Argon2id password hashing and HS256 bearer tokens.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use trusty_core::config::AuthConfig;
use trusty_core::domain::user::UserId;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token issuance failed: {0}")]
    Token(String),
    #[error("invalid or expired token")]
    InvalidToken,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl_secs: u64,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|error| AuthError::Hash(error.to_string()))?;
        Ok(hash.to_string())
    }

    /// Constant-time verification against a stored PHC string. An unparsable
    /// stored hash counts as a mismatch.
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> bool {
        PasswordHash::new(stored_hash)
            .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }

    pub fn issue_token(&self, user_id: &UserId) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.token_ttl_secs as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| AuthError::Token(error.to_string()))
    }

    pub fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|_| AuthError::InvalidToken)?;
        let id = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(UserId(id))
    }

    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }
}

#[cfg(test)]
mod tests {
    use trusty_core::config::AuthConfig;
    use trusty_core::domain::user::UserId;

    use super::{AuthError, AuthService};

    fn service() -> AuthService {
        AuthService::new(&AuthConfig {
            jwt_secret: String::from("test-secret").into(),
            token_ttl_secs: 3_600,
        })
    }

    #[test]
    fn password_hash_round_trip() {
        let auth = service();
        let hash = auth.hash_password("correct horse battery").expect("hash");

        assert!(hash.starts_with("$argon2id$"));
        assert!(auth.verify_password("correct horse battery", &hash));
        assert!(!auth.verify_password("wrong password", &hash));
    }

    #[test]
    fn same_password_hashes_to_distinct_strings() {
        let auth = service();
        let first = auth.hash_password("hunter22").expect("hash");
        let second = auth.hash_password("hunter22").expect("hash");
        assert_ne!(first, second, "salts must differ");
    }

    #[test]
    fn garbage_stored_hash_is_a_mismatch_not_a_panic() {
        let auth = service();
        assert!(!auth.verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trip_recovers_the_user_id() {
        let auth = service();
        let user_id = UserId::generate();

        let token = auth.issue_token(&user_id).expect("issue");
        let decoded = auth.authenticate(&token).expect("authenticate");
        assert_eq!(decoded, user_id);
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let issuer = AuthService::new(&trusty_core::config::AuthConfig {
            jwt_secret: String::from("other-secret").into(),
            token_ttl_secs: 3_600,
        });
        let token = issuer.issue_token(&UserId::generate()).expect("issue");

        let error = service().authenticate(&token).expect_err("wrong secret");
        assert!(matches!(error, AuthError::InvalidToken));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let error = service().authenticate("not.a.jwt").expect_err("garbage");
        assert!(matches!(error, AuthError::InvalidToken));
    }
}
