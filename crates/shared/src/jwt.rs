//! JWT verification for bearer tokens issued by the login service.
//!
//! The scheduling core never issues tokens. Production deployments verify
//! RS256 signatures against the login service's public key; development and
//! tests may use an HS256 shared secret.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to decode token: {0}")]
    DecodingError(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// JWT token claims read by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// JWT ID
    #[serde(default)]
    pub jti: String,
}

/// Default leeway in seconds for clock skew tolerance
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Verifies bearer tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    leeway_secs: u64,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithm", &self.algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl JwtVerifier {
    /// Creates a verifier from an RSA public key in PEM format.
    pub fn from_rsa_pem(public_key_pem: &str, leeway_secs: u64) -> Result<Self, JwtError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(format!("Invalid public key: {}", e)))?;
        Ok(Self {
            decoding_key,
            algorithm: Algorithm::RS256,
            leeway_secs,
        })
    }

    /// Creates a verifier for HS256 tokens signed with a shared secret.
    pub fn from_secret(secret: &str, leeway_secs: u64) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::InvalidKey("Shared secret is empty".into()));
        }
        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            leeway_secs,
        })
    }

    /// Validates a token and returns its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = self.leeway_secs;
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_string());
        validation.required_spec_claims.insert("sub".to_string());

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidToken,
                _ => JwtError::DecodingError(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Validates a token and returns the subject as a user ID.
    pub fn verify_user_id(&self, token: &str) -> Result<Uuid, JwtError> {
        let claims = self.verify(token)?;
        extract_user_id(&claims)
    }
}

/// Extracts user ID from validated claims.
pub fn extract_user_id(claims: &Claims) -> Result<Uuid, JwtError> {
    Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test_secret_key_for_jwt_testing_12345";

    fn sign(sub: &str, exp_offset_secs: i64, secret: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + Duration::seconds(exp_offset_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_valid_token() {
        let verifier = JwtVerifier::from_secret(SECRET, 0).unwrap();
        let user_id = Uuid::new_v4();
        let token = sign(&user_id.to_string(), 600, SECRET);

        assert_eq!(verifier.verify_user_id(&token).unwrap(), user_id);
    }

    #[test]
    fn test_expired_token() {
        let verifier = JwtVerifier::from_secret(SECRET, 0).unwrap();
        let token = sign(&Uuid::new_v4().to_string(), -120, SECRET);

        assert!(matches!(verifier.verify(&token), Err(JwtError::TokenExpired)));
    }

    #[test]
    fn test_leeway_accepts_recently_expired() {
        let verifier = JwtVerifier::from_secret(SECRET, 300).unwrap();
        let token = sign(&Uuid::new_v4().to_string(), -60, SECRET);

        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::from_secret(SECRET, 0).unwrap();
        let token = sign(&Uuid::new_v4().to_string(), 600, "another_secret");

        assert!(matches!(verifier.verify(&token), Err(JwtError::InvalidToken)));
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let verifier = JwtVerifier::from_secret(SECRET, 0).unwrap();
        let token = sign("not-a-uuid", 600, SECRET);

        assert!(matches!(
            verifier.verify_user_id(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn test_malformed_token() {
        let verifier = JwtVerifier::from_secret(SECRET, 0).unwrap();
        assert!(verifier.verify("not_a_jwt").is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            JwtVerifier::from_secret("", 0),
            Err(JwtError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_invalid_rsa_key_rejected() {
        assert!(matches!(
            JwtVerifier::from_rsa_pem("not a pem", 0),
            Err(JwtError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let verifier = JwtVerifier::from_secret(SECRET, 0).unwrap();
        let debug = format!("{:?}", verifier);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(SECRET));
    }
}
