//! Credential service: password hashing, the password policy and bearer tokens.
//!
//! The core treats this as an opaque collaborator behind [`CredentialService`].
//! [`LocalCredentials`] is the shipped implementation: Argon2id password
//! hashes and HS256 JWTs whose `jti` is the only thing the store remembers.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::models::TokenRecord;
use crate::config::AuthConfig;
use crate::error::{ErrorCode, Result, SchoolError};
use crate::ids::AccountId;

// ═══════════════════════════════════════════════════════════════════════════════
// JWT Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// Bearer token claims.
///
/// Every field is derived from a [`TokenRecord`], so signing the same record
/// twice yields the same token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,

    /// Token ID, the key of the stored record
    pub jti: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer
    pub iss: String,
}

impl Claims {
    fn from_record(record: &TokenRecord, issuer: &str) -> Self {
        Self {
            sub: record.account_id.to_string(),
            jti: record.jti.clone(),
            iat: record.issued_at.timestamp(),
            exp: record.expires_at.timestamp(),
            iss: issuer.to_string(),
        }
    }

    /// The account this token was issued to.
    pub fn account_id(&self) -> Result<AccountId> {
        self.sub
            .parse()
            .map_err(|_| SchoolError::new(ErrorCode::InvalidToken, "Malformed token subject"))
    }
}

/// A signed token together with the record the store keeps for it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub record: TokenRecord,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service Contract
// ═══════════════════════════════════════════════════════════════════════════════

/// Password and token mechanics used by registration and login.
pub trait CredentialService: Send + Sync {
    /// Reject passwords that fail the strength policy.
    fn check_password_policy(&self, password: &str, username: &str, email: &str) -> Result<()>;

    fn hash_password(&self, password: &str) -> Result<String>;

    /// `false` for a wrong password or an unparseable hash.
    fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// Create a fresh token record for an account and sign it.
    fn issue_token(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<IssuedToken>;

    /// Re-derive the bearer value of an existing record.
    fn sign_record(&self, record: &TokenRecord) -> Result<String>;

    /// Verify signature, issuer and expiry of a bearer value.
    fn decode_token(&self, token: &str) -> Result<Claims>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Password Policy
// ═══════════════════════════════════════════════════════════════════════════════

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "letmein1", "welcome1", "admin123",
    "abc12345", "football", "baseball", "sunshine", "princess", "trustno1",
];

/// Password strength rules.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl PasswordPolicy {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// Collect every violated rule, so the caller sees them all at once.
    pub fn violations(&self, password: &str, username: &str, email: &str) -> Vec<String> {
        let mut problems = Vec::new();
        let lowered = password.to_lowercase();

        if password.chars().count() < self.min_length {
            problems.push(format!(
                "This password is too short. It must contain at least {} characters.",
                self.min_length
            ));
        }
        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            problems.push("This password is entirely numeric.".to_string());
        }
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            problems.push("This password is too common.".to_string());
        }

        let email_local = email.split('@').next().unwrap_or_default();
        let too_similar = [username, email_local]
            .iter()
            .filter(|attr| attr.len() >= 3)
            .any(|attr| {
                let attr = attr.to_lowercase();
                lowered.contains(&attr) || attr.contains(&lowered)
            });
        if too_similar {
            problems.push("The password is too similar to the username or email.".to_string());
        }

        problems
    }

    pub fn validate(&self, password: &str, username: &str, email: &str) -> Result<()> {
        let problems = self.violations(password, username, email);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SchoolError::validation(problems.join(" ")).with_context("password", problems))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Local Implementation
// ═══════════════════════════════════════════════════════════════════════════════

/// Argon2 + HS256 credential service.
pub struct LocalCredentials {
    policy: PasswordPolicy,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl LocalCredentials {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.jwt_secret.is_empty() {
            return Err(SchoolError::new(
                ErrorCode::ConfigurationError,
                "auth.jwt_secret must not be empty",
            ));
        }

        let ttl = Duration::from_std(config.token_ttl).map_err(|e| {
            SchoolError::with_internal(
                ErrorCode::ConfigurationError,
                "auth.token_ttl is out of range",
                e.to_string(),
            )
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Ok(Self {
            policy: PasswordPolicy::new(config.password_min_length),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            ttl,
        })
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }
}

impl CredentialService for LocalCredentials {
    fn check_password_policy(&self, password: &str, username: &str, email: &str) -> Result<()> {
        self.policy.validate(password, username, email)
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| SchoolError::internal(format!("password hashing failed: {}", e)))
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                debug!(error = %e, "Stored password hash is unparseable");
                false
            }
        }
    }

    fn issue_token(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<IssuedToken> {
        // JWT timestamps have second precision; truncate so re-signing matches.
        let issued_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let record = TokenRecord {
            jti: Uuid::new_v4().to_string(),
            account_id,
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        let token = self.sign_record(&record)?;
        Ok(IssuedToken { token, record })
    }

    fn sign_record(&self, record: &TokenRecord) -> Result<String> {
        let claims = Claims::from_record(record, &self.issuer);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SchoolError::internal(format!("token signing failed: {}", e)))
    }

    fn decode_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Bearer token rejected");
                SchoolError::new(ErrorCode::InvalidToken, "Invalid or expired token")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> LocalCredentials {
        LocalCredentials::new(&AuthConfig::new("unit-test-secret")).unwrap()
    }

    #[test]
    fn test_policy_accepts_reasonable_password() {
        let policy = PasswordPolicy::new(8);
        assert!(policy.validate("Tr1cky-Walrus", "alice", "alice@example.com").is_ok());
    }

    #[test]
    fn test_policy_reports_every_violation() {
        let policy = PasswordPolicy::new(8);
        let problems = policy.violations("1234", "alice", "alice@example.com");
        assert_eq!(problems.len(), 2);

        let err = policy.validate("alice2024", "alice", "alice@example.com").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        assert!(!policy.violations("password", "bob", "bob@example.com").is_empty());
    }

    #[test]
    fn test_hash_and_verify() {
        let creds = credentials();
        let hash = creds.hash_password("Tr1cky-Walrus").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(creds.verify_password("Tr1cky-Walrus", &hash));
        assert!(!creds.verify_password("wrong", &hash));
        assert!(!creds.verify_password("Tr1cky-Walrus", "not-a-hash"));
    }

    #[test]
    fn test_signing_a_record_is_deterministic() {
        let creds = credentials();
        let issued = creds.issue_token(AccountId::new(), Utc::now()).unwrap();
        let again = creds.sign_record(&issued.record).unwrap();
        assert_eq!(issued.token, again);

        let claims = creds.decode_token(&issued.token).unwrap();
        assert_eq!(claims.jti, issued.record.jti);
        assert_eq!(claims.account_id().unwrap(), issued.record.account_id);
    }

    #[test]
    fn test_expired_or_foreign_tokens_rejected() {
        let creds = credentials();
        let issued = creds
            .issue_token(AccountId::new(), Utc::now() - Duration::days(3))
            .unwrap();
        let err = creds.decode_token(&issued.token).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);

        let other = LocalCredentials::new(&AuthConfig::new("another-secret")).unwrap();
        let fresh = other.issue_token(AccountId::new(), Utc::now()).unwrap();
        assert!(creds.decode_token(&fresh.token).is_err());
    }

    #[test]
    fn test_empty_secret_is_a_configuration_error() {
        let err = LocalCredentials::new(&AuthConfig::new("")).err().unwrap();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }
}
