use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::{Error, Result};
use crate::types::{PrincipalId, Token};

const ARGON2_MEMORY: u32 = 64 * 1024; // 64KB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "vellum";
const LOOKUP_LENGTH: usize = 8;
const SECRET_LENGTH: usize = 24;
const SECRET_BYTES: usize = 12;

/// Issues API tokens and hashes credentials (tokens and passwords) with Argon2id.
pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl TokenGenerator {
    pub fn new() -> Result<Self> {
        Self::with_cost(ARGON2_MEMORY, ARGON2_ITERATIONS, ARGON2_PARALLELISM)
    }

    /// Argon2id with explicit memory (KiB), iteration and lane costs.
    pub fn with_cost(memory: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory, iterations, parallelism, Some(ARGON2_OUTPUT_LEN))
            .map_err(|e| Error::Config(format!("invalid argon2 parameters: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Generates a new token with the format: vellum_<lookup>_<secret>
    /// Returns (raw_token, lookup, hash)
    pub fn generate(&self) -> Result<(String, String, String)> {
        let lookup = generate_lookup();
        let secret = generate_secret();
        let raw_token = build_token(&lookup, &secret);
        let hash = self.hash(&raw_token)?;
        Ok((raw_token, lookup, hash))
    }

    /// Generates a token for a user. The raw token is only available here.
    pub fn issue(
        &self,
        user_id: PrincipalId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(Token, String)> {
        let (raw_token, lookup, hash) = self.generate()?;
        let token = Token {
            id: uuid::Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            user_id,
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };
        Ok((token, raw_token))
    }

    /// Hashes a raw token or password using Argon2id
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash credential: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verifies a raw token or password against a stored hash
    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify credential: {e}"))),
        }
    }
}

/// First 8 chars of a UUID
#[must_use]
fn generate_lookup() -> String {
    let uuid = uuid::Uuid::new_v4();
    uuid.to_string()[..LOOKUP_LENGTH].to_string()
}

#[must_use]
fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)[..SECRET_LENGTH].to_string()
}

#[must_use]
fn build_token(lookup: &str, secret: &str) -> String {
    format!("{TOKEN_PREFIX}_{lookup}_{secret}")
}

/// Parses a token string into its components (lookup, secret)
pub fn parse_token(token: &str) -> Result<(String, String)> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;
    if lookup.len() != LOOKUP_LENGTH || secret.len() != SECRET_LENGTH || secret.contains('_') {
        return Err(Error::InvalidTokenFormat);
    }

    Ok((lookup.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation_format() {
        let generator = TokenGenerator::new().unwrap();
        let (token, lookup, _hash) = generator.generate().unwrap();

        assert!(token.starts_with("vellum_"));
        assert_eq!(lookup.len(), 8);

        let parts: Vec<&str> = token.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "vellum");
        assert_eq!(parts[2].len(), 24);
    }

    #[test]
    fn test_issue_binds_token_to_user() {
        let generator = TokenGenerator::new().unwrap();
        let user = PrincipalId::new();
        let (token, raw) = generator.issue(user, None).unwrap();

        assert_eq!(token.user_id, user);
        assert!(raw.contains(&token.token_lookup));
        assert!(generator.verify(&raw, &token.token_hash).unwrap());
    }

    #[test]
    fn test_password_verification() {
        let generator = TokenGenerator::new().unwrap();
        let hash = generator.hash("hunter2").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(generator.verify("hunter2", &hash).unwrap());
        assert!(!generator.verify("hunter3", &hash).unwrap());
    }

    #[test]
    fn test_invalid_argon2_cost_is_config_error() {
        let err = TokenGenerator::with_cost(ARGON2_MEMORY, 0, ARGON2_PARALLELISM)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("argon2")));
    }

    #[test]
    fn test_secret_is_lowercase_hex() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_LENGTH);
        assert!(secret.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn test_parse_token_valid() {
        let (lookup, secret) = parse_token("vellum_12345678_123456789012345678901234").unwrap();
        assert_eq!(lookup, "12345678");
        assert_eq!(secret, "123456789012345678901234");
    }

    #[test]
    fn test_parse_token_rejects_malformed() {
        assert!(parse_token("invalid_12345678_123456789012345678901234").is_err());
        assert!(parse_token("vellum_12345678").is_err());
        assert!(parse_token("vellum_1234_123456789012345678901234").is_err());
    }
}
