use crate::config::ConfigError;
use crate::error::GateError;
use crate::models::Claims;
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::debug;
use std::env;
use std::str::FromStr;

const BEARER_PREFIX: &str = "Bearer ";
const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Verifies bearer JWTs against the shared secret with a single pinned HMAC
/// algorithm.
pub struct TokenValidator {
    key: DecodingKey,
    algorithm: Algorithm,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8], algorithm: Algorithm, leeway_secs: u64) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret("JWT_SECRET"));
        }
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::UnsupportedAlgorithm(format!("{:?}", algorithm)));
        }
        let mut validation = Validation::new(algorithm);
        validation.leeway = leeway_secs;
        Ok(TokenValidator {
            key: DecodingKey::from_secret(secret),
            algorithm,
            validation,
        })
    }

    /// Reads `JWT_SECRET`, `JWT_ALGORITHM` (default HS256) and
    /// `JWT_LEEWAY_SECS` (default 60).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret = lookup("JWT_SECRET").unwrap_or_default();
        let algorithm = match lookup("JWT_ALGORITHM") {
            Some(raw) => Algorithm::from_str(raw.trim())
                .map_err(|_| ConfigError::UnsupportedAlgorithm(raw.clone()))?,
            None => Algorithm::HS256,
        };
        let leeway = match lookup("JWT_LEEWAY_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "JWT_LEEWAY_SECS",
                value: raw,
            })?,
            None => DEFAULT_LEEWAY_SECS,
        };
        Self::new(secret.as_bytes(), algorithm, leeway)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Checks the declared algorithm before touching the signature, then
    /// verifies signature and expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, GateError> {
        let header = decode_header(token).map_err(|e| {
            debug!("Rejecting token with unreadable header: {}", e);
            GateError::Unauthenticated("Invalid token")
        })?;
        if header.alg != self.algorithm {
            debug!(
                "Rejecting token signed with {:?}; expected {:?}",
                header.alg, self.algorithm
            );
            return Err(GateError::Unauthenticated("Invalid token"));
        }

        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token verification failed: {}", e);
                GateError::Unauthenticated("Invalid token")
            })
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, GateError> {
        let token = bearer_token(headers)?;
        self.validate(token)
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, GateError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(GateError::Unauthenticated("Unauthorized"))?;
    match value.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(GateError::Unauthenticated("Unauthorized")),
    }
}
