//! Bearer token verification.
//!
//! A [`TokenValidator`] turns the raw `Authorization` header into verified
//! [`TokenClaims`]. Verification order matters: the header algorithm is
//! checked against the allow-list before any signature work, the signature is
//! checked before the payload is trusted, and expiry is re-checked against the
//! wall clock after the library has accepted the token.
use std::str::FromStr;

use chrono::{DateTime, Utc};
use http::{HeaderMap, header::AUTHORIZATION};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, errors::ErrorKind};
use serde::Deserialize;
use thiserror::Error;

use crate::config::AuthConfig;

/// Reasons a request fails authentication. Every variant maps to 401.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("authorization header is required")]
    MissingHeader,

    #[error("authorization header format must be Bearer {{token}}")]
    MalformedHeader,

    #[error("token signing algorithm is not allowed")]
    DisallowedAlgorithm(String),

    #[error("invalid token")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,

    #[error("token has no subject")]
    MissingSubject,
}

impl AuthError {
    /// Short, stable label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::DisallowedAlgorithm(_) => "disallowed_algorithm",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::Expired => "expired",
            AuthError::MissingSubject => "missing_subject",
        }
    }
}

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Wire shape of the token payload. Only ever decoded after signature
/// verification, and never handed out of this module.
#[derive(Debug, Deserialize)]
struct WireClaims {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    exp: i64,
}

/// Verifies HMAC-signed bearer tokens under a single shared secret.
pub struct TokenValidator {
    key: DecodingKey,
    allowed: Vec<Algorithm>,
    leeway_secs: u64,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("allowed", &self.allowed)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Build a validator from the auth configuration.
    ///
    /// Only HMAC algorithms can be allowed: the key is a shared secret, so an
    /// asymmetric algorithm in the list would never verify anything.
    pub fn new(config: &AuthConfig) -> eyre::Result<Self> {
        if config.jwt_secret.is_empty() {
            eyre::bail!("auth.jwt_secret must not be empty");
        }

        let mut allowed = Vec::with_capacity(config.allowed_algorithms.len());
        for name in &config.allowed_algorithms {
            let alg = Algorithm::from_str(name)
                .map_err(|_| eyre::eyre!("Unknown signing algorithm '{name}'"))?;
            if !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
                eyre::bail!("Signing algorithm '{name}' is not in the HMAC family");
            }
            allowed.push(alg);
        }
        if allowed.is_empty() {
            eyre::bail!("auth.allowed_algorithms must list at least one algorithm");
        }

        Ok(Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            allowed,
            leeway_secs: config.leeway_secs,
        })
    }

    /// Extract the token from `Authorization: Bearer <token>`.
    ///
    /// The header must consist of exactly two space separated parts and the
    /// scheme is matched case-sensitively.
    pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AuthError::MalformedHeader)?;

        if value.is_empty() {
            return Err(AuthError::MissingHeader);
        }

        let mut parts = value.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
            _ => Err(AuthError::MalformedHeader),
        }
    }

    /// Verify the request's bearer token and return its claims.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<TokenClaims, AuthError> {
        let token = Self::bearer_token(headers)?;
        self.verify(token)
    }

    /// Verify a raw token string.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        // `decode_header` already refuses `alg: none` and unknown algorithms.
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if !self.allowed.contains(&header.alg) {
            return Err(AuthError::DisallowedAlgorithm(format!("{:?}", header.alg)));
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = self.allowed.clone();
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<WireClaims>(token, &self.key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidAlgorithm => {
                    AuthError::DisallowedAlgorithm(format!("{:?}", header.alg))
                }
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;
        let wire = data.claims;

        // Independent of the library check and of its leeway.
        if wire.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        let expires_at = DateTime::<Utc>::from_timestamp(wire.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("exp out of range".to_string()))?;

        let subject = wire
            .user_id
            .or(wire.sub)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        Ok(TokenClaims {
            subject,
            username: wire.username,
            email: wire.email,
            role: wire.role,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::Duration;
    use http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    const SECRET: &str = "test-secret";

    fn validator() -> TokenValidator {
        TokenValidator::new(&AuthConfig {
            jwt_secret: SECRET.to_string(),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn sign(alg: Algorithm, secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(alg),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(exp_offset: Duration) -> serde_json::Value {
        json!({
            "user_id": "user-42",
            "username": "ada",
            "email": "ada@example.com",
            "role": "user",
            "exp": (Utc::now() + exp_offset).timestamp(),
        })
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_valid_token() {
        let token = sign(Algorithm::HS256, SECRET, claims(Duration::hours(1)));
        let claims = validator().verify(&token).unwrap();
        assert_eq!(claims.subject, "user-42");
        assert_eq!(claims.username.as_deref(), Some("ada"));
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        assert_eq!(claims.role.as_deref(), Some("user"));
    }

    #[test]
    fn test_sub_is_used_when_user_id_is_absent() {
        let token = sign(
            Algorithm::HS256,
            SECRET,
            json!({"sub": "abc", "exp": (Utc::now() + Duration::hours(1)).timestamp()}),
        );
        assert_eq!(validator().verify(&token).unwrap().subject, "abc");
    }

    #[test]
    fn test_missing_subject() {
        let token = sign(
            Algorithm::HS256,
            SECRET,
            json!({"role": "user", "exp": (Utc::now() + Duration::hours(1)).timestamp()}),
        );
        assert_eq!(validator().verify(&token), Err(AuthError::MissingSubject));
    }

    #[test]
    fn test_expired_token_with_valid_signature() {
        let token = sign(Algorithm::HS256, SECRET, claims(-Duration::minutes(5)));
        assert_eq!(validator().verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_expiry_is_checked_beyond_library_leeway() {
        let validator = TokenValidator::new(&AuthConfig {
            jwt_secret: SECRET.to_string(),
            leeway_secs: 3600,
            ..AuthConfig::default()
        })
        .unwrap();
        // Inside the library leeway, but already past exp.
        let token = sign(Algorithm::HS256, SECRET, claims(-Duration::minutes(5)));
        assert_eq!(validator.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_missing_exp_is_rejected() {
        let token = sign(Algorithm::HS256, SECRET, json!({"user_id": "u"}));
        assert!(matches!(
            validator().verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = sign(Algorithm::HS256, "other-secret", claims(Duration::hours(1)));
        assert!(matches!(
            validator().verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_algorithm_outside_allow_list() {
        let token = sign(Algorithm::HS512, SECRET, claims(Duration::hours(1)));
        assert!(matches!(
            validator().verify(&token),
            Err(AuthError::DisallowedAlgorithm(_))
        ));
    }

    #[test]
    fn test_unsigned_token_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims(Duration::hours(1)).to_string());
        let token = format!("{header}.{payload}.");
        assert!(validator().verify(&token).is_err());
    }

    #[test]
    fn test_asymmetric_header_is_rejected_before_signature_check() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims(Duration::hours(1)).to_string());
        let token = format!("{header}.{payload}.c2lnbmF0dXJl");
        assert_eq!(
            validator().verify(&token),
            Err(AuthError::DisallowedAlgorithm("RS256".to_string()))
        );
    }

    #[test]
    fn test_bearer_header_shapes() {
        assert_eq!(
            TokenValidator::bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingHeader)
        );
        assert_eq!(TokenValidator::bearer_token(&headers("Bearer abc")), Ok("abc"));
        for bad in ["abc", "Bearer", "Bearer ", "bearer abc", "Basic abc", "Bearer a b"] {
            assert_eq!(
                TokenValidator::bearer_token(&headers(bad)),
                Err(AuthError::MalformedHeader),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_non_hmac_configuration_is_refused() {
        let result = TokenValidator::new(&AuthConfig {
            jwt_secret: SECRET.to_string(),
            allowed_algorithms: vec!["RS256".to_string()],
            ..AuthConfig::default()
        });
        assert!(result.is_err());
    }
}
