//! Keyed-hash signing and token utilities.
//!
//! - [`sign`] / [`verify`]: HMAC-SHA256 signatures rendered as lowercase hex
//! - [`TokenService`]: HS256 access/refresh tokens in JWT compact form
//! - [`validate_webapp_init_data`]: Telegram Mini App `initData` verification
//! - [`webhook_secret`]: per-bot value for `X-Telegram-Bot-Api-Secret-Token`
//!
//! All comparisons of secret material go through `Mac::verify_slice`, which
//! is constant-time.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{TokenError, TokenResult, WebAppAuthError};
use crate::types::User;

type HmacSha256 = Hmac<Sha256>;

fn mac(key: &[u8]) -> HmacSha256 {
    match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// =============================================================================
// Signatures
// =============================================================================

/// Signs `message` with `secret`, returning a hex digest.
pub fn sign(secret: &[u8], message: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex signature produced by [`sign`].
pub fn verify(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = mac(secret);
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Derives the webhook secret token for a bot.
///
/// Telegram echoes it in `X-Telegram-Bot-Api-Secret-Token`; the value only
/// uses `[0-9a-f]`, which is within the allowed alphabet.
pub fn webhook_secret(secret_key: &str, bot_name: &str) -> String {
    sign(
        secret_key.as_bytes(),
        format!("webhook:{bot_name}").as_bytes(),
    )
}

// =============================================================================
// Tokens
// =============================================================================

/// Default access token lifetime: 24 hours.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Default refresh token lifetime: 30 days.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Kind of token, stored in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Claims carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub user_id: String,
    pub exp: i64,
    #[serde(rename = "type", default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    TokenType::Access.as_str().to_string()
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// A freshly issued access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub access_token_expiration: i64,
}

/// A freshly issued refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub refresh_token: String,
    pub refresh_token_expiration: i64,
}

/// Access and refresh tokens issued together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(flatten)]
    pub access: AccessToken,
    #[serde(flatten)]
    pub refresh: RefreshToken,
}

/// Issues and verifies HS256 tokens with one secret key.
#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret_key.as_ref().to_vec(),
            access_ttl: ACCESS_TOKEN_TTL,
            refresh_ttl: REFRESH_TOKEN_TTL,
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    fn encode(&self, claims: &Claims) -> TokenResult<String> {
        let payload =
            serde_json::to_vec(claims).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(JWT_HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mut mac = mac(&self.secret);
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    fn issue(&self, user_id: &str, token_type: TokenType, ttl: Duration, now: i64) -> TokenResult<(String, i64)> {
        let exp = now + ttl.as_secs() as i64;
        let claims = Claims {
            user_id: user_id.to_string(),
            exp,
            token_type: token_type.as_str().to_string(),
        };
        Ok((self.encode(&claims)?, exp))
    }

    /// Issues an access token for `user_id`.
    pub fn create_access_token(&self, user_id: &str) -> TokenResult<AccessToken> {
        let (access_token, access_token_expiration) =
            self.issue(user_id, TokenType::Access, self.access_ttl, unix_now())?;
        Ok(AccessToken {
            access_token,
            access_token_expiration,
        })
    }

    /// Issues a refresh token for `user_id`.
    pub fn create_refresh_token(&self, user_id: &str) -> TokenResult<RefreshToken> {
        let (refresh_token, refresh_token_expiration) =
            self.issue(user_id, TokenType::Refresh, self.refresh_ttl, unix_now())?;
        Ok(RefreshToken {
            refresh_token,
            refresh_token_expiration,
        })
    }

    /// Issues an access and a refresh token for `user_id`.
    pub fn create_token_pair(&self, user_id: &str) -> TokenResult<TokenPair> {
        Ok(TokenPair {
            access: self.create_access_token(user_id)?,
            refresh: self.create_refresh_token(user_id)?,
        })
    }

    /// Verifies a token and returns its claims.
    pub fn decode_token(&self, token: &str) -> TokenResult<Claims> {
        self.decode_at(token, unix_now())
    }

    fn decode_at(&self, token: &str, now: i64) -> TokenResult<Claims> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed("expected three segments".into()));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        let mut mac = mac(&self.secret);
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let header: Header = decode_segment(header)?;
        if header.alg != "HS256" {
            return Err(TokenError::Malformed(format!(
                "unsupported algorithm {}",
                header.alg
            )));
        }

        let claims: Claims = decode_segment(payload)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        if claims.user_id.is_empty() {
            return Err(TokenError::MissingUserId);
        }
        Ok(claims)
    }

    /// Verifies a token and requires it to be of `expected` type.
    pub fn decode_typed(&self, token: &str, expected: TokenType) -> TokenResult<Claims> {
        let claims = self.decode_token(token)?;
        if claims.token_type != expected.as_str() {
            return Err(TokenError::WrongType {
                expected: expected.as_str(),
                actual: claims.token_type,
            });
        }
        Ok(claims)
    }

    /// Exchanges a refresh token for a new access token.
    pub fn refresh_access_token(&self, refresh_token: &str) -> TokenResult<AccessToken> {
        let claims = self.decode_typed(refresh_token, TokenType::Refresh)?;
        self.create_access_token(&claims.user_id)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> TokenResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
}

// =============================================================================
// Mini App init data
// =============================================================================

/// Maximum accepted age of `auth_date`.
pub const WEBAPP_AUTH_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24);

/// Verified Mini App launch parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WebAppInitData {
    pub user: User,
    pub auth_date: i64,
    pub query_id: Option<String>,
    pub start_param: Option<String>,
}

/// Validates `initData` as passed to a Mini App by Telegram.
///
/// The data-check string is every `key=value` pair except `hash`, sorted by
/// key and joined by `\n`. It is signed with `HMAC("WebAppData", bot_token)`.
pub fn validate_webapp_init_data(
    init_data: &str,
    bot_token: &str,
) -> Result<WebAppInitData, WebAppAuthError> {
    validate_webapp_init_data_at(init_data, bot_token, unix_now())
}

fn validate_webapp_init_data_at(
    init_data: &str,
    bot_token: &str,
    now: i64,
) -> Result<WebAppInitData, WebAppAuthError> {
    let mut params: BTreeMap<String, String> = url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();

    let received = params
        .remove("hash")
        .ok_or(WebAppAuthError::MissingField("hash"))?;
    let received = hex::decode(received).map_err(|_| WebAppAuthError::HashMismatch)?;

    let data_check_string = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut secret = mac(b"WebAppData");
    secret.update(bot_token.as_bytes());
    let secret = secret.finalize().into_bytes();

    let mut check = mac(&secret);
    check.update(data_check_string.as_bytes());
    check
        .verify_slice(&received)
        .map_err(|_| WebAppAuthError::HashMismatch)?;

    let auth_date = params
        .get("auth_date")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(WebAppAuthError::MissingField("auth_date"))?;
    let age = now - auth_date;
    if age > WEBAPP_AUTH_MAX_AGE.as_secs() as i64 {
        return Err(WebAppAuthError::Expired(age));
    }

    let user = params
        .get("user")
        .ok_or(WebAppAuthError::MissingField("user"))?;
    let user: User =
        serde_json::from_str(user).map_err(|e| WebAppAuthError::InvalidUser(e.to_string()))?;

    Ok(WebAppInitData {
        user,
        auth_date,
        query_id: params.remove("query_id"),
        start_param: params.remove("start_param"),
    })
}
