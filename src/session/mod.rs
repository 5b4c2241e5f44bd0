//! The session store: a stateless codec between the `__session` cookie and
//! the typed session record.
//!
//! There is no server-side session table. The cookie itself is the sole
//! persistence medium; it is sealed with AES-256-GCM so the server can trust
//! whatever decodes cleanly. Any decode failure collapses into
//! [`SessionState::Unauthenticated`], which callers cannot (and must not)
//! distinguish from "no cookie at all".

mod crypto;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use time::Duration;

use crate::config::{Environment, SessionConfig};

/// Name of the session cookie. Part of the wire contract with the web app.
pub const SESSION_COOKIE: &str = "__session";

/// Session lifetime: 7 days.
pub const SESSION_TTL_SECS: i64 = 604_800;

/// Which side of the marketplace the account belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Student,
    Instructor,
}

impl AccountType {
    /// Parse a stored/submitted value. Anything that is not a known account
    /// type (including the empty string) is treated as absent, never as an
    /// error, since old cookies may carry values this build no longer knows.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(AccountType::Student),
            "instructor" => Some(AccountType::Instructor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Student => "student",
            AccountType::Instructor => "instructor",
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn de_account_type<'de, D>(deserializer: D) -> Result<Option<AccountType>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(AccountType::parse))
}

/// The payload persisted inside the session cookie.
///
/// Serialized camelCase for compatibility with the web app's existing
/// cookies. `user_id` and `token` are the two fields without which the
/// session is meaningless; everything else is display-only profile data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub token: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_account_type"
    )]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_since: Option<String>,
}

impl SessionRecord {
    /// A record is usable only when both identity fields are present.
    pub fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.token.is_empty()
    }
}

/// The per-request authentication state resolved from the cookie.
///
/// Deliberately a tagged variant rather than an `Option`: a missing cookie,
/// an expired cookie, and a cookie sealed under a retired secret all land in
/// the same `Unauthenticated` arm by design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Authenticated(SessionRecord),
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn into_record(self) -> Option<SessionRecord> {
        match self {
            SessionState::Authenticated(record) => Some(record),
            SessionState::Unauthenticated => None,
        }
    }
}

/// Errors from [`SessionStore::create`]. Unlike decode failures these are
/// loud: an empty identity field means a caller bug, not bad user input.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session field `{0}` must be non-empty")]
    MissingField(&'static str),
    #[error("failed to seal session cookie: {0}")]
    Seal(String),
}

/// Encodes and decodes the session cookie.
///
/// Holds the ordered list of candidate sealing keys: the current secret
/// first, then any previous secrets still accepted during rotation. Sealing
/// always uses the current key; opening tries each in turn so mid-rotation
/// sessions are not invalidated.
pub struct SessionStore {
    keys: Vec<[u8; crypto::KEY_LENGTH]>,
    secure: bool,
}

impl SessionStore {
    pub fn new(config: &SessionConfig, environment: Environment) -> Self {
        let mut keys = vec![crypto::derive_key(&config.secret)];
        keys.extend(config.previous_secrets.iter().map(|s| crypto::derive_key(s)));
        Self {
            keys,
            secure: environment.is_production(),
        }
    }

    /// Resolve the session from an incoming request's cookies.
    ///
    /// Never fails: absent, malformed, tampered, or incomplete cookies are
    /// all the normal logged-out state.
    pub fn read(&self, jar: &CookieJar) -> SessionState {
        match jar.get(SESSION_COOKIE) {
            Some(cookie) => self.decode(cookie.value()),
            None => SessionState::Unauthenticated,
        }
    }

    fn decode(&self, sealed: &str) -> SessionState {
        for key in &self.keys {
            let Ok(payload) = crypto::open(sealed, key) else {
                continue;
            };
            return match serde_json::from_str::<SessionRecord>(&payload) {
                Ok(record) if record.is_complete() => SessionState::Authenticated(record),
                _ => SessionState::Unauthenticated,
            };
        }
        SessionState::Unauthenticated
    }

    /// Seal a record into a fresh session cookie.
    ///
    /// # Errors
    /// Fails when `user_id` or `token` is empty, or if sealing itself fails.
    pub fn create(&self, record: &SessionRecord) -> Result<Cookie<'static>, SessionError> {
        if record.user_id.is_empty() {
            return Err(SessionError::MissingField("userId"));
        }
        if record.token.is_empty() {
            return Err(SessionError::MissingField("token"));
        }

        let payload =
            serde_json::to_string(record).map_err(|e| SessionError::Seal(e.to_string()))?;
        let sealed =
            crypto::seal(&payload, &self.keys[0]).map_err(|e| SessionError::Seal(e.to_string()))?;

        Ok(Cookie::build((SESSION_COOKIE, sealed))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::seconds(SESSION_TTL_SECS))
            .build())
    }

    /// A cookie that clears the session in the browser. Pure and idempotent:
    /// valid whether or not a session existed.
    pub fn destroy(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::ZERO)
            .build()
    }
}
