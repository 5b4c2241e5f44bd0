//! Client authentication context.
//!
//! Holds the tab-lifetime `{user, token}` state the interactive views read,
//! and drives the login/signup/logout flows against two collaborators:
//! the external marketplace API that actually checks credentials, and this
//! service's own session endpoints that mint/clear the cookie.
//!
//! Login and signup are a two-step commit: the upstream call must resolve
//! before the cookie mint is dispatched, and the mint must be awaited before
//! success is declared, otherwise the next server-rendered navigation would
//! bounce back to the login page. A mint failure after a successful upstream
//! login is a distinct, retryable state: the authenticated profile is parked
//! and `retry_session_mint` re-attempts the mint without asking the user to
//! re-enter credentials.

pub mod validation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::session::{AccountType, SessionRecord};
use crate::web::UserContext;

/// Errors surfaced by the interactive auth operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Caught before any network call; shown inline on the form.
    #[error("{0}")]
    Validation(String),
    /// The external API declined the credentials.
    #[error("{0}")]
    Rejected(String),
    /// Upstream accepted the credentials but the local session cookie could
    /// not be minted. The account is signed in upstream; retry the mint.
    #[error("signed in, but the session could not be saved: {0}")]
    SessionMint(String),
    /// Network-level failure (timeout, connection refused).
    #[error("network error: {0}")]
    Transport(String),
}

impl AuthError {
    /// Whether retrying the same operation can succeed without new input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::SessionMint(_) | AuthError::Transport(_))
    }
}

/// Errors from the HTTP collaborators, before they are mapped onto the
/// operation-level [`AuthError`] taxonomy.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Transport(String),
}

/// Identity payload the external API returns from login/signup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub token: String,
    #[serde(default)]
    pub account_type: Option<String>,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub age_range: Option<String>,
    #[serde(default)]
    pub member_since: Option<String>,
}

impl AuthenticatedUser {
    fn into_record(self) -> SessionRecord {
        SessionRecord {
            user_id: self.user_id,
            token: self.token,
            account_type: self.account_type.as_deref().and_then(AccountType::parse),
            email: self.email,
            full_name: self.full_name,
            phone_number: self.phone_number,
            age_range: self.age_range,
            member_since: self.member_since,
        }
    }
}

/// Fields the signup form collects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupFields {
    pub email: String,
    pub password: String,
    pub account_type: AccountType,
    pub full_name: String,
    pub phone_number: String,
    pub age_range: String,
}

/// The external marketplace API: authenticates credentials and creates
/// accounts. Consumed, never implemented, by this repository.
#[async_trait]
pub trait ExternalAuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str)
        -> Result<AuthenticatedUser, UpstreamError>;
    async fn signup(&self, fields: &SignupFields) -> Result<AuthenticatedUser, UpstreamError>;
}

/// This service's own session endpoints, seen from the client side.
#[async_trait]
pub trait SessionMint: Send + Sync {
    async fn mint(&self, record: &SessionRecord) -> Result<(), UpstreamError>;
    async fn clear(&self) -> Result<(), UpstreamError>;
}

/// Tab-lifetime authentication state plus the operations that mutate it.
///
/// Not a global: construct one per client scope and pass it explicitly to
/// the views that need it.
pub struct AuthClient {
    api: Arc<dyn ExternalAuthApi>,
    sessions: Arc<dyn SessionMint>,
    user: Option<UserContext>,
    token: Option<String>,
    pending_mint: Option<SessionRecord>,
}

impl AuthClient {
    pub fn new(api: Arc<dyn ExternalAuthApi>, sessions: Arc<dyn SessionMint>) -> Self {
        Self {
            api,
            sessions,
            user: None,
            token: None,
            pending_mint: None,
        }
    }

    /// Seed from the server-resolved user embedded in the first page render,
    /// so a reload does not flash the logged-out state.
    pub fn with_initial(mut self, user: Option<UserContext>) -> Self {
        self.token = user.as_ref().map(|u| u.token.clone());
        self.user = user;
        self
    }

    pub fn user(&self) -> Option<&UserContext> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Whether an upstream login succeeded but its cookie mint is still owed.
    pub fn has_pending_mint(&self) -> bool {
        self.pending_mint.is_some()
    }

    /// Exchange credentials for a session.
    ///
    /// Validation failures reject before any network call. The session mint
    /// is awaited before this resolves; see the module docs for the
    /// two-step commit contract.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        validation::validate_email(email).map_err(AuthError::Validation)?;
        validation::validate_password(password).map_err(AuthError::Validation)?;

        let profile = self
            .api
            .login(email, password)
            .await
            .map_err(auth_rejection)?;

        self.commit(profile.into_record()).await
    }

    /// Create an account, then establish a session for it.
    ///
    /// Requires the profile fields to be non-empty in addition to the
    /// email/password checks. Account type is caller-supplied; both roles
    /// are accepted here.
    pub async fn signup(&mut self, fields: SignupFields) -> Result<(), AuthError> {
        validation::validate_email(&fields.email).map_err(AuthError::Validation)?;
        validation::validate_password(&fields.password).map_err(AuthError::Validation)?;
        validation::validate_required("Full name", &fields.full_name)
            .map_err(AuthError::Validation)?;
        validation::validate_required("Phone number", &fields.phone_number)
            .map_err(AuthError::Validation)?;
        validation::validate_required("Age range", &fields.age_range)
            .map_err(AuthError::Validation)?;

        let profile = self.api.signup(&fields).await.map_err(auth_rejection)?;

        self.commit(profile.into_record()).await
    }

    /// Re-attempt a cookie mint that failed after a successful upstream
    /// login or signup. No credentials are re-sent.
    pub async fn retry_session_mint(&mut self) -> Result<(), AuthError> {
        let record = self
            .pending_mint
            .clone()
            .ok_or_else(|| AuthError::Validation("No session waiting to be saved".to_string()))?;
        self.commit(record).await
    }

    /// Clear the session. In-memory state is cleared unconditionally, even
    /// when the network call fails: the user-visible intent is "log me out
    /// now" and correctness is anchored to the cookie, which the next
    /// request will resolve fresh.
    pub async fn logout(&mut self) {
        if let Err(err) = self.sessions.clear().await {
            tracing::warn!(error = %err, "Logout endpoint call failed; clearing local state anyway");
        }
        self.user = None;
        self.token = None;
        self.pending_mint = None;
    }

    async fn commit(&mut self, record: SessionRecord) -> Result<(), AuthError> {
        if let Err(err) = self.sessions.mint(&record).await {
            // Upstream state and local session state have diverged; park the
            // profile so the mint alone can be retried.
            self.pending_mint = Some(record);
            return Err(AuthError::SessionMint(err.to_string()));
        }

        self.token = Some(record.token.clone());
        self.user = Some(record.into());
        self.pending_mint = None;
        Ok(())
    }
}

fn auth_rejection(err: UpstreamError) -> AuthError {
    match err {
        UpstreamError::Rejected(message) if !message.is_empty() => AuthError::Rejected(message),
        UpstreamError::Rejected(_) => {
            AuthError::Rejected("Invalid email or password".to_string())
        }
        UpstreamError::Transport(message) => AuthError::Transport(message),
    }
}

// ---------------------------------------------------------------------------
// HTTP implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    message: Option<String>,
}

async fn rejection_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<UpstreamErrorBody>().await {
        Ok(UpstreamErrorBody { message: Some(m) }) if !m.is_empty() => m,
        _ => format!("Request failed with status {}", status),
    }
}

/// [`ExternalAuthApi`] over HTTP, with a bounded request timeout so a dead
/// upstream fails the submit instead of hanging it.
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ExternalAuthApi for HttpAuthApi {
    async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, UpstreamError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))
        } else {
            Err(UpstreamError::Rejected(rejection_message(response).await))
        }
    }

    async fn signup(&self, fields: &SignupFields) -> Result<AuthenticatedUser, UpstreamError> {
        let response = self
            .client
            .post(format!("{}/auth/signup", self.base_url))
            .json(fields)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| UpstreamError::Transport(e.to_string()))
        } else {
            Err(UpstreamError::Rejected(rejection_message(response).await))
        }
    }
}

/// [`SessionMint`] over HTTP against this service's own auth endpoints.
pub struct HttpSessionMint {
    client: reqwest::Client,
    origin: String,
}

impl HttpSessionMint {
    pub fn new(origin: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            origin: origin.into(),
        })
    }
}

#[async_trait]
impl SessionMint for HttpSessionMint {
    async fn mint(&self, record: &SessionRecord) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(format!("{}/api/auth/set-session", self.origin))
            .form(record)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(UpstreamError::Rejected(rejection_message(response).await))
        }
    }

    async fn clear(&self) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(format!("{}/api/auth/logout", self.origin))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(UpstreamError::Rejected(rejection_message(response).await))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn profile() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "u1".to_string(),
            token: "tok1".to_string(),
            account_type: Some("instructor".to_string()),
            email: "user@example.com".to_string(),
            full_name: None,
            phone_number: None,
            age_range: None,
            member_since: None,
        }
    }

    /// Records calls; answers from a canned result.
    struct FakeApi {
        result: Mutex<Option<Result<AuthenticatedUser, UpstreamError>>>,
        logins: Mutex<Vec<(String, String)>>,
        signups: Mutex<Vec<SignupFields>>,
    }

    impl FakeApi {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Ok(profile()))),
                logins: Mutex::new(Vec::new()),
                signups: Mutex::new(Vec::new()),
            })
        }

        fn rejecting(message: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(Err(UpstreamError::Rejected(message.to_string())))),
                logins: Mutex::new(Vec::new()),
                signups: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.logins.lock().unwrap().len() + self.signups.lock().unwrap().len()
        }

        fn take_result(&self) -> Result<AuthenticatedUser, UpstreamError> {
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("fake result already consumed")
        }
    }

    #[async_trait]
    impl ExternalAuthApi for FakeApi {
        async fn login(
            &self,
            email: &str,
            password: &str,
        ) -> Result<AuthenticatedUser, UpstreamError> {
            self.logins
                .lock()
                .unwrap()
                .push((email.to_string(), password.to_string()));
            self.take_result()
        }

        async fn signup(
            &self,
            fields: &SignupFields,
        ) -> Result<AuthenticatedUser, UpstreamError> {
            self.signups.lock().unwrap().push(fields.clone());
            self.take_result()
        }
    }

    /// Session endpoint fake: fails the first `fail_mints` mint calls, and
    /// optionally fails clears.
    struct FakeMint {
        fail_mints: Mutex<usize>,
        fail_clear: bool,
        minted: Mutex<Vec<SessionRecord>>,
        clears: Mutex<usize>,
    }

    impl FakeMint {
        fn ok() -> Arc<Self> {
            Self::failing(0, false)
        }

        fn failing(fail_mints: usize, fail_clear: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_mints: Mutex::new(fail_mints),
                fail_clear,
                minted: Mutex::new(Vec::new()),
                clears: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl SessionMint for FakeMint {
        async fn mint(&self, record: &SessionRecord) -> Result<(), UpstreamError> {
            let mut remaining = self.fail_mints.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(UpstreamError::Rejected("mint endpoint returned 500".into()));
            }
            self.minted.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn clear(&self) -> Result<(), UpstreamError> {
            *self.clears.lock().unwrap() += 1;
            if self.fail_clear {
                return Err(UpstreamError::Rejected("logout endpoint returned 500".into()));
            }
            Ok(())
        }
    }

    fn signup_fields() -> SignupFields {
        SignupFields {
            email: "new@example.com".to_string(),
            password: "secret1".to_string(),
            account_type: AccountType::Instructor,
            full_name: "Ade Instructor".to_string(),
            phone_number: "07700900123".to_string(),
            age_range: "25-34".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_happy_path_mints_before_resolving() {
        let api = FakeApi::ok();
        let mint = FakeMint::ok();
        let mut client = AuthClient::new(api.clone(), mint.clone());

        client.login("user@example.com", "secret1").await.unwrap();

        // Mint received exactly the upstream identity fields
        let minted = mint.minted.lock().unwrap();
        assert_eq!(minted.len(), 1);
        assert_eq!(minted[0].user_id, "u1");
        assert_eq!(minted[0].token, "tok1");
        assert_eq!(minted[0].account_type, Some(AccountType::Instructor));
        assert_eq!(minted[0].email, "user@example.com");

        assert!(client.is_authenticated());
        assert_eq!(client.user().unwrap().email, "user@example.com");
        assert_eq!(client.token(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_login_bad_email_rejects_before_any_network_call() {
        let api = FakeApi::ok();
        let mint = FakeMint::ok();
        let mut client = AuthClient::new(api.clone(), mint.clone());

        let err = client.login("bad-email", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(err.to_string().contains("valid email"));

        assert_eq!(api.call_count(), 0);
        assert!(mint.minted.lock().unwrap().is_empty());
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_short_password_rejects_before_any_network_call() {
        let api = FakeApi::ok();
        let mint = FakeMint::ok();
        let mut client = AuthClient::new(api.clone(), mint.clone());

        let err = client.login("user@example.com", "short").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(err.to_string().contains("at least 6"));
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_login_upstream_rejection_uses_upstream_message() {
        let api = FakeApi::rejecting("Account locked");
        let mut client = AuthClient::new(api, FakeMint::ok());

        let err = client
            .login("user@example.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
        assert_eq!(err.to_string(), "Account locked");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_login_upstream_rejection_generic_fallback() {
        let api = FakeApi::rejecting("");
        let mut client = AuthClient::new(api, FakeMint::ok());

        let err = client
            .login("user@example.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid email or password");
    }

    #[tokio::test]
    async fn test_mint_failure_is_distinct_and_retryable() {
        let api = FakeApi::ok();
        let mint = FakeMint::failing(1, false);
        let mut client = AuthClient::new(api, mint.clone());

        let err = client
            .login("user@example.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SessionMint(_)));
        assert!(err.is_retryable());

        // Signed in upstream, but not locally
        assert!(!client.is_authenticated());
        assert!(client.has_pending_mint());

        // The retry completes the login without touching the upstream API
        client.retry_session_mint().await.unwrap();
        assert!(client.is_authenticated());
        assert!(!client.has_pending_mint());
        assert_eq!(mint.minted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_without_pending_mint_fails() {
        let mut client = AuthClient::new(FakeApi::ok(), FakeMint::ok());
        let err = client.retry_session_mint().await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_signup_happy_path() {
        let api = FakeApi::ok();
        let mint = FakeMint::ok();
        let mut client = AuthClient::new(api.clone(), mint.clone());

        client.signup(signup_fields()).await.unwrap();

        assert_eq!(api.signups.lock().unwrap().len(), 1);
        assert_eq!(mint.minted.lock().unwrap().len(), 1);
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn test_signup_requires_profile_fields() {
        let api = FakeApi::ok();
        let mut client = AuthClient::new(api.clone(), FakeMint::ok());

        let mut fields = signup_fields();
        fields.full_name = String::new();
        let err = client.signup(fields).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(err.to_string().contains("Full name"));

        let mut fields = signup_fields();
        fields.phone_number = "  ".to_string();
        assert!(client.signup(fields).await.is_err());

        let mut fields = signup_fields();
        fields.age_range = String::new();
        assert!(client.signup(fields).await.is_err());

        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_signup_accepts_student_role() {
        // Both marketplace roles are valid at this layer; the instructor-only
        // pin lives in the form
        let api = FakeApi::ok();
        let mut client = AuthClient::new(api.clone(), FakeMint::ok());

        let mut fields = signup_fields();
        fields.account_type = AccountType::Student;
        client.signup(fields).await.unwrap();

        assert_eq!(
            api.signups.lock().unwrap()[0].account_type,
            AccountType::Student
        );
    }

    #[tokio::test]
    async fn test_logout_clears_state_even_when_endpoint_fails() {
        let mint = FakeMint::failing(0, true);
        let api = FakeApi::ok();
        let mut client = AuthClient::new(api, mint.clone());
        client.login("user@example.com", "secret1").await.unwrap();
        assert!(client.is_authenticated());

        client.logout().await;

        assert_eq!(*mint.clears.lock().unwrap(), 1);
        assert!(!client.is_authenticated());
        assert!(client.user().is_none());
        assert!(client.token().is_none());
    }

    #[tokio::test]
    async fn test_with_initial_seeds_state_from_server_render() {
        let user: UserContext = profile().into_record().into();
        let client =
            AuthClient::new(FakeApi::ok(), FakeMint::ok()).with_initial(Some(user.clone()));

        assert!(client.is_authenticated());
        assert_eq!(client.user(), Some(&user));
        assert_eq!(client.token(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_retryable() {
        let api = Arc::new(FakeApi {
            result: Mutex::new(Some(Err(UpstreamError::Transport(
                "connection timed out".to_string(),
            )))),
            logins: Mutex::new(Vec::new()),
            signups: Mutex::new(Vec::new()),
        });
        let mut client = AuthClient::new(api, FakeMint::ok());

        let err = client
            .login("user@example.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
        assert!(err.is_retryable());
    }
}
