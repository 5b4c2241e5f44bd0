//! Session-to-request bridge and the minimal server-rendered surface.
//!
//! Per request, the raw cookie is resolved into a typed [`UserContext`] that
//! page handlers consume. Protected routes gate through [`RequireUser`],
//! which short-circuits with a redirect to the login page rather than
//! rendering; that redirect is designed behavior, not a failure path.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use std::sync::Arc;

use crate::session::{AccountType, SessionRecord, SessionState, SessionStore};
use crate::AppState;

/// Where unauthenticated visitors to protected routes are sent.
pub const LOGIN_ROUTE: &str = "/auth";

/// The shaped, server-resolved view of a session record passed into page
/// rendering. Identical to the record except `account_type` is concrete,
/// defaulted to `student` when the stored value was absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub token: String,
    pub account_type: AccountType,
    pub email: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub age_range: Option<String>,
    pub member_since: Option<String>,
}

impl From<SessionRecord> for UserContext {
    fn from(record: SessionRecord) -> Self {
        Self {
            account_type: record.account_type.unwrap_or_default(),
            user_id: record.user_id,
            token: record.token,
            email: record.email,
            full_name: record.full_name,
            phone_number: record.phone_number,
            age_range: record.age_range,
            member_since: record.member_since,
        }
    }
}

/// Resolve the optional user for the current request. Absent or unreadable
/// cookies are the normal logged-out state.
pub fn resolve_user(jar: &CookieJar, sessions: &SessionStore) -> Option<UserContext> {
    match sessions.read(jar) {
        SessionState::Authenticated(record) => Some(record.into()),
        SessionState::Unauthenticated => None,
    }
}

/// Extractor enforcing the login gate on protected routes.
///
/// Resolution is synchronous and atomic per request; there is no pending
/// state between unauthenticated and authenticated.
pub struct RequireUser(pub UserContext);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        resolve_user(&jar, &state.sessions)
            .map(RequireUser)
            .ok_or_else(|| Redirect::to(LOGIN_ROUTE))
    }
}

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/", get(home))
        .route("/auth", get(auth_page))
        // Protected routes
        .route("/dashboard", get(dashboard))
        .route("/account", get(account))
}

// Profile fields come from the cookie, so a user can only inject into their
// own pages; escape anyway before interpolating into markup.
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// Home page: public, but nav state reflects the resolved user
async fn home(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let nav = match resolve_user(&jar, &state.sessions) {
        Some(user) => format!(
            r#"<a href="/dashboard">Dashboard</a> <span>{}</span>"#,
            escape_html(&user.email)
        ),
        None => format!(r#"<a href="{}">Sign in</a>"#, LOGIN_ROUTE),
    };
    Html(format!(
        "<html><body><h1>Find your driving instructor</h1><nav>{}</nav></body></html>",
        nav
    ))
    .into_response()
}

// Login page stub: the redirect target of the gate. The interactive form is
// client-side; this just anchors the route.
async fn auth_page() -> Html<String> {
    Html(
        "<html><body><h1>Sign in</h1>\
         <form method=\"post\" action=\"/api/auth/set-session\"></form>\
         </body></html>"
            .to_string(),
    )
}

async fn dashboard(RequireUser(user): RequireUser) -> Html<String> {
    let heading = match user.account_type {
        AccountType::Instructor => "Your lessons and availability",
        AccountType::Student => "Your upcoming lessons",
    };
    Html(format!(
        "<html><body><h1>{}</h1><p>Signed in as {} ({})</p></body></html>",
        heading,
        escape_html(&user.email),
        user.account_type
    ))
}

async fn account(RequireUser(user): RequireUser) -> Html<String> {
    Html(format!(
        "<html><body><h1>Account</h1><p>{}</p><p>{}</p><p>Member since {}</p></body></html>",
        escape_html(user.full_name.as_deref().unwrap_or("-")),
        escape_html(&user.email),
        escape_html(user.member_since.as_deref().unwrap_or("-")),
    ))
}
