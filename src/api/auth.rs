//! Session lifecycle endpoints.
//!
//! These are the only two writers of the session cookie. The web app calls
//! `set-session` after a successful upstream login to mint the cookie, and
//! `logout` to clear it. The record is always replaced whole; there is no
//! partial-field update.

use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::session::{AccountType, SessionRecord};
use crate::AppState;

/// Form body of `POST /api/auth/set-session`. Field names are part of the
/// wire contract with the web app, hence camelCase.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionForm {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub email: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub age_range: Option<String>,
    pub member_since: Option<String>,
}

impl SetSessionForm {
    fn into_record(self) -> SessionRecord {
        SessionRecord {
            user_id: self.user_id,
            token: self.token,
            account_type: AccountType::parse(&self.account_type),
            email: self.email,
            full_name: none_if_empty(self.full_name),
            phone_number: none_if_empty(self.phone_number),
            age_range: none_if_empty(self.age_range),
            member_since: none_if_empty(self.member_since),
        }
    }
}

fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub ok: bool,
}

/// Mint the session cookie from an upstream-authenticated identity.
///
/// Requires `userId` and `token` to be non-empty; everything else is
/// optional profile data carried for display only.
pub async fn set_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    axum::Form(form): axum::Form<SetSessionForm>,
) -> Result<impl IntoResponse, ApiError> {
    if form.user_id.trim().is_empty() {
        return Err(ApiError::validation_field("userId", "userId is required"));
    }
    if form.token.trim().is_empty() {
        return Err(ApiError::validation_field("token", "token is required"));
    }

    let record = form.into_record();
    let cookie = state.sessions.create(&record).map_err(|e| {
        tracing::error!(error = %e, "Failed to seal session cookie");
        ApiError::internal("Failed to create session")
    })?;

    tracing::debug!(user_id = %record.user_id, "Session cookie minted");
    Ok((jar.add(cookie), Json(SessionResponse { ok: true })))
}

/// Clear the session cookie. Always succeeds, whether or not a valid
/// session existed.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    (jar.add(state.sessions.destroy()), Json(SessionResponse { ok: true }))
}
