// src/auth.rs
//! One-time code login over email or phone, and caller identity headers.

use axum::extract::FromRequestParts;
use chrono::{DateTime, Duration, Utc};
use http::request::Parts;
use http::HeaderName;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::models::{Identifier, Role, User, UserProfile};
use crate::store::Store;

/// How long an issued code stays valid.
pub const CODE_TTL_MINUTES: i64 = 5;

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");

#[derive(Debug, Clone)]
pub struct CodeIssued {
    pub code: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

/// Picks the login identifier out of a request. Email wins when both are set.
pub fn parse_identifier(email: Option<&str>, phone: Option<&str>) -> Result<Identifier, AppError> {
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    let phone = phone.map(str::trim).filter(|p| !p.is_empty());

    match (email, phone) {
        (Some(email), _) => {
            let email = email.to_lowercase();
            if !email.contains('@') {
                return Err(AppError::bad_request("Valid email required"));
            }
            Ok(Identifier::Email(email))
        }
        (None, Some(phone)) => normalize_phone(phone)
            .map(Identifier::Phone)
            .ok_or_else(|| AppError::bad_request("Valid phone required")),
        (None, None) => Err(AppError::bad_request("Email or phone required")),
    }
}

fn normalize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(cleaned)
    } else {
        None
    }
}

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub fn issue_token(user_id: i32) -> String {
    format!("user_{user_id}_token")
}

fn default_name(identifier: &Identifier, name: Option<&str>) -> String {
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match identifier {
        Identifier::Email(email) => email.split('@').next().unwrap_or(email).to_string(),
        Identifier::Phone(phone) => phone.clone(),
    }
}

/// Issues a fresh code for `identifier`, creating the user on first contact.
pub async fn send_code(
    store: &dyn Store,
    identifier: &Identifier,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CodeIssued, AppError> {
    let code = generate_code();
    let expires_at = now + Duration::minutes(CODE_TTL_MINUTES);
    let user = store
        .upsert_verification_code(identifier, &default_name(identifier, name), &code, expires_at)
        .await?;
    info!(user_id = user.id, channel = ?identifier.channel(), "verification code issued");
    Ok(CodeIssued { code, user })
}

/// Consumes the pending code and logs the user in.
///
/// An expired code is rejected even when it matches.
pub async fn verify_code(
    store: &dyn Store,
    identifier: &Identifier,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Session, AppError> {
    let user = store
        .find_user_by_identifier(identifier)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if user.code_expires_at.is_some_and(|expires_at| now > expires_at) {
        info!(user_id = user.id, "verification code expired");
        return Err(AppError::bad_request("Code expired"));
    }
    if user.verification_code.as_deref() != Some(code) {
        info!(user_id = user.id, "verification code mismatch");
        return Err(AppError::bad_request("Invalid code"));
    }

    let user = store
        .complete_verification(user.id, identifier.channel(), now)
        .await?;
    info!(user_id = user.id, "user verified");
    Ok(Session {
        token: issue_token(user.id),
        user: UserProfile::from(&user),
    })
}

/// Identity asserted by the `X-User-Id` / `X-User-Role` headers.
///
/// Neither header is verified against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i32,
    pub role: Option<String>,
}

impl Caller {
    pub fn is_owner(&self) -> bool {
        self.role.as_deref() == Some(Role::Owner.as_str())
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::Unauthorized)?;
        let user_id = user_id
            .parse()
            .map_err(|_| AppError::bad_request("Invalid X-User-Id header"))?;
        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());
        Ok(Caller { user_id, role })
    }
}
