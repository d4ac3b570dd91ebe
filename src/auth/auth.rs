use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{AuthUser, UserSession};
use crate::backend::Backend;
use crate::db;
use crate::error::AppError;
use crate::registry::profile_path;
use crate::store::WriteBatch;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthStateChange {
    SignedIn { uid: String },
    SignedOut { uid: String },
}

#[derive(Debug, Clone, Default)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    /// Free text such as "Öğrenci" or "Öğretmen"; resolved later by the
    /// role reader.
    pub account_type: Option<String>,
}

/// A freshly issued session for a signed-in account.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: AuthUser,
    pub token: String,
}

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(AppError::Validation("Geçerli bir e-posta adresi girin.".to_string()))
    }
}

fn check_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Şifre en az {} karakter olmalı.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

async fn open_session(backend: &Backend, user: AuthUser) -> Result<SignedIn, AppError> {
    let token = UserSession::generate_token();
    let expires_at = (Utc::now() + backend.settings().session_ttl).naive_utc();
    db::create_user_session(backend.pool(), &user.uid, &token, expires_at).await?;

    backend.announce(AuthStateChange::SignedIn {
        uid: user.uid.clone(),
    });
    Ok(SignedIn { user, token })
}

/// Creates the account and its `users/{uid}` profile, then signs in.
#[instrument(skip(backend, request), fields(email = %request.email))]
pub async fn sign_up(backend: &Backend, request: SignUp) -> Result<SignedIn, AppError> {
    let email = normalize_email(&request.email)?;
    check_password(&request.password)?;

    if db::get_account_by_email(backend.pool(), &email).await?.is_some() {
        return Err(AppError::Validation(
            "Bu e-posta ile kayıtlı bir hesap zaten var.".to_string(),
        ));
    }

    let uid = Uuid::new_v4().simple().to_string();
    let display_name = request
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let hash = bcrypt::hash(&request.password, backend.settings().bcrypt_cost)?;

    db::create_account(backend.pool(), &uid, &email, &hash, display_name.as_deref()).await?;

    let mut profile = Map::new();
    profile.insert("email".to_string(), Value::String(email.clone()));
    if let Some(name) = &display_name {
        profile.insert("displayName".to_string(), Value::String(name.clone()));
    }
    if let Some(account_type) = request.account_type.filter(|t| !t.trim().is_empty()) {
        profile.insert("accountType".to_string(), Value::String(account_type));
    }
    backend
        .store()
        .commit(WriteBatch::new().merge(profile_path(&uid)?, Value::Object(profile)))
        .await?;

    info!(uid = %uid, "Account created");
    open_session(
        backend,
        AuthUser {
            uid,
            email,
            display_name,
            photo_url: None,
        },
    )
    .await
}

#[instrument(skip(backend, password))]
pub async fn sign_in(backend: &Backend, email: &str, password: &str) -> Result<SignedIn, AppError> {
    let invalid = || AppError::Authentication("E-posta veya şifre hatalı.".to_string());

    let Some(account) = db::get_account_by_email(backend.pool(), email.trim()).await? else {
        warn!("Sign-in for unknown email");
        return Err(invalid());
    };

    if !bcrypt::verify(password, &account.password).unwrap_or(false) {
        warn!(uid = %account.uid, "Sign-in with wrong password");
        return Err(invalid());
    }

    info!(uid = %account.uid, "Signed in");
    open_session(backend, AuthUser::from(account)).await
}

#[instrument(skip(backend, token))]
pub async fn sign_out(backend: &Backend, token: &str) -> Result<(), AppError> {
    let session = match db::get_session_by_token(backend.pool(), token).await {
        Ok(session) => session,
        // Already gone.
        Err(AppError::Authentication(_)) => return Ok(()),
        Err(err) => return Err(err),
    };

    db::invalidate_session(backend.pool(), token).await?;
    backend.announce(AuthStateChange::SignedOut { uid: session.uid });
    Ok(())
}

/// Issues a single-use reset token. Unknown addresses yield `None` so the
/// caller can answer identically either way.
#[instrument(skip(backend))]
pub async fn request_password_reset(backend: &Backend, email: &str) -> Result<Option<String>, AppError> {
    let email = normalize_email(email)?;
    let Some(account) = db::get_account_by_email(backend.pool(), &email).await? else {
        info!("Password reset requested for unknown email");
        return Ok(None);
    };

    let token = UserSession::generate_token();
    let expires_at = (Utc::now() + backend.settings().reset_ttl).naive_utc();
    db::create_password_reset(backend.pool(), &account.uid, &token, expires_at).await?;

    info!(uid = %account.uid, "Password reset token issued");
    Ok(Some(token))
}

/// Sets the new password and drops every open session of the account.
#[instrument(skip(backend, token, new_password))]
pub async fn complete_password_reset(
    backend: &Backend,
    token: &str,
    new_password: &str,
) -> Result<(), AppError> {
    check_password(new_password)?;

    let invalid = || AppError::Validation("Sıfırlama bağlantısı geçersiz veya süresi dolmuş.".to_string());
    let (uid, expires_at) = db::take_password_reset(backend.pool(), token)
        .await?
        .ok_or_else(invalid)?;
    if expires_at <= Utc::now().naive_utc() {
        return Err(invalid());
    }

    let hash = bcrypt::hash(new_password, backend.settings().bcrypt_cost)?;
    db::update_account_password(backend.pool(), &uid, &hash).await?;

    let dropped = db::invalidate_sessions_for(backend.pool(), &uid).await?;
    if dropped > 0 {
        backend.announce(AuthStateChange::SignedOut { uid: uid.clone() });
    }

    info!(uid = %uid, "Password reset completed");
    Ok(())
}

/// Resolves a session token to its account, rejecting expired sessions.
#[instrument(skip(backend, token))]
pub async fn user_for_token(backend: &Backend, token: &str) -> Result<AuthUser, AppError> {
    let session = db::get_session_by_token(backend.pool(), token).await?;
    if !session.is_valid() {
        return Err(AppError::Authentication("Oturum süresi doldu.".to_string()));
    }

    db::get_account(backend.pool(), &session.uid)
        .await?
        .map(AuthUser::from)
        .ok_or_else(|| AppError::Authentication("Hesap bulunamadı.".to_string()))
}
