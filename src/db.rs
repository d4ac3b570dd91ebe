use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{DbAccount, DbUserSession, UserSession};
use crate::error::AppError;

#[instrument(skip(pool))]
pub async fn get_account(pool: &Pool<Sqlite>, uid: &str) -> Result<Option<DbAccount>, AppError> {
    info!("Fetching account by uid");
    let row = sqlx::query_as::<_, DbAccount>(
        "SELECT uid, email, password, display_name, photo_url FROM accounts WHERE uid = ?",
    )
    .bind(uid)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[instrument(skip(pool))]
pub async fn get_account_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<DbAccount>, AppError> {
    info!("Fetching account by email");
    let row = sqlx::query_as::<_, DbAccount>(
        "SELECT uid, email, password, display_name, photo_url FROM accounts WHERE email = ? COLLATE NOCASE",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[instrument(skip(pool, password_hash))]
pub async fn create_account(
    pool: &Pool<Sqlite>,
    uid: &str,
    email: &str,
    password_hash: &str,
    display_name: Option<&str>,
) -> Result<(), AppError> {
    info!("Creating account");
    sqlx::query("INSERT INTO accounts (uid, email, password, display_name) VALUES (?, ?, ?, ?)")
        .bind(uid)
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool, password_hash))]
pub async fn update_account_password(
    pool: &Pool<Sqlite>,
    uid: &str,
    password_hash: &str,
) -> Result<(), AppError> {
    info!("Updating account password");
    let result = sqlx::query("UPDATE accounts SET password = ? WHERE uid = ?")
        .bind(password_hash)
        .bind(uid)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Account {} not found", uid)));
    }
    Ok(())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    uid: &str,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");
    let res = sqlx::query("INSERT INTO user_sessions (uid, token, expires_at) VALUES (?, ?, ?)")
        .bind(uid)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(pool: &Pool<Sqlite>, token: &str) -> Result<UserSession, AppError> {
    info!("Getting session by token");
    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, uid, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        None => Err(AppError::Authentication("Invalid session token".to_string())),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");
    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

/// Drops every session of one account, e.g. after a password reset.
#[instrument(skip(pool))]
pub async fn invalidate_sessions_for(pool: &Pool<Sqlite>, uid: &str) -> Result<u64, AppError> {
    info!("Invalidating all sessions of account");
    let result = sqlx::query("DELETE FROM user_sessions WHERE uid = ?")
        .bind(uid)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");
    let now = Utc::now().naive_utc();

    let sessions = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;
    let resets = sqlx::query("DELETE FROM password_resets WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(sessions.rows_affected() + resets.rows_affected())
}

#[instrument(skip(pool, token))]
pub async fn create_password_reset(
    pool: &Pool<Sqlite>,
    uid: &str,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<(), AppError> {
    info!("Creating password reset token");
    sqlx::query("INSERT INTO password_resets (token, uid, expires_at) VALUES (?, ?, ?)")
        .bind(token)
        .bind(uid)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(())
}

/// Reset tokens are single-use: the row is removed whether or not it
/// turns out to be expired.
#[instrument(skip(pool, token))]
pub async fn take_password_reset(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<Option<(String, NaiveDateTime)>, AppError> {
    info!("Consuming password reset token");
    let row = sqlx::query_as::<_, (String, NaiveDateTime)>(
        "DELETE FROM password_resets WHERE token = ? RETURNING uid, expires_at",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
