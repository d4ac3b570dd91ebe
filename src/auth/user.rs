use chrono::{NaiveDateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};

use super::Permission;
use crate::error::AppError;
use crate::role::UserRole;

/// Signed-in identity as the rest of the app sees it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbAccount {
    pub uid: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl From<DbAccount> for AuthUser {
    fn from(account: DbAccount) -> Self {
        Self {
            uid: account.uid,
            email: account.email,
            display_name: account.display_name,
            photo_url: account.photo_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub uid: String,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow)]
pub struct DbUserSession {
    pub id: i64,
    pub uid: String,
    pub token: String,
    pub created_at: Option<NaiveDateTime>,
    pub expires_at: NaiveDateTime,
}

impl From<DbUserSession> for UserSession {
    fn from(row: DbUserSession) -> Self {
        Self {
            id: row.id,
            uid: row.uid,
            token: row.token,
            created_at: row.created_at.unwrap_or_else(|| Utc::now().naive_utc()),
            expires_at: row.expires_at,
        }
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        Alphanumeric.sample_string(&mut rand::rng(), 48)
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }
}

/// Authenticated user plus the role resolved from their profile at request
/// time.
#[derive(Debug, Serialize, Clone)]
pub struct Caller {
    pub user: AuthUser,
    pub role: UserRole,
}

impl Caller {
    pub fn uid(&self) -> &str {
        &self.user.uid
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        super::has_permission(self.role, permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                uid = %self.user.uid,
                role = %self.role,
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(
                "Bu işlem için yetkiniz yok.".to_string(),
            ))
        }
    }
}
