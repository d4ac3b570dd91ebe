use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::registry::profile_path;
use crate::store::{DocumentStore, Observer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Teacher,
    Unknown,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile fields that may carry the account type, root before nested.
const ROLE_FIELDS: [(&str, Option<&str>); 6] = [
    ("defaultAccountType", None),
    ("accountType", None),
    ("role", None),
    ("userData", Some("defaultAccountType")),
    ("userData", Some("accountType")),
    ("userData", Some("role")),
];

/// Lower-cases and folds the diacritics that show up in Turkish role names.
pub fn normalize_tr(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            'ç' => Some('c'),
            'ğ' => Some('g'),
            'ö' => Some('o'),
            'ş' => Some('s'),
            'ü' => Some('u'),
            'â' | 'à' | 'á' | 'ä' => Some('a'),
            'î' | 'ì' | 'í' | 'ï' => Some('i'),
            'ô' | 'ò' | 'ó' => Some('o'),
            'û' | 'ù' | 'ú' => Some('u'),
            'é' | 'è' | 'ê' | 'ë' => Some('e'),
            // Combining marks, e.g. the dot left over from lower-casing 'İ'.
            '\u{0300}'..='\u{036f}' => None,
            other => Some(other),
        })
        .collect()
}

pub fn parse_role(raw: Option<&str>) -> UserRole {
    let Some(raw) = raw else {
        return UserRole::Unknown;
    };

    let normalized = normalize_tr(raw);
    if normalized.contains("ogrenci") {
        UserRole::Student
    } else if normalized.contains("ogretmen") || normalized.contains("egitimkocu") {
        UserRole::Teacher
    } else {
        UserRole::Unknown
    }
}

fn role_candidate(profile: &Value) -> Option<(&'static str, &str)> {
    ROLE_FIELDS.iter().find_map(|&(outer, inner)| {
        let value = match inner {
            Some(inner) => profile.get(outer)?.get(inner)?,
            None => profile.get(outer)?,
        };
        let text = value.as_str()?;
        if text.trim().is_empty() {
            None
        } else {
            Some((inner.unwrap_or(outer), text))
        }
    })
}

pub fn resolve_role(profile: Option<&Value>) -> UserRole {
    let Some(profile) = profile else {
        return UserRole::Unknown;
    };

    let candidate = role_candidate(profile);
    let role = parse_role(candidate.map(|(_, text)| text));
    debug!(
        field = candidate.map(|(field, _)| field).unwrap_or("(none)"),
        role = %role,
        "Resolved role from profile"
    );
    role
}

pub async fn current_role(store: &dyn DocumentStore, uid: &str) -> Result<UserRole, AppError> {
    let profile = store.get(&profile_path(uid)?).await?;
    Ok(resolve_role(profile.as_ref()))
}

/// Re-resolves whenever `users/{uid}` changes.
pub fn observe_role(store: Arc<dyn DocumentStore>, uid: &str) -> Result<Observer<UserRole>, AppError> {
    Ok(Observer::new(store, profile_path(uid)?, resolve_role))
}
