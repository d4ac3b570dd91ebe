//! Teacher ↔ student links stored on the `users/{uid}` profiles.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::UserPublic;
use crate::store::{CollectionPath, DocPath, DocumentStore, FieldPath, Observer, WriteBatch};

pub const USERS: &str = "users";
/// Teacher side: uids of coached students.
pub const STUDENTS_FIELD: &str = "koclukOgrencilerim";
/// Student side: uids of coaches.
pub const COACHES_FIELD: &str = "egitimKocum";

const UNNAMED: &str = "(isimsiz)";

pub fn profile_path(uid: &str) -> Result<DocPath, AppError> {
    DocPath::new(USERS, uid)
}

fn profile_text<'a>(profile: &'a Value, field: &str) -> Option<&'a str> {
    profile
        .get(field)
        .and_then(Value::as_str)
        .or_else(|| profile.get("userData")?.get(field)?.as_str())
}

/// Root fields win over `userData.*`.
pub fn extract_public(uid: &str, profile: &Value) -> UserPublic {
    UserPublic {
        uid: uid.to_string(),
        display_name: profile_text(profile, "displayName")
            .unwrap_or(UNNAMED)
            .to_string(),
        email: profile_text(profile, "email").unwrap_or_default().to_string(),
    }
}

fn uid_list(profile: Option<&Value>, field: &str) -> Vec<String> {
    profile
        .and_then(|p| p.get(field))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[instrument(skip(store))]
pub async fn find_by_email(
    store: &dyn DocumentStore,
    email: &str,
) -> Result<Option<UserPublic>, AppError> {
    info!("Looking up user by email");
    let users = CollectionPath::root(USERS);
    let needle = Value::String(email.to_string());

    for field in [FieldPath::new(["userData", "email"]), FieldPath::new(["email"])] {
        let hits = store.query(&users, &field, &needle, Some(1)).await?;
        if let Some((path, profile)) = hits.into_iter().next() {
            return Ok(Some(extract_public(path.id(), &profile)));
        }
    }

    Ok(None)
}

#[instrument(skip(store))]
pub async fn get_user_lite(
    store: &dyn DocumentStore,
    uid: &str,
) -> Result<Option<UserPublic>, AppError> {
    let profile = store.get(&profile_path(uid)?).await?;
    Ok(profile.map(|p| extract_public(uid, &p)))
}

/// Both sides in one commit; re-linking changes nothing.
#[instrument(skip(store))]
pub async fn link(
    store: &dyn DocumentStore,
    teacher_uid: &str,
    student_uid: &str,
) -> Result<(), AppError> {
    info!("Linking coach and student");
    let batch = WriteBatch::new()
        .array_union(
            profile_path(teacher_uid)?,
            FieldPath::new([STUDENTS_FIELD]),
            vec![json!(student_uid)],
        )
        .array_union(
            profile_path(student_uid)?,
            FieldPath::new([COACHES_FIELD]),
            vec![json!(teacher_uid)],
        );

    store.commit(batch).await
}

pub async fn student_uids(store: &dyn DocumentStore, teacher_uid: &str) -> Result<Vec<String>, AppError> {
    let profile = store.get(&profile_path(teacher_uid)?).await?;
    Ok(uid_list(profile.as_ref(), STUDENTS_FIELD))
}

pub async fn coach_uids(store: &dyn DocumentStore, student_uid: &str) -> Result<Vec<String>, AppError> {
    let profile = store.get(&profile_path(student_uid)?).await?;
    Ok(uid_list(profile.as_ref(), COACHES_FIELD))
}

pub fn observe_student_uids(
    store: Arc<dyn DocumentStore>,
    teacher_uid: &str,
) -> Result<Observer<Vec<String>>, AppError> {
    Ok(Observer::new(store, profile_path(teacher_uid)?, |profile| {
        uid_list(profile, STUDENTS_FIELD)
    }))
}

async fn resolve_all(store: &dyn DocumentStore, uids: Vec<String>) -> Result<Vec<UserPublic>, AppError> {
    let mut users = Vec::with_capacity(uids.len());
    for uid in uids {
        if let Some(user) = get_user_lite(store, &uid).await? {
            users.push(user);
        }
    }
    Ok(users)
}

pub async fn list_students(store: &dyn DocumentStore, teacher_uid: &str) -> Result<Vec<UserPublic>, AppError> {
    resolve_all(store, student_uids(store, teacher_uid).await?).await
}

pub async fn list_coaches(store: &dyn DocumentStore, student_uid: &str) -> Result<Vec<UserPublic>, AppError> {
    resolve_all(store, coach_uids(store, student_uid).await?).await
}

pub async fn is_linked(
    store: &dyn DocumentStore,
    teacher_uid: &str,
    student_uid: &str,
) -> Result<bool, AppError> {
    Ok(student_uids(store, teacher_uid)
        .await?
        .iter()
        .any(|uid| uid == student_uid))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LinkOutcome {
    Linked { student: UserPublic },
    NotFound,
    SelfLink,
    AlreadyLinked { student: UserPublic },
}

impl LinkOutcome {
    pub fn message(&self) -> String {
        match self {
            LinkOutcome::Linked { student } => format!("Eklendi: {}", student.display_name),
            LinkOutcome::NotFound => "Bu e-posta ile kayıtlı öğrenci bulunamadı.".to_string(),
            LinkOutcome::SelfLink => "Kendinizi öğrenci olarak ekleyemezsiniz.".to_string(),
            LinkOutcome::AlreadyLinked { .. } => "Bu öğrenci zaten listenizde.".to_string(),
        }
    }
}

#[instrument(skip(store))]
pub async fn add_student_by_email(
    store: &dyn DocumentStore,
    teacher_uid: &str,
    email: &str,
) -> Result<LinkOutcome, AppError> {
    let Some(student) = find_by_email(store, email.trim()).await? else {
        return Ok(LinkOutcome::NotFound);
    };

    if student.uid == teacher_uid {
        return Ok(LinkOutcome::SelfLink);
    }

    if is_linked(store, teacher_uid, &student.uid).await? {
        return Ok(LinkOutcome::AlreadyLinked { student });
    }

    link(store, teacher_uid, &student.uid).await?;
    Ok(LinkOutcome::Linked { student })
}
