//! Homework handed out by a coach, one document per item in `assignments/{id}`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Assignment, AssignmentStatus};
use crate::store::{CollectionPath, DocPath, DocumentStore, FieldPath, WriteBatch};

pub const ASSIGNMENTS: &str = "assignments";

const UNTITLED: &str = "Ödev";

pub fn assignment_path(id: &str) -> Result<DocPath, AppError> {
    DocPath::new(ASSIGNMENTS, id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub title: String,
    pub course: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[instrument(skip(store, input), fields(title = %input.title))]
pub async fn create_assignment(
    store: &dyn DocumentStore,
    teacher_uid: &str,
    student_uid: &str,
    input: NewAssignment,
) -> Result<Assignment, AppError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Ödev başlığı boş olamaz.".to_string()));
    }

    let assignment = Assignment {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        course: input.course.filter(|c| !c.trim().is_empty()),
        due_at: input.due_at,
        status: AssignmentStatus::Pending,
        note: input.note.filter(|n| !n.trim().is_empty()),
        student_uid: student_uid.to_string(),
        teacher_uid: teacher_uid.to_string(),
        created_at: Some(Utc::now()),
    };

    let mut data = serde_json::to_value(&assignment)?;
    if let Some(obj) = data.as_object_mut() {
        obj.remove("id");
    }

    info!(id = %assignment.id, "Creating assignment");
    store
        .commit(WriteBatch::new().set(assignment_path(&assignment.id)?, data))
        .await?;
    Ok(assignment)
}

/// Newest first; items without a creation time sort last.
#[instrument(skip(store))]
pub async fn list_for_student(
    store: &dyn DocumentStore,
    student_uid: &str,
) -> Result<Vec<Assignment>, AppError> {
    let hits = store
        .query(
            &CollectionPath::root(ASSIGNMENTS),
            &FieldPath::new(["studentUid"]),
            &Value::String(student_uid.to_string()),
            None,
        )
        .await?;

    let mut items: Vec<Assignment> = hits
        .into_iter()
        .map(|(path, raw)| decode_assignment(path.id(), &raw))
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(items)
}

/// Only the student the item was given to may flip its status.
#[instrument(skip(store))]
pub async fn set_status(
    store: &dyn DocumentStore,
    student_uid: &str,
    id: &str,
    status: AssignmentStatus,
) -> Result<(), AppError> {
    let path = assignment_path(id)?;
    let raw = store
        .get(&path)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ödev bulunamadı: {}", id)))?;

    if decode_assignment(id, &raw).student_uid != student_uid {
        return Err(AppError::Authorization(
            "Bu ödev size ait değil.".to_string(),
        ));
    }

    store
        .commit(WriteBatch::new().update(path, FieldPath::new(["status"]), json!(status)))
        .await
}

fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(String::from)
}

pub fn decode_assignment(id: &str, raw: &Value) -> Assignment {
    let title = raw
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(UNTITLED);
    let status = match raw.get("status").and_then(Value::as_str) {
        Some("done") => AssignmentStatus::Done,
        _ => AssignmentStatus::Pending,
    };

    Assignment {
        id: id.to_string(),
        title: title.to_string(),
        course: optional_text(raw.get("course")),
        due_at: timestamp(raw.get("dueAt")),
        status,
        note: optional_text(raw.get("note")),
        student_uid: optional_text(raw.get("studentUid")).unwrap_or_default(),
        teacher_uid: optional_text(raw.get("teacherUid")).unwrap_or_default(),
        created_at: timestamp(raw.get("createdAt")),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentFilter {
    #[default]
    All,
    Pending,
    Done,
    Overdue,
}

impl AssignmentFilter {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_lowercase().as_str() {
            "" | "all" => Ok(AssignmentFilter::All),
            "pending" => Ok(AssignmentFilter::Pending),
            "done" => Ok(AssignmentFilter::Done),
            "overdue" => Ok(AssignmentFilter::Overdue),
            other => Err(AppError::Validation(format!("Bilinmeyen filtre: {}", other))),
        }
    }
}

impl Assignment {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != AssignmentStatus::Done && self.due_at.is_some_and(|due| due < now)
    }
}

pub fn filter_assignments<'a>(
    items: &'a [Assignment],
    filter: AssignmentFilter,
    text: &str,
    now: DateTime<Utc>,
) -> Vec<&'a Assignment> {
    let needle = text.trim().to_lowercase();

    items
        .iter()
        .filter(|item| {
            if needle.is_empty() {
                return true;
            }
            let haystack = format!(
                "{} {} {}",
                item.title,
                item.course.as_deref().unwrap_or_default(),
                item.note.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            haystack.contains(&needle)
        })
        .filter(|item| match filter {
            AssignmentFilter::All => true,
            AssignmentFilter::Pending => item.status == AssignmentStatus::Pending,
            AssignmentFilter::Done => item.status == AssignmentStatus::Done,
            AssignmentFilter::Overdue => item.is_overdue(now),
        })
        .collect()
}
