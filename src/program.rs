//! Weekly programs. Every program lives twice: under the teacher
//! (`users/{teacher}/weeklyProgram/{student}_{week}`) and under the student
//! (`users/{student}/weeklyProgram/{teacher}_{week}`). Both copies are
//! written in the same batch.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::dates::{DayKey, monday_iso};
use crate::error::AppError;
use crate::models::{DayPlan, Task, WeekTasks, WeeklyProgramDoc};
use crate::registry::profile_path;
use crate::store::{CollectionPath, DocPath, DocumentStore, FieldPath, WriteBatch};

pub const WEEKLY_PROGRAM: &str = "weeklyProgram";

pub fn teacher_mirror(teacher_uid: &str, student_uid: &str, week_start: &str) -> Result<DocPath, AppError> {
    profile_path(teacher_uid)?.child(WEEKLY_PROGRAM, &format!("{}_{}", student_uid, week_start))
}

pub fn student_mirror(teacher_uid: &str, student_uid: &str, week_start: &str) -> Result<DocPath, AppError> {
    profile_path(student_uid)?.child(WEEKLY_PROGRAM, &format!("{}_{}", teacher_uid, week_start))
}

/// Rejects anything that is not the Monday of its own week.
pub fn require_week_start(week_start: &str) -> Result<(), AppError> {
    if monday_iso(week_start)? == week_start {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Hafta başlangıcı pazartesi olmalı: {}",
            week_start
        )))
    }
}

/// All seven days present; every task starts incomplete.
pub fn create_from_tasks(
    week_start: &str,
    teacher_uid: &str,
    student_uid: &str,
    tasks_by_day: &BTreeMap<DayKey, Vec<Task>>,
) -> WeeklyProgramDoc {
    let items = DayKey::ALL
        .into_iter()
        .map(|day| {
            let tasks = tasks_by_day
                .get(&day)
                .map(|tasks| {
                    tasks
                        .iter()
                        .cloned()
                        .map(|task| Task { done: false, ..task })
                        .collect()
                })
                .unwrap_or_default();
            (day, DayPlan { tasks })
        })
        .collect();

    WeeklyProgramDoc {
        week_start_iso: week_start.to_string(),
        teacher_uid: teacher_uid.to_string(),
        student_uid: student_uid.to_string(),
        items,
        created_at: Some(Utc::now().timestamp_millis()),
    }
}

/// Full replace of both mirrors in one commit.
#[instrument(skip(store, doc), fields(teacher = %doc.teacher_uid, student = %doc.student_uid, week = %doc.week_start_iso))]
pub async fn save_full(store: &dyn DocumentStore, doc: &WeeklyProgramDoc) -> Result<(), AppError> {
    info!("Saving weekly program");
    let data = serde_json::to_value(doc)?;
    let batch = WriteBatch::new()
        .set(
            teacher_mirror(&doc.teacher_uid, &doc.student_uid, &doc.week_start_iso)?,
            data.clone(),
        )
        .set(
            student_mirror(&doc.teacher_uid, &doc.student_uid, &doc.week_start_iso)?,
            data,
        );

    store.commit(batch).await
}

/// Merge-patches one day on both mirrors; other days stay untouched.
#[instrument(skip(store, tasks), fields(tasks = tasks.len()))]
pub async fn patch_day(
    store: &dyn DocumentStore,
    teacher_uid: &str,
    student_uid: &str,
    week_start: &str,
    day: DayKey,
    tasks: &[Task],
) -> Result<(), AppError> {
    info!("Patching program day");
    let patch = json!({ "items": { day.as_str(): { "tasks": tasks } } });
    let batch = WriteBatch::new()
        .merge(teacher_mirror(teacher_uid, student_uid, week_start)?, patch.clone())
        .merge(student_mirror(teacher_uid, student_uid, week_start)?, patch);

    store.commit(batch).await
}

/// First decodable program in the student's mirror collection for that week.
#[instrument(skip(store))]
pub async fn fetch_for_student(
    store: &dyn DocumentStore,
    student_uid: &str,
    week_start: &str,
) -> Result<Option<WeeklyProgramDoc>, AppError> {
    let collection = CollectionPath::under(&profile_path(student_uid)?, WEEKLY_PROGRAM);
    let hits = store
        .query(
            &collection,
            &FieldPath::new(["weekStartISO"]),
            &Value::String(week_start.to_string()),
            None,
        )
        .await?;

    Ok(hits.iter().find_map(|(_, raw)| decode_program(raw)))
}

#[instrument(skip(store))]
pub async fn fetch_for_teacher(
    store: &dyn DocumentStore,
    teacher_uid: &str,
    student_uid: &str,
    week_start: &str,
) -> Result<Option<WeeklyProgramDoc>, AppError> {
    let raw = store
        .get(&teacher_mirror(teacher_uid, student_uid, week_start)?)
        .await?;
    Ok(raw.as_ref().and_then(decode_program))
}

/// Teacher save: a first save builds a fresh program, later saves keep the
/// creation stamp and whatever completion flags the teacher sent.
pub async fn save_teacher_program(
    store: &dyn DocumentStore,
    teacher_uid: &str,
    student_uid: &str,
    week_start: &str,
    tasks_by_day: &BTreeMap<DayKey, Vec<Task>>,
) -> Result<WeeklyProgramDoc, AppError> {
    require_week_start(week_start)?;

    let doc = match fetch_for_teacher(store, teacher_uid, student_uid, week_start).await? {
        Some(existing) => WeeklyProgramDoc {
            items: DayKey::ALL
                .into_iter()
                .map(|day| {
                    let tasks = tasks_by_day.get(&day).cloned().unwrap_or_default();
                    (day, DayPlan { tasks })
                })
                .collect(),
            ..existing
        },
        None => create_from_tasks(week_start, teacher_uid, student_uid, tasks_by_day),
    };

    save_full(store, &doc).await?;
    Ok(doc)
}

fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn decode_task(raw: &Value) -> Option<Task> {
    let obj = raw.as_object()?;
    let subject = match obj.get("subject") {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    };
    let done = match obj.get("done") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        _ => false,
    };
    let questions = number(obj.get("questions"));

    Some(Task {
        subject,
        minutes: number(obj.get("minutes")),
        questions: if questions.is_finite() && questions > 0.0 {
            questions as u32
        } else {
            0
        },
        note: obj
            .get("note")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        done,
    })
}

/// Lenient read: missing days or task lists become empty, non-object task
/// entries are dropped. Identity fields are required.
pub fn decode_program(raw: &Value) -> Option<WeeklyProgramDoc> {
    let text = |field: &str| raw.get(field)?.as_str().map(String::from);

    let items = DayKey::ALL
        .into_iter()
        .map(|day| {
            let tasks = raw
                .get("items")
                .and_then(|items| items.get(day.as_str()))
                .and_then(|plan| plan.get("tasks"))
                .and_then(Value::as_array)
                .map(|tasks| tasks.iter().filter_map(decode_task).collect())
                .unwrap_or_default();
            (day, DayPlan { tasks })
        })
        .collect();

    Some(WeeklyProgramDoc {
        week_start_iso: text("weekStartISO")?,
        teacher_uid: text("teacherUid")?,
        student_uid: text("studentUid")?,
        items,
        created_at: raw.get("createdAt").and_then(Value::as_i64),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectMinutes {
    pub subject: String,
    pub minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStats {
    pub total_minutes: f64,
    /// In order of first appearance, Monday first.
    pub by_subject: Vec<SubjectMinutes>,
}

/// Minutes of completed tasks only. Negative or non-finite minutes count as 0.
pub fn compute_stats(doc: &WeeklyProgramDoc) -> ProgramStats {
    let mut stats = ProgramStats::default();

    for day in DayKey::ALL {
        for task in doc.tasks(day).iter().filter(|task| task.done) {
            let minutes = if task.minutes.is_finite() {
                task.minutes.max(0.0)
            } else {
                0.0
            };
            stats.total_minutes += minutes;

            match stats.by_subject.iter_mut().find(|s| s.subject == task.subject) {
                Some(entry) => entry.minutes += minutes,
                None => stats.by_subject.push(SubjectMinutes {
                    subject: task.subject.clone(),
                    minutes,
                }),
            }
        }
    }

    stats
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub done: usize,
    pub total: usize,
    pub percent: u32,
}

pub fn completion(doc: &WeeklyProgramDoc) -> Completion {
    let (done, total) = DayKey::ALL
        .into_iter()
        .flat_map(|day| doc.tasks(day))
        .fold((0, 0), |(done, total), task| (done + usize::from(task.done), total + 1));

    let percent = if total > 0 {
        ((done as f64 / total as f64) * 100.0).round() as u32
    } else {
        0
    };

    Completion {
        done,
        total,
        percent,
    }
}

/// Students may only flip completion flags; the task list itself belongs
/// to the teacher.
pub fn only_completion_changed(before: &[Task], after: &[Task]) -> bool {
    before.len() == after.len() && before.iter().zip(after).all(|(a, b)| a.same_content(b))
}

pub fn week_tasks_of(doc: Option<&WeeklyProgramDoc>) -> WeekTasks {
    doc.map(WeeklyProgramDoc::week_tasks)
        .unwrap_or_else(crate::models::empty_week)
}
