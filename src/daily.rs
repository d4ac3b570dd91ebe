//! Per-day, per-subject study metrics stored in `kocluk/{uid}` under
//! `days.{YYYY-MM-DD}.{subject}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::auth::AuthUser;
use crate::dates::{add_days, parse_iso_date, to_iso, weekday_short_tr};
use crate::error::AppError;
use crate::models::{DailyStudyEntry, DayMap, Subject};
use crate::store::{DocPath, DocumentStore, FieldPath, Observer, WriteBatch};

pub const KOCLUK: &str = "kocluk";

pub type AllDays = BTreeMap<String, DayMap>;

pub fn kocluk_path(uid: &str) -> Result<DocPath, AppError> {
    DocPath::new(KOCLUK, uid)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub date: String,
    pub saved: Vec<Subject>,
    /// Subjects whose correct + wrong + blank disagrees with the declared total.
    pub mismatched: Vec<Subject>,
}

/// Each given subject replaces whatever was stored for that day and subject.
#[instrument(skip(store, caller, updates), fields(uid = caller.map(|c| c.uid.as_str()).unwrap_or("")))]
pub async fn save_daily_studies(
    store: &dyn DocumentStore,
    caller: Option<&AuthUser>,
    date: &str,
    updates: &DayMap,
) -> Result<SaveReport, AppError> {
    let caller = caller.ok_or_else(|| AppError::Authorization("Giriş gerekli.".to_string()))?;
    let day = to_iso(parse_iso_date(date)?);
    let path = kocluk_path(&caller.uid)?;

    let mut batch = WriteBatch::new().merge(path.clone(), json!({ "uid": caller.uid }));
    let mut report = SaveReport {
        date: day.clone(),
        ..SaveReport::default()
    };

    for (subject, entry) in updates {
        if entry.has_mismatch() {
            warn!(subject = subject.name(), "Answer breakdown does not add up to the question total");
            report.mismatched.push(*subject);
        }
        batch = batch.update(
            path.clone(),
            FieldPath::new(["days", day.as_str(), subject.name()]),
            serde_json::to_value(entry)?,
        );
        report.saved.push(*subject);
    }

    info!(subjects = report.saved.len(), "Saving daily studies");
    store.commit(batch).await?;
    Ok(report)
}

/// Numbers, numeric strings, and anything else as 0. Negatives clamp to 0.
fn metric(value: Option<&Value>) -> u32 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 {
        n.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

fn decode_entry(raw: &Value) -> DailyStudyEntry {
    DailyStudyEntry {
        questions: metric(raw.get("questions")),
        correct: metric(raw.get("correct")),
        wrong: metric(raw.get("wrong")),
        blank: metric(raw.get("blank")),
        minutes: metric(raw.get("minutes")),
    }
}

/// Current shape is `{subject: entry}`; older records are
/// `[{subject, questions, ...}]`. Anything else is an empty day.
pub fn decode_day(raw: Option<&Value>) -> DayMap {
    match raw {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(name, entry)| {
                let subject = Subject::from_name(name)?;
                entry.is_object().then(|| (subject, decode_entry(entry)))
            })
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let subject = Subject::from_name(item.get("subject")?.as_str()?)?;
                Some((subject, decode_entry(item)))
            })
            .collect(),
        _ => DayMap::new(),
    }
}

pub fn decode_all_days(doc: Option<&Value>) -> AllDays {
    doc.and_then(|d| d.get("days"))
        .and_then(Value::as_object)
        .map(|days| {
            days.iter()
                .map(|(date, raw)| (date.clone(), decode_day(Some(raw))))
                .collect()
        })
        .unwrap_or_default()
}

pub async fn get_day(store: &dyn DocumentStore, uid: &str, date: &str) -> Result<DayMap, AppError> {
    let day = to_iso(parse_iso_date(date)?);
    let doc = store.get(&kocluk_path(uid)?).await?;
    Ok(decode_day(doc.as_ref().and_then(|d| d.get("days")?.get(&day))))
}

pub async fn get_all_days(store: &dyn DocumentStore, uid: &str) -> Result<AllDays, AppError> {
    let doc = store.get(&kocluk_path(uid)?).await?;
    Ok(decode_all_days(doc.as_ref()))
}

pub fn observe_day(
    store: Arc<dyn DocumentStore>,
    uid: &str,
    date: &str,
) -> Result<Observer<DayMap>, AppError> {
    let day = to_iso(parse_iso_date(date)?);
    Ok(Observer::new(store, kocluk_path(uid)?, move |doc| {
        decode_day(doc.and_then(|d| d.get("days")?.get(&day)))
    }))
}

pub fn observe_all_days(store: Arc<dyn DocumentStore>, uid: &str) -> Result<Observer<AllDays>, AppError> {
    Ok(Observer::new(store, kocluk_path(uid)?, decode_all_days))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub questions: u32,
    pub minutes: u32,
}

pub fn sum_day(day: Option<&DayMap>) -> Totals {
    day.into_iter()
        .flat_map(|map| map.values())
        .fold(Totals::default(), |acc, entry| Totals {
            questions: acc.questions.saturating_add(entry.questions),
            minutes: acc.minutes.saturating_add(entry.minutes),
        })
}

pub fn week_totals(all_days: &AllDays, week_start: NaiveDate) -> Totals {
    (0..7)
        .map(|i| sum_day(all_days.get(&to_iso(add_days(week_start, i)))))
        .fold(Totals::default(), |acc, day| Totals {
            questions: acc.questions.saturating_add(day.questions),
            minutes: acc.minutes.saturating_add(day.minutes),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPoint {
    pub day_label: String,
    pub iso: String,
    pub questions: u32,
    pub minutes: u32,
}

/// Monday through Sunday, zero-filled.
pub fn week_points(all_days: &AllDays, week_start: NaiveDate) -> Vec<WeeklyPoint> {
    (0..7usize)
        .map(|i| {
            let iso = to_iso(add_days(week_start, i as i64));
            let totals = sum_day(all_days.get(&iso));
            WeeklyPoint {
                day_label: weekday_short_tr(i).to_string(),
                iso,
                questions: totals.questions,
                minutes: totals.minutes,
            }
        })
        .collect()
}

pub fn subject_week_total(all_days: &AllDays, week_start: NaiveDate, subject: Subject) -> u32 {
    (0..7)
        .filter_map(|i| all_days.get(&to_iso(add_days(week_start, i))))
        .filter_map(|day| day.get(&subject))
        .fold(0u32, |acc, entry| acc.saturating_add(entry.questions))
}

fn is_active(day: Option<&DayMap>) -> bool {
    let totals = sum_day(day);
    totals.questions > 0 || totals.minutes > 0
}

/// Consecutive active days ending today. A still-empty today does not
/// break a streak that ran through yesterday.
pub fn streak_days(all_days: &AllDays, today: NaiveDate) -> u32 {
    let mut cursor = today;
    if !is_active(all_days.get(&to_iso(cursor))) {
        cursor = add_days(cursor, -1);
    }

    let mut streak = 0;
    while is_active(all_days.get(&to_iso(cursor))) {
        streak += 1;
        cursor = add_days(cursor, -1);
    }
    streak
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakLevel {
    Low,
    Mid,
    High,
}

impl StreakLevel {
    pub fn for_days(days: u32) -> Self {
        match days {
            0..=2 => StreakLevel::Low,
            3..=6 => StreakLevel::Mid,
            _ => StreakLevel::High,
        }
    }
}
