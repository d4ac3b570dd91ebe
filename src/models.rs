use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dates::DayKey;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    #[serde(rename = "Türkçe")]
    Turkce,
    #[serde(rename = "Matematik")]
    Matematik,
    #[serde(rename = "Fen Bilimleri")]
    FenBilimleri,
    #[serde(rename = "İngilizce")]
    Ingilizce,
    #[serde(rename = "Din Kültürü")]
    DinKulturu,
    #[serde(rename = "İnkılap Tarihi")]
    InkilapTarihi,
}

impl Subject {
    /// Display order used by every form and chart.
    pub const ALL: [Subject; 6] = [
        Subject::Turkce,
        Subject::Matematik,
        Subject::FenBilimleri,
        Subject::Ingilizce,
        Subject::DinKulturu,
        Subject::InkilapTarihi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subject::Turkce => "Türkçe",
            Subject::Matematik => "Matematik",
            Subject::FenBilimleri => "Fen Bilimleri",
            Subject::Ingilizce => "İngilizce",
            Subject::DinKulturu => "Din Kültürü",
            Subject::InkilapTarihi => "İnkılap Tarihi",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Subject::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn parse(name: &str) -> Result<Self, AppError> {
        Self::from_name(name).ok_or_else(|| AppError::Validation(format!("Unknown subject: {}", name)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStudyEntry {
    pub questions: u32,
    pub correct: u32,
    pub wrong: u32,
    pub blank: u32,
    pub minutes: u32,
}

impl DailyStudyEntry {
    /// Declared total disagrees with correct + wrong + blank. Zero totals
    /// are left alone since the form starts out empty.
    pub fn has_mismatch(&self) -> bool {
        let parts = u64::from(self.correct) + u64::from(self.wrong) + u64::from(self.blank);
        self.questions != 0 && u64::from(self.questions) != parts
    }

    pub fn is_all_zero(&self) -> bool {
        *self == DailyStudyEntry::default()
    }
}

/// One day of study, keyed by subject.
pub type DayMap = BTreeMap<Subject, DailyStudyEntry>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub subject: String,
    pub minutes: f64,
    #[serde(default)]
    pub questions: u32,
    #[serde(default)]
    pub note: String,
    #[serde(with = "done_flag", default)]
    pub done: bool,
}

impl Task {
    pub fn new(subject: &str, minutes: f64, questions: u32, note: &str) -> Self {
        Self {
            subject: subject.to_string(),
            minutes,
            questions,
            note: note.to_string(),
            done: false,
        }
    }

    /// Everything but the completion flag matches.
    pub fn same_content(&self, other: &Task) -> bool {
        self.subject == other.subject
            && self.minutes == other.minutes
            && self.questions == other.questions
            && self.note == other.note
    }
}

/// Completion is stored as 0/1; booleans are accepted on read.
mod done_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(done: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*done))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Number(f64),
        Bool(bool),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Number(n) => n == 1.0,
            Flag::Bool(b) => b,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

pub type WeekTasks = BTreeMap<DayKey, Vec<Task>>;

pub fn empty_week() -> WeekTasks {
    DayKey::ALL.into_iter().map(|day| (day, Vec::new())).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyProgramDoc {
    #[serde(rename = "weekStartISO")]
    pub week_start_iso: String,
    pub teacher_uid: String,
    pub student_uid: String,
    pub items: BTreeMap<DayKey, DayPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl WeeklyProgramDoc {
    pub fn tasks(&self, day: DayKey) -> &[Task] {
        self.items
            .get(&day)
            .map(|plan| plan.tasks.as_slice())
            .unwrap_or(&[])
    }

    /// All seven days, missing ones empty.
    pub fn week_tasks(&self) -> WeekTasks {
        DayKey::ALL
            .into_iter()
            .map(|day| (day, self.tasks(day).to_vec()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub uid: String,
    pub display_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub title: String,
    pub course: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub status: AssignmentStatus,
    pub note: Option<String>,
    pub student_uid: String,
    pub teacher_uid: String,
    pub created_at: Option<DateTime<Utc>>,
}
