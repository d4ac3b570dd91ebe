//! Calendar helpers. Weeks are identified by their Monday; every date is a
//! plain calendar date with no timezone conversion involved.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern"));

const ISO_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayKey {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayKey {
    pub const ALL: [DayKey; 7] = [
        DayKey::Mon,
        DayKey::Tue,
        DayKey::Wed,
        DayKey::Thu,
        DayKey::Fri,
        DayKey::Sat,
        DayKey::Sun,
    ];

    /// Monday = 0 .. Sunday = 6.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayKey::Mon => "mon",
            DayKey::Tue => "tue",
            DayKey::Wed => "wed",
            DayKey::Thu => "thu",
            DayKey::Fri => "fri",
            DayKey::Sat => "sat",
            DayKey::Sun => "sun",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        DayKey::ALL
            .into_iter()
            .find(|day| day.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("Unknown day key: {}", s)))
    }

    pub fn label_tr(self) -> &'static str {
        match self {
            DayKey::Mon => "Pazartesi",
            DayKey::Tue => "Salı",
            DayKey::Wed => "Çarşamba",
            DayKey::Thu => "Perşembe",
            DayKey::Fri => "Cuma",
            DayKey::Sat => "Cumartesi",
            DayKey::Sun => "Pazar",
        }
    }
}

pub fn parse_iso_date(iso: &str) -> Result<NaiveDate, AppError> {
    if !ISO_DATE.is_match(iso) {
        return Err(AppError::Validation(
            "Tarih YYYY-MM-DD olmalı.".to_string(),
        ));
    }
    NaiveDate::parse_from_str(iso, ISO_FORMAT)
        .map_err(|_| AppError::Validation(format!("Geçersiz tarih: {}", iso)))
}

pub fn to_iso(date: NaiveDate) -> String {
    date.format(ISO_FORMAT).to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn add_days(date: NaiveDate, n: i64) -> NaiveDate {
    date + Duration::days(n)
}

/// Dates whose year has exactly four digits.
pub fn checked_add_days(date: NaiveDate, n: i64) -> Result<NaiveDate, AppError> {
    Duration::try_days(n)
        .and_then(|delta| date.checked_add_signed(delta))
        .filter(|shifted| (0..=9999).contains(&shifted.year()))
        .ok_or_else(|| AppError::Validation(format!("Tarih aralık dışında: {} + {} gün", to_iso(date), n)))
}

pub fn add_days_iso(iso: &str, n: i64) -> Result<String, AppError> {
    Ok(to_iso(checked_add_days(parse_iso_date(iso)?, n)?))
}

pub fn monday_of(date: NaiveDate) -> NaiveDate {
    // num_days_from_sunday: Sun=0..Sat=6, so (w + 6) % 7 is the distance back to Monday.
    let back = (date.weekday().num_days_from_sunday() + 6) % 7;
    date - Duration::days(i64::from(back))
}

pub fn monday_iso(iso: &str) -> Result<String, AppError> {
    Ok(to_iso(monday_of(parse_iso_date(iso)?)))
}

/// `2024-03-04` → `04.03.2024`.
pub fn format_tr(iso: &str) -> Result<String, AppError> {
    Ok(parse_iso_date(iso)?.format("%d.%m.%Y").to_string())
}

pub fn week_label(week_start: &str) -> Result<String, AppError> {
    Ok(format!(
        "{} – {}",
        format_tr(week_start)?,
        format_tr(&add_days_iso(week_start, 6)?)?
    ))
}

pub fn day_key_of(date: NaiveDate) -> DayKey {
    DayKey::ALL[date.weekday().num_days_from_monday() as usize]
}

pub fn today_day_key() -> DayKey {
    day_key_of(today())
}

pub fn weekday_short_tr(index: usize) -> &'static str {
    ["Pzt", "Sal", "Çar", "Per", "Cum", "Cmt", "Paz"]
        .get(index)
        .copied()
        .unwrap_or("")
}

/// Seven `(day, iso)` pairs starting at `week_start`.
pub fn week_days(week_start: &str) -> Result<Vec<(DayKey, String)>, AppError> {
    let start = parse_iso_date(week_start)?;
    Ok(DayKey::ALL
        .into_iter()
        .map(|day| (day, to_iso(add_days(start, day.index() as i64))))
        .collect())
}

/// Mondays going back from the week containing `from`, newest first.
pub fn recent_mondays(from: NaiveDate, count: usize) -> Vec<String> {
    let start = monday_of(from);
    (0..count)
        .map(|i| to_iso(start - Duration::weeks(i as i64)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekOption {
    pub id: String,
    pub start_iso: String,
    pub end_iso: String,
    pub label: String,
}

impl WeekOption {
    pub fn for_monday(start_iso: &str) -> Result<Self, AppError> {
        let end_iso = add_days_iso(start_iso, 6)?;
        Ok(Self {
            id: format!("{}_{}", start_iso, end_iso),
            label: week_label(start_iso)?,
            start_iso: start_iso.to_string(),
            end_iso,
        })
    }
}

/// Weeks that actually hold data, newest first; recent weeks when there is
/// none. Unparseable keys are ignored.
pub fn week_options<'a, I>(dates: I, today: NaiveDate, max_weeks: usize) -> Vec<WeekOption>
where
    I: IntoIterator<Item = &'a String>,
{
    let mondays: BTreeSet<NaiveDate> = dates
        .into_iter()
        .filter_map(|iso| parse_iso_date(iso).ok())
        .map(monday_of)
        .collect();

    let starts: Vec<String> = if mondays.is_empty() {
        recent_mondays(today, max_weeks)
    } else {
        mondays.into_iter().rev().take(max_weeks).map(to_iso).collect()
    };

    starts
        .iter()
        .filter_map(|start| WeekOption::for_monday(start).ok())
        .collect()
}
