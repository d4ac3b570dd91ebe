//! Unsaved program edits, tracked against the last loaded or saved state.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::dates::DayKey;
use crate::error::AppError;
use crate::models::{Subject, Task, WeekTasks, WeeklyProgramDoc, empty_week};
use crate::program::{patch_day, week_tasks_of};
use crate::store::DocumentStore;

const DEFAULT_TASK_MINUTES: f64 = 30.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Kaydedilmemiş değişiklikler var. Devam etmek için onay gerekli.")]
    UnsavedChanges,
    #[error("Görev bulunamadı: {day:?} #{index}")]
    NoSuchTask { day: DayKey, index: usize },
}

impl From<DraftError> for AppError {
    fn from(err: DraftError) -> Self {
        match err {
            DraftError::UnsavedChanges => AppError::Conflict(err.to_string()),
            DraftError::NoSuchTask { .. } => AppError::NotFound(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDraft {
    week_start: String,
    baseline: WeekTasks,
    current: WeekTasks,
}

impl ProgramDraft {
    pub fn empty(week_start: &str) -> Self {
        Self {
            week_start: week_start.to_string(),
            baseline: empty_week(),
            current: empty_week(),
        }
    }

    pub fn load(week_start: &str, doc: Option<&WeeklyProgramDoc>) -> Self {
        let tasks = week_tasks_of(doc);
        Self {
            week_start: week_start.to_string(),
            baseline: tasks.clone(),
            current: tasks,
        }
    }

    pub fn week_start(&self) -> &str {
        &self.week_start
    }

    pub fn current(&self) -> &WeekTasks {
        &self.current
    }

    pub fn tasks(&self, day: DayKey) -> &[Task] {
        self.current.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_dirty(&self) -> bool {
        self.baseline != self.current
    }

    /// Save is offered only when there is something to save.
    pub fn can_save(&self) -> bool {
        self.is_dirty()
    }

    fn task_mut(&mut self, day: DayKey, index: usize) -> Result<&mut Task, DraftError> {
        self.current
            .get_mut(&day)
            .and_then(|tasks| tasks.get_mut(index))
            .ok_or(DraftError::NoSuchTask { day, index })
    }

    pub fn toggle_done(&mut self, day: DayKey, index: usize, done: bool) -> Result<(), DraftError> {
        self.task_mut(day, index)?.done = done;
        Ok(())
    }

    pub fn add_task(&mut self, day: DayKey) -> usize {
        let tasks = self.current.entry(day).or_default();
        tasks.push(Task::new(Subject::ALL[0].name(), DEFAULT_TASK_MINUTES, 0, ""));
        tasks.len() - 1
    }

    pub fn remove_task(&mut self, day: DayKey, index: usize) -> Result<Task, DraftError> {
        let tasks = self
            .current
            .get_mut(&day)
            .filter(|tasks| index < tasks.len())
            .ok_or(DraftError::NoSuchTask { day, index })?;
        Ok(tasks.remove(index))
    }

    pub fn patch_task<F>(&mut self, day: DayKey, index: usize, patch: F) -> Result<(), DraftError>
    where
        F: FnOnce(&mut Task),
    {
        patch(self.task_mut(day, index)?);
        Ok(())
    }

    /// Switching weeks throws edits away, so a dirty draft needs explicit
    /// confirmation. Returns the fresh draft for the new week.
    pub fn request_week_change(
        &self,
        next_week: &str,
        confirmed: bool,
        next_doc: Option<&WeeklyProgramDoc>,
    ) -> Result<ProgramDraft, DraftError> {
        if self.is_dirty() && !confirmed {
            warn!(from = %self.week_start, to = %next_week, "Week change blocked by unsaved edits");
            return Err(DraftError::UnsavedChanges);
        }
        Ok(ProgramDraft::load(next_week, next_doc))
    }

    /// Whether leaving the page needs a confirmation prompt.
    pub fn confirm_unload(&self) -> bool {
        self.is_dirty()
    }

    pub fn mark_saved(&mut self) {
        self.baseline = self.current.clone();
    }

    /// Incoming snapshot from the store. Applied only while there are no
    /// local edits, so a remote update never clobbers unsaved work.
    pub fn rebase(&mut self, doc: Option<&WeeklyProgramDoc>) -> bool {
        if self.is_dirty() {
            return false;
        }
        let tasks = week_tasks_of(doc);
        self.baseline = tasks.clone();
        self.current = tasks;
        true
    }

    pub fn changed_days(&self) -> Vec<DayKey> {
        DayKey::ALL
            .into_iter()
            .filter(|day| self.baseline.get(day) != self.current.get(day))
            .collect()
    }
}

/// Writes the student's completion edits day by day. The baseline moves
/// only after every write succeeded; on failure the draft stays dirty.
#[instrument(skip(store, draft), fields(week = %draft.week_start))]
pub async fn commit_student_draft(
    store: &dyn DocumentStore,
    draft: &mut ProgramDraft,
    teacher_uid: &str,
    student_uid: &str,
) -> Result<(), AppError> {
    for day in draft.changed_days() {
        patch_day(
            store,
            teacher_uid,
            student_uid,
            &draft.week_start,
            day,
            draft.tasks(day),
        )
        .await?;
    }

    draft.mark_saved();
    info!("Student draft saved");
    Ok(())
}

/// Dirty flags per student on the teacher screen.
#[derive(Debug, Default, Clone)]
pub struct DirtyTracker {
    flags: HashMap<String, bool>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the flag actually changed.
    pub fn set(&mut self, uid: &str, dirty: bool) -> bool {
        let previous = self.flags.insert(uid.to_string(), dirty);
        previous != Some(dirty) && (previous.is_some() || dirty)
    }

    pub fn is_dirty(&self, uid: &str) -> bool {
        self.flags.get(uid).copied().unwrap_or(false)
    }

    pub fn has_dirty(&self) -> bool {
        self.flags.values().any(|dirty| *dirty)
    }

    pub fn clear(&mut self) {
        self.flags.clear();
    }
}
