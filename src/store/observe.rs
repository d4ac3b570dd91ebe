use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::{DocPath, DocumentChange, DocumentStore};
use crate::error::AppError;

type Projection<T> = Box<dyn Fn(Option<&Value>) -> T + Send + Sync>;

/// Live view of one document, projected into `T`.
///
/// The change registration is taken when the observer is built, so nothing
/// committed between construction and the first `next()` is missed. Values
/// equal to the last one delivered are skipped.
pub struct Observer<T> {
    store: Arc<dyn DocumentStore>,
    path: DocPath,
    changes: broadcast::Receiver<DocumentChange>,
    project: Projection<T>,
    last: Option<T>,
    primed: bool,
}

impl<T> Observer<T>
where
    T: PartialEq + Clone + Send,
{
    pub fn new<F>(store: Arc<dyn DocumentStore>, path: DocPath, project: F) -> Self
    where
        F: Fn(Option<&Value>) -> T + Send + Sync + 'static,
    {
        let changes = store.changes();
        debug!(path = %path, "Observer registered");
        Self {
            store,
            path,
            changes,
            project: Box::new(project),
            last: None,
            primed: false,
        }
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// Waits for the next distinct value. `Ok(None)` once the store is gone.
    pub async fn next(&mut self) -> Result<Option<T>, AppError> {
        loop {
            if self.primed {
                match self.changes.recv().await {
                    Ok(change) if change.path != self.path => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(path = %self.path, skipped, "Observer lagged, re-reading");
                    }
                    Err(RecvError::Closed) => return Ok(None),
                }
            }
            self.primed = true;

            let snapshot = self.store.get(&self.path).await?;
            let value = (self.project)(snapshot.as_ref());

            if self.last.as_ref() == Some(&value) {
                continue;
            }

            self.last = Some(value.clone());
            return Ok(Some(value));
        }
    }

    /// Last value handed out, if any.
    pub fn latest(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Releases the change registration. Dropping the observer does the
    /// same.
    pub fn dispose(self) {}
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        debug!(path = %self.path, "Observer disposed");
    }
}
