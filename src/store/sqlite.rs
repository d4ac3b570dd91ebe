use std::collections::{BTreeSet, HashMap};

use rocket::async_trait;
use serde_json::{Map, Value};
use sqlx::{Pool, Row, Sqlite, Transaction};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use super::merge::{array_union, deep_merge, get_field, set_field};
use super::{CollectionPath, DocPath, DocumentChange, DocumentStore, FieldPath, WriteBatch, WriteOp};
use crate::error::AppError;

const CHANGE_BUFFER: usize = 256;

/// Documents live in a single `documents` table as JSON text.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<DocumentChange>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self { pool, changes }
    }

    async fn load(
        tx: &mut Transaction<'_, Sqlite>,
        path: &DocPath,
    ) -> Result<Option<Value>, AppError> {
        let row = sqlx::query("SELECT data FROM documents WHERE path = ?")
            .bind(path.to_string())
            .fetch_optional(&mut **tx)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("data")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn store(
        tx: &mut Transaction<'_, Sqlite>,
        path: &DocPath,
        data: &Value,
    ) -> Result<(), AppError> {
        let raw = serde_json::to_string(data)?;
        sqlx::query(
            "INSERT INTO documents (path, collection, data, updated_at)
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(path) DO UPDATE SET data = excluded.data, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(path.to_string())
        .bind(path.parent().to_string())
        .bind(raw)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn require_object(path: &DocPath, data: &Value) -> Result<(), AppError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Document {} must be a JSON object",
            path
        )))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, AppError> {
        debug!("Reading document");
        let row = sqlx::query("SELECT data FROM documents WHERE path = ?")
            .bind(path.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("data")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, batch), fields(ops = batch.ops().len()))]
    async fn commit(&self, batch: WriteBatch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }

        info!("Committing write batch");
        let mut tx = self.pool.begin().await?;

        // Ops on the same document see each other's effects, so stage
        // everything in memory and flush once per document.
        let mut staged: HashMap<DocPath, Option<Value>> = HashMap::new();
        let mut touched: BTreeSet<DocPath> = BTreeSet::new();

        for op in batch.into_ops() {
            let path = op.path().clone();
            if !staged.contains_key(&path) {
                let current = Self::load(&mut tx, &path).await?;
                staged.insert(path.clone(), current);
            }
            let slot = staged.entry(path.clone()).or_insert(None);

            match op {
                WriteOp::Set { data, .. } => {
                    require_object(&path, &data)?;
                    *slot = Some(data);
                }
                WriteOp::Merge { data, .. } => {
                    require_object(&path, &data)?;
                    let doc = slot.get_or_insert_with(empty_object);
                    deep_merge(doc, &data);
                }
                WriteOp::Update { field, value, .. } => {
                    let Some(doc) = slot.as_mut() else {
                        // Dropping the transaction rolls back earlier ops.
                        return Err(AppError::NotFound(format!(
                            "Cannot update missing document {}",
                            path
                        )));
                    };
                    set_field(doc, &field, value);
                }
                WriteOp::ArrayUnion { field, values, .. } => {
                    let doc = slot.get_or_insert_with(empty_object);
                    array_union(doc, &field, &values);
                }
            }
            touched.insert(path);
        }

        for path in &touched {
            if let Some(Some(data)) = staged.get(path) {
                Self::store(&mut tx, path, data).await?;
            }
        }

        tx.commit().await?;

        for path in touched {
            // No receivers is fine: nobody is observing.
            let _ = self.changes.send(DocumentChange { path });
        }

        Ok(())
    }

    #[instrument(skip(self, value), fields(collection = %collection, field = %field))]
    async fn query(
        &self,
        collection: &CollectionPath,
        field: &FieldPath,
        value: &Value,
        limit: Option<usize>,
    ) -> Result<Vec<(DocPath, Value)>, AppError> {
        debug!("Querying collection");
        let rows = sqlx::query("SELECT path, data FROM documents WHERE collection = ? ORDER BY path")
            .bind(collection.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut matches = Vec::new();
        for row in rows {
            let raw: String = row.try_get("data")?;
            let data: Value = serde_json::from_str(&raw)?;
            if get_field(&data, field) != Some(value) {
                continue;
            }

            let path: String = row.try_get("path")?;
            matches.push((DocPath::parse(&path)?, data));

            if limit.is_some_and(|limit| matches.len() >= limit) {
                break;
            }
        }

        Ok(matches)
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}
