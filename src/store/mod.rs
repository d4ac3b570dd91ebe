//! Document store boundary.
//!
//! Business modules only ever talk to [`DocumentStore`]. Documents are JSON
//! objects addressed by slash-separated paths that alternate collection and
//! document ids (`users/{uid}/weeklyProgram/{id}`).

pub mod merge;
pub mod observe;
pub mod sqlite;

use std::fmt;

use rocket::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::AppError;

pub use observe::Observer;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    pub fn new(collection: &str, id: &str) -> Result<Self, AppError> {
        Self::from_segments(vec![collection.to_string(), id.to_string()])
    }

    pub fn parse(path: &str) -> Result<Self, AppError> {
        Self::from_segments(path.split('/').map(String::from).collect())
    }

    pub fn child(&self, collection: &str, id: &str) -> Result<Self, AppError> {
        let mut segments = self.segments.clone();
        segments.push(collection.to_string());
        segments.push(id.to_string());
        Self::from_segments(segments)
    }

    fn from_segments(segments: Vec<String>) -> Result<Self, AppError> {
        if segments.is_empty() || segments.len() % 2 != 0 {
            return Err(AppError::Validation(format!(
                "Document path must have an even number of segments: {}",
                segments.join("/")
            )));
        }
        if segments.iter().any(|s| s.is_empty() || s.contains('/')) {
            return Err(AppError::Validation(format!(
                "Invalid document path segment in {}",
                segments.join("/")
            )));
        }
        Ok(Self { segments })
    }

    pub fn id(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn parent(&self) -> CollectionPath {
        CollectionPath(self.segments[..self.segments.len() - 1].join("/"))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn under(doc: &DocPath, name: &str) -> Self {
        Self(format!("{}/{}", doc, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nested field address inside a document. Segments are kept apart so that
/// names containing dots or spaces ("Fen Bilimleri") stay unambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Full replace.
    Set { path: DocPath, data: Value },
    /// Deep merge; creates the document when missing.
    Merge { path: DocPath, data: Value },
    /// Overwrite one nested field of an existing document.
    Update {
        path: DocPath,
        field: FieldPath,
        value: Value,
    },
    /// Set-union append into an array field.
    ArrayUnion {
        path: DocPath,
        field: FieldPath,
        values: Vec<Value>,
    },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. }
            | WriteOp::Merge { path, .. }
            | WriteOp::Update { path, .. }
            | WriteOp::ArrayUnion { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: DocPath, data: Value) -> Self {
        self.ops.push(WriteOp::Set { path, data });
        self
    }

    pub fn merge(mut self, path: DocPath, data: Value) -> Self {
        self.ops.push(WriteOp::Merge { path, data });
        self
    }

    pub fn update(mut self, path: DocPath, field: FieldPath, value: Value) -> Self {
        self.ops.push(WriteOp::Update { path, field, value });
        self
    }

    pub fn array_union(mut self, path: DocPath, field: FieldPath, values: Vec<Value>) -> Self {
        self.ops.push(WriteOp::ArrayUnion {
            path,
            field,
            values,
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub path: DocPath,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, AppError>;

    /// Applies every op or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), AppError>;

    /// Equality query over one collection, ordered by document path.
    async fn query(
        &self,
        collection: &CollectionPath,
        field: &FieldPath,
        value: &Value,
        limit: Option<usize>,
    ) -> Result<Vec<(DocPath, Value)>, AppError>;

    fn changes(&self) -> broadcast::Receiver<DocumentChange>;
}
