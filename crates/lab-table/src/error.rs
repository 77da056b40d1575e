use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("orphaned checkpoints: parent ids not found in experiment set: {}", parents.join(", "))]
    OrphanedCheckpoints { parents: Vec<String> },
    #[error("filter operator not found: {0}")]
    UnknownOperator(String),
    #[error("invalid column path: {0:?}")]
    InvalidPath(String),
}

pub type TableResult<T> = std::result::Result<T, TableError>;
