use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate contact: {0}")]
    DuplicateContact(String),

    #[error("stale link: {0}")]
    StaleLink(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("core error: {0}")]
    Core(#[from] idgraph_core::CoreError),
}
