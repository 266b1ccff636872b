use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A required top-level member is absent. Snapshots are rejected whole;
    /// nothing is materialized from a partial document.
    #[error("snapshot missing required section '{0}'")]
    MissingSection(&'static str),

    #[error("snapshot root must be a JSON object")]
    NotAnObject,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
