use std::io;
use thiserror::Error;

/// Exit code for a clean run: no unresolved drift, no failed checks.
pub const EXIT_OK: i32 = 0;
/// Exit code when drift remains unresolved or at least one gate check failed.
pub const EXIT_DRIFT: i32 = 1;
/// Exit code for configuration or runtime errors: the run could not form an
/// opinion and must be retried or investigated.
pub const EXIT_CONFIG: i32 = 2;

#[derive(Error, Debug)]
pub enum DriftgateError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("qdrant transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("qdrant scroll failed: HTTP {status}: {body}")]
    QdrantStatus { status: u16, body: String },
    #[error("malformed qdrant response: {0}")]
    Decode(String),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriftgateError {
    /// Every variant aborts the run that raised it; a threshold being
    /// exceeded is reported through the check results, never through errors.
    pub fn exit_code(&self) -> i32 {
        EXIT_CONFIG
    }
}
