use thiserror::Error as ThisError;

/// Errors shared by every library crate in the workspace.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("controller {0} already running")]
    AlreadyRunning(String),
    #[error("timed out waiting for caches to sync")]
    CacheSyncTimeout,
    #[error("handler #{index} ({name}) failed: {source}")]
    Stage {
        index: usize,
        name: String,
        #[source]
        source: Box<Error>,
    },
    #[error("malformed manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("no {namespace} registered under `{name}`")]
    NotRegistered { namespace: &'static str, name: String },
    #[error("source: {0}")]
    Source(String),
    #[error("config: {0}")]
    Config(String),
    #[error("diff: {0}")]
    Diff(String),
}

pub type Result<T> = std::result::Result<T, Error>;
