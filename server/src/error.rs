use thiserror::Error;

/// Errors returned by the link store and its token generator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The generator has handed out every token it can encode.
    #[error("full capacity: expecting an index below {max_entries}, got {index}")]
    CapacityExhausted { index: u64, max_entries: u64 },

    /// A freshly minted token is already taken. Only reachable with a broken
    /// generator configuration or a tampered snapshot.
    #[error("token collision on '{0}'")]
    TokenCollision(String),

    #[error("no link stored for token '{0}'")]
    NotFound(String),

    #[error("unsupported generator version: {0}")]
    VersionMismatch(String),

    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
