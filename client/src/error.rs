//! Error types for the client layers.
//!
//! Errors never cross a layer boundary as panics: the local store, the remote
//! adapter and the sync engine each log their failures and hand them back as
//! values.

use stride_engine::StoreId;

/// Local store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("uniqueness constraint violated in store {store}")]
    UniqueViolation { store: StoreId },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("engine error: {0}")]
    Engine(#[from] stride_engine::Error),
}

impl StoreError {
    /// Classify a write error, surfacing uniqueness violations.
    pub(crate) fn from_write(store: StoreId, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation { store }
            }
            sqlx::Error::PoolClosed => StoreError::Unavailable("pool closed".into()),
            _ => StoreError::Database(err),
        }
    }
}

/// Errors talking to the remote authority.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("remote rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("operation {0} has no payload to send")]
    MissingPayload(String),

    #[error("invalid remote data: {0}")]
    InvalidData(#[from] stride_engine::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RemoteError {
    /// Whether retrying can never succeed.
    ///
    /// Client errors other than timeouts and rate limiting are permanent, as
    /// are operations that cannot be encoded. Retry counting still applies to
    /// them; the classification is kept with the dead letter.
    pub fn is_permanent(&self) -> bool {
        match self {
            RemoteError::Rejected { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            RemoteError::MissingPayload(_)
            | RemoteError::InvalidData(_)
            | RemoteError::Serialization(_) => true,
            RemoteError::Http(_) | RemoteError::Unreachable(_) => false,
        }
    }
}

/// Errors building a connectivity probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("probe interval must be greater than zero")]
    ZeroInterval,
}

/// Sync engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no principal is bound to the sync engine")]
    NoPrincipal,

    #[error("a sync is already running")]
    AlreadySyncing,

    #[error("remote authority is not reachable")]
    Offline,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] stride_engine::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
