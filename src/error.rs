use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Everything that can go wrong between the source feed and the store.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or invalid environment. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Source feed empty or unreachable.
    #[error("acquisition failed for {feed}: {message}")]
    Acquisition { feed: String, message: String },

    /// Record set could not be coerced into the target schema.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Store unreachable or credentials rejected.
    #[error("store connection failed: {0}")]
    SinkConnection(String),

    /// The store answered, but refused the request.
    #[error("store rejected request: {0}")]
    Store(String),

    /// A single batch was rejected by the store.
    #[error("batch {batch} rejected by store: {message}")]
    BatchUpsert { batch: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn acquisition(feed: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Acquisition { feed: feed.into(), message: msg.into() }
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::SinkConnection(msg.into())
    }
}
