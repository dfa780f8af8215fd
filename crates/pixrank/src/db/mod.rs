pub mod schema;
pub mod sql;

pub use schema::Schema;
pub use sql::SqlImageStore;

use crate::services::ImageRecord;
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("image path already stored: {0}")]
    Duplicate(String),

    #[error("no stored image with path {0}")]
    RowMissing(String),

    #[error("malformed row for {path}: {reason}")]
    MalformedRow { path: String, reason: String },

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Storage for image records.
///
/// Every write runs in its own transaction: it either commits or leaves the
/// table untouched.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    /// Create the table if it does not exist
    async fn init(&self) -> Result<(), StoreError>;

    /// All stored records, ordered by path
    async fn list(&self) -> Result<Vec<ImageRecord>, StoreError>;

    /// Number of stored records
    async fn count(&self) -> Result<u64, StoreError>;

    /// Insert one row per path in a single transaction.
    ///
    /// A duplicate path aborts the whole batch and nothing is committed.
    async fn insert_paths(&self, paths: &[String]) -> Result<usize, StoreError>;

    /// Overwrite the feature string of one row
    async fn set_feature(&self, path: &str, feature: &str) -> Result<(), StoreError>;

    /// Set the capture date of one row
    async fn set_captured_at(&self, path: &str, date: NaiveDate) -> Result<(), StoreError>;
}
