use super::{ImageStore, Schema, StoreError};
use crate::services::ImageRecord;
use chrono::NaiveDate;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tokio::sync::RwLock;

const DATE_FORMAT: &str = "%Y-%m-%d";
const MAX_CONNECTIONS: u32 = 4;

struct ImageRow {
    path: String,
    feature: Option<String>,
    captured_at: Option<String>,
}

/// Read a text column that the driver may report as a blob.
///
/// MySQL `TEXT` columns reach the `Any` driver as `Blob`, SQLite ones as `Text`.
fn text_column(row: &AnyRow, column: &str) -> Result<Option<String>, sqlx::Error> {
    match row.try_get::<Option<String>, _>(column) {
        Err(sqlx::Error::ColumnDecode { .. }) => {
            let bytes: Option<Vec<u8>> = row.try_get(column)?;
            bytes
                .map(String::from_utf8)
                .transpose()
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: column.to_string(),
                    source: Box::new(e),
                })
        },
        other => other,
    }
}

impl<'r> sqlx::FromRow<'r, AnyRow> for ImageRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            path: text_column(row, "path")?.ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "path".to_string(),
                source: "image path is NULL".into(),
            })?,
            feature: text_column(row, "feature")?,
            captured_at: text_column(row, "captured_at")?,
        })
    }
}

impl TryFrom<ImageRow> for ImageRecord {
    type Error = StoreError;

    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        let captured_at = match row.captured_at.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                // MySQL may render a DATE cast with a trailing time part
                let day = raw.get(..10).unwrap_or(raw);
                Some(NaiveDate::parse_from_str(day, DATE_FORMAT).map_err(|e| {
                    StoreError::MalformedRow {
                        path: row.path.clone(),
                        reason: format!("invalid date '{}': {}", raw, e),
                    }
                })?)
            },
        };

        Ok(ImageRecord {
            path: row.path,
            feature: row.feature,
            captured_at,
        })
    }
}

/// SQL implementation over the sqlx `Any` driver (MySQL or SQLite URLs)
pub struct SqlImageStore {
    url: String,
    schema: Schema,
    pool: RwLock<Option<AnyPool>>,
}

impl SqlImageStore {
    /// Connect to the database at `url` and make sure the table exists
    pub async fn connect(url: &str, schema: Schema) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        let pool = Self::open_pool(url).await?;
        let store = Self {
            url: url.to_string(),
            schema,
            pool: RwLock::new(Some(pool)),
        };
        store.init().await?;
        Ok(store)
    }

    /// Close every pooled connection. The next operation reopens the pool.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.read().await.as_ref() {
            pool.close().await;
        }
    }

    async fn open_pool(url: &str) -> Result<AnyPool, StoreError> {
        AnyPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .test_before_acquire(true)
            .connect(url)
            .await
            .map_err(StoreError::Connection)
    }

    /// Get a live pool, reopening it if it has been closed
    async fn get_pool(&self) -> Result<AnyPool, StoreError> {
        let current = self.pool.read().await;
        if let Some(pool) = current.as_ref().filter(|p| !p.is_closed()) {
            return Ok(pool.clone());
        }
        drop(current);

        let mut slot = self.pool.write().await;
        if let Some(pool) = slot.as_ref().filter(|p| !p.is_closed()) {
            return Ok(pool.clone());
        }

        tracing::warn!("Database session is no longer active, reopening");
        let pool = Self::open_pool(&self.url).await?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Run a single-row UPDATE in its own transaction.
    ///
    /// Commits when the row exists, rolls back otherwise.
    async fn update_row(&self, sql: &str, value: &str, path: &str) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        let mut tx = pool.begin().await?;

        let result = sqlx::query(sql)
            .bind(value)
            .bind(path)
            .execute(&mut *tx)
            .await;

        let affected = match result {
            Ok(done) => done.rows_affected(),
            Err(e) => {
                tx.rollback().await?;
                return Err(e.into());
            },
        };

        // MySQL reports zero affected rows when the value did not change
        if affected == 0 {
            let exists_sql = format!(
                "SELECT COUNT(*) AS count FROM {} WHERE {} = ?",
                self.schema.table, self.schema.path_column
            );
            let count: i64 = sqlx::query(&exists_sql)
                .bind(path)
                .fetch_one(&mut *tx)
                .await?
                .try_get("count")?;
            if count == 0 {
                tx.rollback().await?;
                return Err(StoreError::RowMissing(path.to_string()));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err.as_database_error() {
        Some(db_err) => {
            let message = db_err.message();
            db_err.is_unique_violation()
                || message.contains("UNIQUE constraint failed")
                || message.contains("Duplicate entry")
        },
        None => false,
    }
}

#[async_trait::async_trait]
impl ImageStore for SqlImageStore {
    async fn init(&self) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        sqlx::query(&self.schema.create_table_sql())
            .execute(&pool)
            .await?;
        tracing::debug!("Ensured table '{}' exists", self.schema.table);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let pool = self.get_pool().await?;
        let rows: Vec<ImageRow> = sqlx::query_as(&self.schema.select_all_sql())
            .fetch_all(&pool)
            .await?;
        rows.into_iter().map(ImageRecord::try_from).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let pool = self.get_pool().await?;
        let count: i64 = sqlx::query(&self.schema.count_sql())
            .fetch_one(&pool)
            .await?
            .try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn insert_paths(&self, paths: &[String]) -> Result<usize, StoreError> {
        let pool = self.get_pool().await?;
        let sql = self.schema.insert_sql();
        let mut tx = pool.begin().await?;

        for path in paths {
            if let Err(e) = sqlx::query(&sql).bind(path.as_str()).execute(&mut *tx).await {
                tx.rollback().await?;
                if is_unique_violation(&e) {
                    return Err(StoreError::Duplicate(path.clone()));
                }
                return Err(e.into());
            }
        }

        tx.commit().await?;
        tracing::info!("Inserted {} images", paths.len());
        Ok(paths.len())
    }

    async fn set_feature(&self, path: &str, feature: &str) -> Result<(), StoreError> {
        self.update_row(&self.schema.update_feature_sql(), feature, path)
            .await?;
        tracing::debug!("Updated feature for {}", path);
        Ok(())
    }

    async fn set_captured_at(&self, path: &str, date: NaiveDate) -> Result<(), StoreError> {
        let value = date.format(DATE_FORMAT).to_string();
        self.update_row(&self.schema.update_date_sql(), &value, path)
            .await?;
        tracing::debug!("Updated capture date for {}", path);
        Ok(())
    }
}
