//! MySQL-backed blog directory.
//!
//! The runner is a synchronous, single-pass process, so the async pool is
//! driven through a private current-thread runtime rather than exposing
//! async through the [`TenantDirectory`] seam.

use chrono::NaiveDateTime;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use tokio::runtime::Runtime;
use tracing::debug;

use multicron_core::{BlogId, TenantDescriptor};
use multicron_dispatch::selector::{BlogQuery, DirectoryError, TenantDirectory};

/// Blog directory reading the network's MySQL tables directly.
pub struct MySqlDirectory {
    pool: MySqlPool,
    runtime: Runtime,
    table_prefix: String,
}

impl MySqlDirectory {
    /// Connect with the given URL and table prefix (usually `wp_`).
    ///
    /// One connection is enough: every query in a run executes sequentially
    /// on the calling thread.
    pub fn connect(database_url: &str, table_prefix: &str) -> Result<Self, DirectoryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;

        let pool = runtime
            .block_on(
                MySqlPoolOptions::new()
                    .max_connections(1)
                    .connect(database_url),
            )
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        debug!(table_prefix, "connected to the blog directory");

        Ok(Self {
            pool,
            runtime,
            table_prefix: table_prefix.to_string(),
        })
    }

    fn table(&self, name: &str) -> String {
        format!("{}{name}", self.table_prefix)
    }
}

impl TenantDirectory for MySqlDirectory {
    /// A network install carries both the blogs and the sitemeta table;
    /// a single-site install has neither.
    fn is_multisite(&self) -> Result<bool, DirectoryError> {
        let count: i64 = self
            .runtime
            .block_on(
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = database() AND table_name IN (?, ?)",
                )
                .bind(self.table("blogs"))
                .bind(self.table("sitemeta"))
                .fetch_one(&self.pool),
            )
            .map_err(|err| DirectoryError::Query(err.to_string()))?;
        Ok(count == 2)
    }

    fn admin_email(&self) -> Result<String, DirectoryError> {
        let sql = format!(
            "SELECT meta_value FROM {} WHERE site_id = 1 AND meta_key = 'admin_email' LIMIT 1",
            self.table("sitemeta")
        );
        let row: Option<String> = self
            .runtime
            .block_on(sqlx::query_scalar(&sql).fetch_optional(&self.pool))
            .map_err(|err| DirectoryError::Query(err.to_string()))?;
        row.ok_or_else(|| DirectoryError::Query("no admin_email in sitemeta".to_string()))
    }

    fn blogs_table(&self) -> String {
        self.table("blogs")
    }

    fn fetch(&self, query: &BlogQuery) -> Result<Vec<TenantDescriptor>, DirectoryError> {
        let rows = self
            .runtime
            .block_on(sqlx::query(&query.sql).fetch_all(&self.pool))
            .map_err(|err| DirectoryError::Query(err.to_string()))?;
        rows.iter().map(map_row).collect()
    }
}

fn map_row(row: &MySqlRow) -> Result<TenantDescriptor, DirectoryError> {
    let to_query_err = |err: sqlx::Error| DirectoryError::Query(err.to_string());

    let blog_id: i64 = row.try_get("blog_id").map_err(to_query_err)?;
    let site_id: i64 = row.try_get("site_id").map_err(to_query_err)?;
    let lang_id: i32 = row.try_get("lang_id").map_err(to_query_err)?;

    Ok(TenantDescriptor {
        blog_id: BlogId(blog_id as u64),
        site_id: site_id as u64,
        domain: row.try_get("domain").map_err(to_query_err)?,
        path: row.try_get("path").map_err(to_query_err)?,
        registered: datetime(row, "registered"),
        last_updated: datetime(row, "last_updated"),
        public: flag(row, "public")?,
        archived: flag(row, "archived")?,
        mature: flag(row, "mature")?,
        spam: flag(row, "spam")?,
        deleted: flag(row, "deleted")?,
        lang_id: i64::from(lang_id),
    })
}

/// Datetime columns may hold the upstream zero-date sentinel, which does not
/// decode; treat anything unreadable as absent.
fn datetime(row: &MySqlRow, column: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    row.try_get::<Option<NaiveDateTime>, _>(column)
        .ok()
        .flatten()
        .map(|at| at.and_utc())
}

fn flag(row: &MySqlRow, column: &str) -> Result<bool, DirectoryError> {
    let value: i8 = row
        .try_get(column)
        .map_err(|err| DirectoryError::Query(err.to_string()))?;
    Ok(value != 0)
}
