//! Blog selection: order-by validation, query construction, and the
//! directory seam.

use chrono::{Duration, Utc};

use multicron_core::{BlogId, RunConfig, RunError, TenantDescriptor};

/// Columns of the blog directory (plus the two direction keywords) that an
/// `order_by` override may reference. The order-by string is composed
/// directly into the query text, so rejecting unknown tokens is the sole
/// injection defense.
const ORDER_BY_WHITELIST: &[&str] = &[
    "asc",
    "desc",
    "blog_id",
    "site_id",
    "domain",
    "path",
    "registered",
    "last_updated",
    "public",
    "archived",
    "mature",
    "spam",
    "deleted",
    "lang_id",
];

/// Validate every comma/whitespace-separated token case-insensitively
/// against the whitelist. Offending tokens are reported in encounter order.
pub fn validate_order_by(order_by: &str) -> Result<(), RunError> {
    let invalid: Vec<String> = order_by
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
        .filter(|token| !ORDER_BY_WHITELIST.contains(&token.as_str()))
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(RunError::invalid_order_by(invalid))
    }
}

/// A validated, ordered, limited query over the blog directory.
///
/// Carries both the structured filters (for in-memory implementations) and
/// the exact SQL text (for the MySQL directory, and for diagnostics — the
/// text is logged and persisted with the run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogQuery {
    pub sql: String,
    pub include_archived: bool,
    pub last_updated_months: Option<u32>,
    pub limit: Option<u64>,
    pub root_first: bool,
    pub order_by: String,
}

impl BlogQuery {
    /// Build the query from a resolved config. Fails on an unwhitelisted
    /// `order_by` token before any text is composed.
    pub fn build(config: &RunConfig, blogs_table: &str) -> Result<Self, RunError> {
        validate_order_by(&config.order_by)?;

        let mut wheres: Vec<String> = Vec::new();
        if !config.include_archived {
            wheres.push("AND archived=0".to_string());
        }
        if let Some(months) = config.limit_last_updated_months {
            wheres.push(format!(
                "AND last_updated > (now() - interval {months} month)"
            ));
        }

        let mut order_by = config.order_by.clone();
        if config.always_add_root_blog {
            // Union the root blog in regardless of the filters above, and
            // prepend a synthetic sort key so it always comes first.
            wheres.push("OR blog_id=1".to_string());
            order_by = format!("CASE blog_id WHEN 1 THEN 1 ELSE 0 END DESC, {order_by}");
        }

        let maybe_limit = config
            .limit
            .map(|limit| format!("limit {limit}"))
            .unwrap_or_default();
        let where_clause = wheres.join(" ");

        let sql = format!(
            "SELECT * FROM {blogs_table} WHERE deleted=0 AND ( 1=1 {where_clause} ) \
             ORDER BY {order_by} {maybe_limit}"
        );
        let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");

        Ok(Self {
            sql,
            include_archived: config.include_archived,
            last_updated_months: config.limit_last_updated_months,
            limit: config.limit,
            root_first: config.always_add_root_blog,
            order_by: config.order_by.clone(),
        })
    }
}

/// Blog directory abstraction (the relational store behind the network).
pub trait TenantDirectory: Send + Sync {
    /// Whether the installation is a multisite network at all.
    fn is_multisite(&self) -> Result<bool, DirectoryError>;

    /// Network admin address, used as the default alert recipient.
    fn admin_email(&self) -> Result<String, DirectoryError>;

    /// Name of the blogs table the query text is composed against.
    fn blogs_table(&self) -> String {
        "wp_blogs".to_string()
    }

    /// Execute a blog query, returning rows in query order.
    fn fetch(&self, query: &BlogQuery) -> Result<Vec<TenantDescriptor>, DirectoryError>;
}

impl<T: TenantDirectory + ?Sized> TenantDirectory for std::sync::Arc<T> {
    fn is_multisite(&self) -> Result<bool, DirectoryError> {
        (**self).is_multisite()
    }

    fn admin_email(&self) -> Result<String, DirectoryError> {
        (**self).admin_email()
    }

    fn blogs_table(&self) -> String {
        (**self).blogs_table()
    }

    fn fetch(&self, query: &BlogQuery) -> Result<Vec<TenantDescriptor>, DirectoryError> {
        (**self).fetch(query)
    }
}

/// Directory access failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory query failed: {0}")]
    Query(String),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// In-memory directory for tests/dev.
///
/// Interprets the structured side of [`BlogQuery`]. Ordering honors the
/// root-first key and the default recency sort; arbitrary `order_by` strings
/// are only meaningful to the SQL-backed directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    rows: Vec<TenantDescriptor>,
    admin_email: String,
    multisite: bool,
}

impl InMemoryDirectory {
    pub fn new(admin_email: &str) -> Self {
        Self {
            rows: Vec::new(),
            admin_email: admin_email.to_string(),
            multisite: true,
        }
    }

    pub fn single_site(admin_email: &str) -> Self {
        Self {
            multisite: false,
            ..Self::new(admin_email)
        }
    }

    pub fn with_row(mut self, row: TenantDescriptor) -> Self {
        self.rows.push(row);
        self
    }
}

impl TenantDirectory for InMemoryDirectory {
    fn is_multisite(&self) -> Result<bool, DirectoryError> {
        Ok(self.multisite)
    }

    fn admin_email(&self) -> Result<String, DirectoryError> {
        Ok(self.admin_email.clone())
    }

    fn fetch(&self, query: &BlogQuery) -> Result<Vec<TenantDescriptor>, DirectoryError> {
        let cutoff = query
            .last_updated_months
            .map(|months| Utc::now() - Duration::days(30 * i64::from(months)));

        let mut selected: Vec<TenantDescriptor> = self
            .rows
            .iter()
            .filter(|row| !row.deleted)
            .filter(|row| {
                let archived_ok = query.include_archived || !row.archived;
                let recent_ok = match cutoff {
                    Some(cutoff) => row.last_updated.is_some_and(|at| at > cutoff),
                    None => true,
                };
                // The root blog is unioned in past the filters.
                (archived_ok && recent_ok) || (query.root_first && row.blog_id.is_root())
            })
            .cloned()
            .collect();

        selected.sort_by(|a, b| {
            let root_key = |row: &TenantDescriptor| {
                if query.root_first && row.blog_id.is_root() { 0 } else { 1 }
            };
            root_key(a)
                .cmp(&root_key(b))
                .then(b.last_updated.cmp(&a.last_updated))
                .then(a.blog_id.cmp(&b.blog_id))
        });

        if let Some(limit) = query.limit {
            selected.truncate(limit as usize);
        }
        Ok(selected)
    }
}

/// Blogs selected by an in-memory fetch, as plain ids (test helper).
pub fn selected_ids(rows: &[TenantDescriptor]) -> Vec<BlogId> {
    rows.iter().map(|row| row.blog_id).collect()
}
