//! Tenant directory rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::BlogId;

/// One row of the blog directory. Fetched once per run, read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantDescriptor {
    pub blog_id: BlogId,
    pub site_id: u64,
    pub domain: String,
    pub path: String,
    pub registered: Option<DateTime<Utc>>,
    /// Nullable: freshly-registered blogs may carry a zero date upstream.
    pub last_updated: Option<DateTime<Utc>>,
    pub public: bool,
    pub archived: bool,
    pub mature: bool,
    pub spam: bool,
    pub deleted: bool,
    pub lang_id: i64,
}

impl TenantDescriptor {
    pub fn new(blog_id: impl Into<BlogId>, domain: &str, path: &str) -> Self {
        Self {
            blog_id: blog_id.into(),
            site_id: 1,
            domain: domain.to_string(),
            path: path.to_string(),
            registered: None,
            last_updated: None,
            public: true,
            archived: false,
            mature: false,
            spam: false,
            deleted: false,
            lang_id: 0,
        }
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// Canonical URL of the site, without a trailing slash.
    pub fn site_url(&self) -> String {
        let mut url = format!("https://{}{}", self.domain, self.path);
        while url.ends_with('/') {
            url.pop();
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_url_trims_trailing_slash() {
        let root = TenantDescriptor::new(1, "network.example", "/");
        assert_eq!(root.site_url(), "https://network.example");

        let sub = TenantDescriptor::new(7, "network.example", "/seven/");
        assert_eq!(sub.site_url(), "https://network.example/seven");
    }
}
