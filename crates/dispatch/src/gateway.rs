//! Tenant-context activation and ready-work discovery.

use serde_json::Value;
use tracing::trace;

use multicron_core::{BlogId, TenantDescriptor};

use crate::runner::CommandExecutor;

/// Per-site collaborator: context switching and due-job discovery.
///
/// Activation is the analogue of switching into tenant N's context.
/// Implementations holding per-site state should suspend new-object caching
/// while active; thousands of activations per run must not grow memory.
pub trait SiteGateway: Send + Sync {
    fn activate(&self, blog: &TenantDescriptor);

    fn deactivate(&self, blog_id: BlogId);

    /// Names of the cron jobs currently due for this site, deduplicated,
    /// in discovery order.
    fn ready_job_names(&self, blog: &TenantDescriptor) -> Result<Vec<String>, GatewayError>;
}

impl<T: SiteGateway + ?Sized> SiteGateway for std::sync::Arc<T> {
    fn activate(&self, blog: &TenantDescriptor) {
        (**self).activate(blog)
    }

    fn deactivate(&self, blog_id: BlogId) {
        (**self).deactivate(blog_id)
    }

    fn ready_job_names(&self, blog: &TenantDescriptor) -> Result<Vec<String>, GatewayError> {
        (**self).ready_job_names(blog)
    }
}

/// Scoped context activation: deactivation is guaranteed on every exit path
/// of the per-tenant iteration, including early returns.
pub struct ContextGuard<'a> {
    gateway: &'a dyn SiteGateway,
    blog_id: BlogId,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.gateway.deactivate(self.blog_id);
    }
}

/// Activate `blog` on `gateway`, returning the guard that releases it.
pub fn activate<'a>(gateway: &'a dyn SiteGateway, blog: &TenantDescriptor) -> ContextGuard<'a> {
    gateway.activate(blog);
    ContextGuard {
        gateway,
        blog_id: blog.blog_id,
    }
}

/// Gateway failure. Captured as the affected tenant's error, never as a
/// run-level exception.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("job discovery failed: {0}")]
    Discovery(String),
}

/// Discovers due cron events through WP-CLI.
pub struct WpCliGateway {
    wp_bin: String,
    wp_path: Option<String>,
    executor: Box<dyn CommandExecutor>,
}

impl WpCliGateway {
    pub fn new(wp_bin: &str, wp_path: Option<String>, executor: Box<dyn CommandExecutor>) -> Self {
        Self {
            wp_bin: wp_bin.to_string(),
            wp_path,
            executor,
        }
    }
}

impl SiteGateway for WpCliGateway {
    fn activate(&self, blog: &TenantDescriptor) {
        trace!(blog_id = %blog.blog_id, "entering site context");
    }

    fn deactivate(&self, blog_id: BlogId) {
        trace!(blog_id = %blog_id, "leaving site context");
    }

    fn ready_job_names(&self, blog: &TenantDescriptor) -> Result<Vec<String>, GatewayError> {
        let mut args = vec![
            "cron".to_string(),
            "event".to_string(),
            "list".to_string(),
            "--due-now".to_string(),
            "--fields=hook".to_string(),
            "--format=json".to_string(),
            format!("--url={}", blog.site_url()),
        ];
        if let Some(path) = &self.wp_path {
            args.push(format!("--path={path}"));
        }

        let output = self
            .executor
            .execute(&self.wp_bin, &args)
            .map_err(|err| GatewayError::Discovery(err.to_string()))?;
        if !output.success() {
            return Err(GatewayError::Discovery(format!(
                "`{} cron event list` exited with status {}: {}",
                self.wp_bin,
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let rows: Vec<Value> = serde_json::from_str(output.stdout.trim())
            .map_err(|err| GatewayError::Discovery(format!("unparsable event list: {err}")))?;

        let mut names: Vec<String> = Vec::new();
        for row in rows {
            if let Some(hook) = row.get("hook").and_then(Value::as_str) {
                if !names.iter().any(|name| name == hook) {
                    names.push(hook.to_string());
                }
            }
        }
        Ok(names)
    }
}
