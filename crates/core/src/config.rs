//! Run configuration: the fixed option table and the override resolver.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// Default sort: recently-updated blogs first, they are the ones people are
/// actually working in.
pub const DEFAULT_ORDER_BY: &str = "last_updated DESC, blog_id ASC";

/// Default size cap of the error log file (20 MiB).
pub const DEFAULT_LOG_MAX_SIZE: u64 = 20 * 1024 * 1024;

/// Default inter-tenant delay in seconds.
pub const DEFAULT_SLEEP_BETWEEN: f64 = 0.02;

/// Immutable configuration for one run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Force-include the root blog and sort it first.
    pub always_add_root_blog: bool,
    /// Verbose output; run-level errors include their raw detail.
    pub debug: bool,
    /// Alert recipient. Defaults to the network admin address, resolved once
    /// at startup from the directory.
    pub email_to: String,
    /// Run cron for archived blogs too.
    pub include_archived: bool,
    /// Only blogs updated within the last N months. None = no recency filter.
    pub limit_last_updated_months: Option<u32>,
    /// Cap the selected blog count. None = no limit.
    pub limit: Option<u64>,
    /// Append a JSON record per erroring run to this file. None = disabled.
    pub log_errors_to_file: Option<PathBuf>,
    /// Refuse to append once the log file reaches this many bytes.
    pub log_max_size: u64,
    /// Global wall-clock budget in seconds. 0 = unbounded.
    pub max_seconds: u64,
    /// Sort spec for the blog query, whitelist-validated before use.
    pub order_by: String,
    /// Treat blogs reached past the budget as errors, not just skips.
    pub overtime_is_error: bool,
    /// Gate for the error email.
    pub send_error_email: bool,
    /// Pass `--skip-plugins` to the per-tenant command.
    pub skip_all_plugins: bool,
    /// Pass `--skip-themes` to the per-tenant command.
    pub skip_all_themes: bool,
    /// Seconds to sleep between blogs, as backpressure on shared storage.
    pub sleep_between: f64,
}

impl RunConfig {
    /// The documented default table. `admin_email` is the directory's network
    /// admin address, the one global lookup allowed before the run starts.
    pub fn defaults(admin_email: &str) -> Self {
        Self {
            always_add_root_blog: true,
            debug: false,
            email_to: admin_email.to_string(),
            include_archived: false,
            limit_last_updated_months: None,
            limit: None,
            log_errors_to_file: None,
            log_max_size: DEFAULT_LOG_MAX_SIZE,
            max_seconds: 0,
            order_by: DEFAULT_ORDER_BY.to_string(),
            overtime_is_error: false,
            send_error_email: true,
            skip_all_plugins: false,
            skip_all_themes: false,
            sleep_between: DEFAULT_SLEEP_BETWEEN,
        }
    }

    /// Merge `key=value` overrides onto the defaults.
    ///
    /// Any key outside the fixed table is a hard stop before any tenant is
    /// touched. `limit` and `limit_last_updated_months` ignore non-numeric
    /// values (stay unset); malformed values for the other typed options are
    /// rejected.
    pub fn resolve(overrides: &[(String, String)], admin_email: &str) -> Result<Self, RunError> {
        let mut config = Self::defaults(admin_email);
        let mut unknown: Vec<String> = Vec::new();

        for (key, value) in overrides {
            match key.as_str() {
                "always_add_root_blog" => config.always_add_root_blog = parse_bool(key, value)?,
                "debug" => config.debug = parse_bool(key, value)?,
                "email_to" => config.email_to = value.clone(),
                "include_archived" => config.include_archived = parse_bool(key, value)?,
                "limit_last_updated_months" => {
                    config.limit_last_updated_months = value.parse().ok();
                }
                "limit" => config.limit = value.parse().ok(),
                "log_errors_to_file" => config.log_errors_to_file = parse_log_path(value),
                "log_max_size" => config.log_max_size = parse_number(key, value)?,
                "max_seconds" => config.max_seconds = parse_number(key, value)?,
                "order_by" => config.order_by = value.clone(),
                "overtime_is_error" => config.overtime_is_error = parse_bool(key, value)?,
                "send_error_email" => config.send_error_email = parse_bool(key, value)?,
                "skip_all_plugins" => config.skip_all_plugins = parse_bool(key, value)?,
                "skip_all_themes" => config.skip_all_themes = parse_bool(key, value)?,
                "sleep_between" => config.sleep_between = parse_seconds(key, value)?,
                _ => unknown.push(key.clone()),
            }
        }

        if !unknown.is_empty() {
            return Err(RunError::invalid_argument(unknown));
        }
        Ok(config)
    }

    /// Whether file logging is enabled at all.
    pub fn file_logging_enabled(&self) -> bool {
        self.log_errors_to_file.is_some()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, RunError> {
    // A bare CLI flag arrives as the empty string.
    match value.to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(RunError::InvalidArgument(format!(
            "invalid value for `{key}`: `{other}`"
        ))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, RunError> {
    value.parse().map_err(|_| {
        RunError::InvalidArgument(format!("invalid value for `{key}`: `{value}`"))
    })
}

fn parse_seconds(key: &str, value: &str) -> Result<f64, RunError> {
    let parsed: f64 = value.parse().map_err(|_| {
        RunError::InvalidArgument(format!("invalid value for `{key}`: `{value}`"))
    })?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(RunError::InvalidArgument(format!(
            "invalid value for `{key}`: `{value}`"
        )));
    }
    Ok(parsed)
}

fn parse_log_path(value: &str) -> Option<PathBuf> {
    match value {
        "" | "false" | "0" => None,
        path => Some(PathBuf::from(path)),
    }
}
