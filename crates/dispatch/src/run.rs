//! The top-level run: resolve, select, dispatch, report, log, notify.

use std::time::Instant;

use chrono::Local;
use tracing::{error, info, warn};

use multicron_core::{RunConfig, RunError, RunId, RunOutcome, round_seconds};

use crate::dispatcher::Dispatcher;
use crate::file_log::maybe_log_to_file;
use crate::notify::{Mailer, maybe_send_email};
use crate::report::summarize;
use crate::selector::{BlogQuery, TenantDirectory};

/// One scheduled invocation over the whole network.
///
/// Owns the wiring: the blog directory, the per-tenant dispatcher, and the
/// alert transport. Everything past config resolution is fail-soft, so a
/// single run always produces its report even when individual stages break.
pub struct CronRun {
    directory: Box<dyn TenantDirectory>,
    dispatcher: Dispatcher,
    mailer: Box<dyn Mailer>,
}

impl CronRun {
    pub fn new(
        directory: Box<dyn TenantDirectory>,
        dispatcher: Dispatcher,
        mailer: Box<dyn Mailer>,
    ) -> Self {
        Self {
            directory,
            dispatcher,
            mailer,
        }
    }

    /// Execute one run with the given key/value overrides.
    ///
    /// Returns `true` only when the run completed with zero errors. All
    /// error paths are reported through logging, the error file, and the
    /// alert email rather than bubbling out.
    pub fn execute(&self, overrides: &[(String, String)]) -> bool {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let admin_email = match self.directory.admin_email() {
            Ok(address) => address,
            Err(err) => {
                warn!(error = %err, "admin email lookup failed, alerting may be disabled");
                String::new()
            }
        };

        // A config the operator cannot trust is the one failure that stops
        // everything, including alerting.
        let config = match RunConfig::resolve(overrides, &admin_email) {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, "config resolution failed, aborting run");
                return false;
            }
        };

        let mut messages: Vec<String> = Vec::new();
        match self.trigger_all_blogs(&config) {
            Ok(outcome) => {
                let report = summarize(&outcome);
                if !report.is_empty() {
                    messages.push(report);
                }
                if let Err(err) = maybe_log_to_file(&config, &outcome, &timestamp) {
                    messages.push(render_error(&config, &err));
                }
            }
            Err(err) => messages.push(render_error(&config, &err)),
        }

        if !messages.is_empty() {
            error!(errors = %messages.join("\n"), "cron run reported errors");
        }
        maybe_send_email(Some(&config), &messages, &timestamp, self.mailer.as_ref());

        messages.is_empty()
    }

    /// Select the blogs and dispatch each in order, producing the outcome.
    fn trigger_all_blogs(&self, config: &RunConfig) -> Result<RunOutcome, RunError> {
        match self.directory.is_multisite() {
            Ok(true) => {}
            Ok(false) => return Err(RunError::NotMultisite),
            Err(err) => return Err(RunError::QueryFailed(err.to_string())),
        }

        let started_at = Instant::now();
        let run_id = RunId::new();
        let query = BlogQuery::build(config, &self.directory.blogs_table())?;
        info!(run_id = %run_id, query = %query.sql, "selecting blogs");

        let blogs = self
            .directory
            .fetch(&query)
            .map_err(|err| RunError::QueryFailed(err.to_string()))?;
        if blogs.is_empty() {
            return Err(RunError::EmptyResult);
        }

        let mut outcome = RunOutcome::new(run_id, config.clone(), query.sql);
        outcome.blog_tasks = self.dispatcher.dispatch_all(config, &blogs, started_at);
        outcome.finalize(round_seconds(started_at.elapsed().as_secs_f64()));
        Ok(outcome)
    }
}

/// Run-level errors render with full structure under `debug`, operator-facing
/// text otherwise.
fn render_error(config: &RunConfig, err: &RunError) -> String {
    if config.debug {
        format!("{err:?}")
    } else {
        err.to_string()
    }
}
