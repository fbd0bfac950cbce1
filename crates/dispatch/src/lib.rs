//! Multisite cron dispatch: selection, per-tenant execution, and reporting.
//!
//! The pipeline runs in one pass per invocation: [`run::CronRun`] resolves
//! the config, selects the blogs through a [`selector::TenantDirectory`],
//! drives each one through the [`dispatcher::Dispatcher`], then hands the
//! [`multicron_core::RunOutcome`] to the reporter, the file logger, and the
//! notifier. Tenant failures stay inside their task record; only selection
//! and configuration problems abort a run.

pub mod dispatcher;
pub mod file_log;
pub mod gateway;
pub mod notify;
pub mod report;
pub mod run;
pub mod runner;
pub mod selector;

pub use dispatcher::{BudgetPolicy, DefaultPolicies, Dispatcher, PreExecutionPolicy};
pub use file_log::maybe_log_to_file;
pub use gateway::{ContextGuard, GatewayError, SiteGateway, WpCliGateway};
pub use notify::{ALERT_SUBJECT, Mailer, SendmailMailer, is_valid_email, maybe_send_email};
pub use report::summarize;
pub use run::CronRun;
pub use runner::{CommandExecutor, CommandOutput, ShellExecutor, TenantJobRunner, WpCliRunner};
pub use selector::{
    BlogQuery, DirectoryError, InMemoryDirectory, TenantDirectory, validate_order_by,
};
