//! `multicron-core` — domain foundation for the multisite cron runner.
//!
//! Pure domain types: run configuration, identifiers, tenant directory rows,
//! per-tenant task records and error grouping. No infrastructure concerns.

pub mod config;
pub mod error;
pub mod id;
pub mod task;
pub mod tenant;

pub use config::RunConfig;
pub use error::RunError;
pub use id::{BlogId, RunId};
pub use task::{ErrorGroup, OVER_TIME_MARKER, RunOutcome, TaskResult, group_by_blog_id, round_seconds};
pub use tenant::TenantDescriptor;
