//! The budgeted, ordered, fail-isolated dispatch loop.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use multicron_core::{RunConfig, TaskResult, TenantDescriptor, round_seconds};

use crate::gateway::{self, SiteGateway};
use crate::runner::TenantJobRunner;

/// Decides whether a tenant is finalized immediately from the over-time
/// flag, before any tenant-specific state is touched.
pub trait BudgetPolicy: Send + Sync {
    fn early_exit(&self, over_time: bool, _result: &TaskResult, _config: &RunConfig) -> bool {
        over_time
    }
}

/// Last word before the command runs: may veto or rewrite the task based on
/// the full per-tenant state. A task returned with an error, or still over
/// budget, finalizes without executing.
pub trait PreExecutionPolicy: Send + Sync {
    fn before_run(
        &self,
        result: TaskResult,
        _config: &RunConfig,
        _blog: &TenantDescriptor,
    ) -> TaskResult {
        result
    }
}

/// Identity implementations of both policies.
#[derive(Debug, Default)]
pub struct DefaultPolicies;

impl BudgetPolicy for DefaultPolicies {}
impl PreExecutionPolicy for DefaultPolicies {}

/// Drives one tenant at a time, strictly sequentially: all tenants share one
/// storage connection, so concurrency here would race or require per-tenant
/// isolation that does not pay off at this scale.
pub struct Dispatcher {
    gateway: Box<dyn SiteGateway>,
    runner: Box<dyn TenantJobRunner>,
    budget: Box<dyn BudgetPolicy>,
    pre_execution: Box<dyn PreExecutionPolicy>,
}

impl Dispatcher {
    pub fn new(gateway: Box<dyn SiteGateway>, runner: Box<dyn TenantJobRunner>) -> Self {
        Self {
            gateway,
            runner,
            budget: Box::new(DefaultPolicies),
            pre_execution: Box::new(DefaultPolicies),
        }
    }

    pub fn with_budget_policy(mut self, policy: Box<dyn BudgetPolicy>) -> Self {
        self.budget = policy;
        self
    }

    pub fn with_pre_execution_policy(mut self, policy: Box<dyn PreExecutionPolicy>) -> Self {
        self.pre_execution = policy;
        self
    }

    /// Iterate `blogs` in order, finalizing exactly one task per blog.
    ///
    /// Never aborts on a single tenant's failure. The budget check only
    /// prevents starting new tenants once the deadline has passed; a command
    /// already in flight runs to completion, so total run time can exceed
    /// the budget by one tenant's worst case.
    pub fn dispatch_all(
        &self,
        config: &RunConfig,
        blogs: &[TenantDescriptor],
        started_at: Instant,
    ) -> Vec<TaskResult> {
        blogs
            .iter()
            .map(|blog| self.dispatch_one(config, blog, started_at))
            .collect()
    }

    fn dispatch_one(
        &self,
        config: &RunConfig,
        blog: &TenantDescriptor,
        started_at: Instant,
    ) -> TaskResult {
        let elapsed = started_at.elapsed().as_secs_f64();
        let over_time = config.max_seconds > 0 && elapsed > config.max_seconds as f64;
        let mut result = TaskResult::new(blog.blog_id, over_time);

        if self.budget.early_exit(over_time, &result, config) {
            result.apply_overtime_error(config);
            return result;
        }

        let blog_started = Instant::now();
        // Released on every exit path below, including the early returns.
        let _context = gateway::activate(self.gateway.as_ref(), blog);

        result.job_names = match self.gateway.ready_job_names(blog) {
            Ok(names) => names,
            Err(err) => {
                result.error = err.to_string();
                return result;
            }
        };
        if result.job_names.is_empty() {
            // The common case: a healthy site with nothing due.
            return result;
        }

        result.site_url = Some(blog.site_url());
        result.apply_overtime_error(config);
        result = self.pre_execution.before_run(result, config, blog);
        if result.has_error() || result.over_time {
            return result;
        }

        result = self.runner.run_tenant_job(result, config);

        if config.sleep_between > 0.0 {
            // Backpressure on the shared storage tier, not scheduling.
            thread::sleep(Duration::from_secs_f64(config.sleep_between));
        }

        result.duration_seconds = Some(round_seconds(blog_started.elapsed().as_secs_f64()));
        debug!(
            blog_id = %result.blog_id,
            site_url = result.site_url.as_deref().unwrap_or(""),
            duration_seconds = result.duration_seconds,
            "blog finished"
        );
        result
    }
}
