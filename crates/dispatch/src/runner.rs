//! External command execution and outcome classification.

use tracing::debug;

use multicron_core::{RunConfig, TaskResult};

/// Captured output of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam over external process execution, so tests can substitute fakes.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<T> {
    fn execute(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        (**self).execute(program, args)
    }
}

/// Runs commands synchronously through `std::process::Command`, capturing
/// exit code, stdout and stderr. No dispatcher-side timeout: the budget
/// check only prevents starting new tenants, it cannot interrupt a command
/// already in flight.
#[derive(Debug, Default)]
pub struct ShellExecutor;

impl CommandExecutor for ShellExecutor {
    fn execute(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = std::process::Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Per-tenant job execution seam.
///
/// The dispatcher is constructed against this trait, never a concrete type.
/// The default method makes a missing provider visible in the task record
/// instead of panicking.
pub trait TenantJobRunner: Send + Sync {
    fn run_tenant_job(&self, mut result: TaskResult, _config: &RunConfig) -> TaskResult {
        let site = result.site_url.clone().unwrap_or_default();
        result.cmd = Some("no command".to_string());
        result.error = format!("no job provider for {site}, implement run_tenant_job");
        result
    }
}

impl<T: TenantJobRunner + ?Sized> TenantJobRunner for std::sync::Arc<T> {
    fn run_tenant_job(&self, result: TaskResult, config: &RunConfig) -> TaskResult {
        (**self).run_tenant_job(result, config)
    }
}

/// Executes the due cron events of one site through WP-CLI.
pub struct WpCliRunner {
    wp_bin: String,
    wp_path: Option<String>,
    executor: Box<dyn CommandExecutor>,
}

impl WpCliRunner {
    pub fn new(wp_bin: &str, wp_path: Option<String>, executor: Box<dyn CommandExecutor>) -> Self {
        Self {
            wp_bin: wp_bin.to_string(),
            wp_path,
            executor,
        }
    }

    fn build_args(&self, site_url: &str, config: &RunConfig) -> Vec<String> {
        let mut args = vec![
            "cron".to_string(),
            "event".to_string(),
            "run".to_string(),
            format!("--url={site_url}"),
            "--due-now".to_string(),
        ];
        // Skip flags are derived only from options explicitly set true.
        if config.skip_all_plugins {
            args.push("--skip-plugins".to_string());
        }
        if config.skip_all_themes {
            args.push("--skip-themes".to_string());
        }
        if config.max_seconds > 0 {
            // Embedded sub-limit: the external process must not outrun the
            // run budget on its own either.
            args.push(format!("--exec=set_time_limit( {} );", config.max_seconds));
        }
        if let Some(path) = &self.wp_path {
            args.push(format!("--path={path}"));
        }
        args
    }
}

impl TenantJobRunner for WpCliRunner {
    fn run_tenant_job(&self, mut result: TaskResult, config: &RunConfig) -> TaskResult {
        let Some(site_url) = result.site_url.clone() else {
            result.error = "cannot run a job without a resolved site url".to_string();
            return result;
        };

        let args = self.build_args(&site_url, config);
        let cmd = format!("{} {}", self.wp_bin, args.join(" "));
        debug!(cmd = %cmd, "running cron command");
        result.cmd = Some(cmd);

        match self.executor.execute(&self.wp_bin, &args) {
            Ok(output) => {
                let success = output.success();
                result.response = output.stdout;
                if success {
                    // Exit 0 with stderr content is an anomaly (deprecation
                    // notices and the like), not a failure.
                    result.issue = output.stderr;
                } else if output.stderr.is_empty() {
                    result.error = format!("command exited with status {}", output.exit_code);
                } else {
                    result.error = output.stderr;
                }
            }
            Err(err) => {
                result.error = format!("failed to spawn `{}`: {err}", self.wp_bin);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multicron_core::BlogId;
    use std::sync::Mutex;

    struct FakeExecutor {
        output: CommandOutput,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeExecutor {
        fn new(exit_code: i32, stdout: &str, stderr: &str) -> Self {
            Self {
                output: CommandOutput {
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandExecutor for FakeExecutor {
        fn execute(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));
            Ok(self.output.clone())
        }
    }

    fn ready_task() -> TaskResult {
        let mut task = TaskResult::new(BlogId(7), false);
        task.site_url = Some("https://network.example/seven".to_string());
        task.job_names = vec!["wp_update_plugins".to_string()];
        task
    }

    fn config() -> RunConfig {
        RunConfig::defaults("admin@network.example")
    }

    #[test]
    fn success_with_stderr_is_an_issue_not_an_error() {
        let runner = WpCliRunner::new(
            "wp",
            None,
            Box::new(FakeExecutor::new(0, "Executed 2 events.", "PHP Deprecated: ...")),
        );
        let result = runner.run_tenant_job(ready_task(), &config());
        assert_eq!(result.response, "Executed 2 events.");
        assert_eq!(result.issue, "PHP Deprecated: ...");
        assert!(!result.has_error());
    }

    #[test]
    fn failure_classifies_stderr_as_error() {
        let runner = WpCliRunner::new(
            "wp",
            None,
            Box::new(FakeExecutor::new(1, "partial", "db unreachable")),
        );
        let result = runner.run_tenant_job(ready_task(), &config());
        assert_eq!(result.response, "partial");
        assert_eq!(result.error, "db unreachable");
        assert!(!result.has_issue());
    }

    #[test]
    fn silent_failure_still_reports_the_exit_status() {
        let runner = WpCliRunner::new("wp", None, Box::new(FakeExecutor::new(3, "", "")));
        let result = runner.run_tenant_job(ready_task(), &config());
        assert_eq!(result.error, "command exited with status 3");
    }

    #[test]
    fn command_line_reflects_config_flags() {
        let executor = std::sync::Arc::new(FakeExecutor::new(0, "", ""));
        let runner = WpCliRunner::new(
            "wp",
            Some("/var/www/html".to_string()),
            Box::new(executor.clone()),
        );

        let mut config = config();
        config.skip_all_plugins = true;
        config.max_seconds = 50;
        let result = runner.run_tenant_job(ready_task(), &config);

        let cmd = result.cmd.unwrap();
        assert!(cmd.starts_with("wp cron event run --url=https://network.example/seven --due-now"));
        assert!(cmd.contains("--skip-plugins"));
        assert!(!cmd.contains("--skip-themes"));
        assert!(cmd.contains("--exec=set_time_limit( 50 );"));
        assert!(cmd.contains("--path=/var/www/html"));

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "wp");
    }

    #[test]
    fn no_sub_limit_without_a_budget() {
        let runner = WpCliRunner::new("wp", None, Box::new(FakeExecutor::new(0, "", "")));
        let result = runner.run_tenant_job(ready_task(), &config());
        assert!(!result.cmd.unwrap().contains("set_time_limit"));
    }

    #[test]
    fn default_runner_reports_missing_provider() {
        struct NullRunner;
        impl TenantJobRunner for NullRunner {}

        let result = NullRunner.run_tenant_job(ready_task(), &config());
        assert_eq!(result.cmd.as_deref(), Some("no command"));
        assert!(result.error.contains("implement run_tenant_job"));
    }

    #[test]
    fn spawn_failure_is_captured_in_the_record() {
        struct BrokenExecutor;
        impl CommandExecutor for BrokenExecutor {
            fn execute(&self, _: &str, _: &[String]) -> std::io::Result<CommandOutput> {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no wp"))
            }
        }

        let runner = WpCliRunner::new("wp", None, Box::new(BrokenExecutor));
        let result = runner.run_tenant_job(ready_task(), &config());
        assert!(result.error.contains("failed to spawn `wp`"));
    }
}
