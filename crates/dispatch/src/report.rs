//! Aggregation and human-readable reporting.

use serde::Serialize;
use tracing::{info, warn};

use multicron_core::{RunOutcome, TaskResult, group_by_blog_id};

/// Log the run summary and return the grouped failure report.
///
/// Returns an empty string when no task carries an error. Grouping keeps a
/// run over thousands of blogs from producing thousands of near-identical
/// alert lines when one systemic cause hits many of them identically.
pub fn summarize(outcome: &RunOutcome) -> String {
    let all_count = outcome.blog_tasks.len();
    let success_count = all_count - outcome.error_count;

    if success_count > 0 {
        let processed: Vec<&TaskResult> =
            outcome.blog_tasks.iter().filter(|t| t.processed()).collect();
        let processed_ids = processed
            .iter()
            .map(|t| t.blog_id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        info!(
            run_id = %outcome.run_id,
            found = all_count,
            ran = processed.len(),
            duration_seconds = outcome.duration_all_seconds,
            processed = %processed_ids,
            "cron run finished"
        );
    }

    let issues: Vec<&TaskResult> =
        outcome.blog_tasks.iter().filter(|t| t.has_issue()).collect();
    if !issues.is_empty() {
        warn!(
            run_id = %outcome.run_id,
            count = issues.len(),
            issues = %render(&issues),
            "issues surfaced by successful jobs"
        );
    }

    if outcome.error_count == 0 {
        return String::new();
    }

    let errors: Vec<TaskResult> = outcome
        .blog_tasks
        .iter()
        .filter(|t| t.has_error())
        .cloned()
        .collect();
    let groups = group_by_blog_id(&errors);
    format!(
        "{} job(s) failed (or were skipped). {}",
        outcome.error_count,
        render(&groups)
    )
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| format!("<unrenderable: {err}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use multicron_core::{BlogId, RunConfig, RunId};

    fn outcome(tasks: Vec<TaskResult>) -> RunOutcome {
        let mut outcome = RunOutcome::new(
            RunId::new(),
            RunConfig::defaults("admin@network.example"),
            "SELECT * FROM wp_blogs".to_string(),
        );
        outcome.blog_tasks = tasks;
        outcome.finalize(4.2);
        outcome
    }

    fn ok_task(blog_id: u64) -> TaskResult {
        let mut task = TaskResult::new(BlogId(blog_id), false);
        task.response = "Executed 1 event.".to_string();
        task
    }

    fn failed_task(blog_id: u64, error: &str) -> TaskResult {
        let mut task = TaskResult::new(BlogId(blog_id), false);
        task.error = error.to_string();
        task
    }

    #[test]
    fn no_errors_produce_an_empty_report() {
        assert_eq!(summarize(&outcome(vec![ok_task(1), ok_task(2)])), "");
    }

    #[test]
    fn identical_failures_collapse_into_one_group() {
        let report = summarize(&outcome(vec![
            ok_task(1),
            failed_task(2, "db unreachable"),
            failed_task(3, "db unreachable"),
        ]));
        assert!(report.starts_with("2 job(s) failed (or were skipped)."));
        assert!(report.contains("db unreachable"));
        // One group carrying both ids, not two repeated records.
        assert_eq!(report.matches("db unreachable").count(), 1);
        assert!(report.contains("\"blog_ids\": ["));
    }

    #[test]
    fn issues_do_not_count_as_errors() {
        let mut task = ok_task(4);
        task.issue = "PHP Deprecated: ...".to_string();
        let report = summarize(&outcome(vec![task]));
        assert_eq!(report, "");
    }
}
