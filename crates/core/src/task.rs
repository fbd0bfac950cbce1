//! Per-tenant task records, the run aggregate, and error grouping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::config::RunConfig;
use crate::id::{BlogId, RunId};

/// Marker written into `error` when a tenant was reached past the budget.
pub const OVER_TIME_MARKER: &str = "over_time";

/// One record per tenant processed, finalized exactly once by the dispatcher.
///
/// `response`, `issue` and `error` always exist (possibly empty); in normal
/// flow at most one of `issue`/`error` is populated. Empty fields are omitted
/// from serialization so the log record stays compact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub blog_id: BlogId,
    pub over_time: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub job_names: Vec<String>,
    /// Resolved lazily, only once the tenant turns out to have ready work.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub site_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cmd: Option<String>,
    /// Stdout of the executed command, recorded regardless of outcome.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub response: String,
    /// Non-fatal anomaly: the command succeeded but emitted diagnostics.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub issue: String,
    /// Hard failure. A non-empty value counts towards `error_count`.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_seconds: Option<f64>,
}

impl TaskResult {
    pub fn new(blog_id: BlogId, over_time: bool) -> Self {
        Self {
            blog_id,
            over_time,
            job_names: Vec::new(),
            site_url: None,
            cmd: None,
            response: String::new(),
            issue: String::new(),
            error: String::new(),
            duration_seconds: None,
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn has_issue(&self) -> bool {
        !self.issue.is_empty()
    }

    /// Tasks with a response are the ones that actually ran something.
    pub fn processed(&self) -> bool {
        !self.response.is_empty()
    }

    /// Promote the over-budget flag to a hard error when configured, unless
    /// the task already carries one.
    pub fn apply_overtime_error(&mut self, config: &RunConfig) {
        if config.overtime_is_error && self.over_time && self.error.is_empty() {
            self.error = OVER_TIME_MARKER.to_string();
        }
    }

    /// Grouping key: the serialized record minus tenant identity and timing.
    ///
    /// Timing is excluded on purpose: two tenants hit by the same systemic
    /// cause fail identically apart from their durations.
    fn group_key(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("blog_id");
            map.remove("duration_seconds");
        }
        value.to_string()
    }
}

/// A deduplicated failure record: one representative task standing in for
/// every blog that failed identically. Display/log compaction only.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorGroup {
    pub blog_ids: Vec<BlogId>,
    pub task: TaskResult,
}

impl Serialize for ErrorGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut value =
            serde_json::to_value(&self.task).map_err(serde::ser::Error::custom)?;
        if let Value::Object(map) = &mut value {
            map.remove("blog_id");
            map.remove("duration_seconds");
            let ids = serde_json::to_value(&self.blog_ids).map_err(serde::ser::Error::custom)?;
            map.insert("blog_ids".to_string(), ids);
        }
        value.serialize(serializer)
    }
}

/// Partition tasks into groups of structurally-identical records.
///
/// Every input blog id lands in exactly one group; group order follows first
/// encounter, id order within a group follows input order.
pub fn group_by_blog_id(tasks: &[TaskResult]) -> Vec<ErrorGroup> {
    let mut groups: Vec<ErrorGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for task in tasks {
        let key = task.group_key();
        match index.get(&key) {
            Some(&at) => groups[at].blog_ids.push(task.blog_id),
            None => {
                index.insert(key, groups.len());
                groups.push(ErrorGroup {
                    blog_ids: vec![task.blog_id],
                    task: task.clone(),
                });
            }
        }
    }
    groups
}

/// Terminal artifact of one run, consumed by the reporter/logger/notifier.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Correlation only; the persisted log record shape does not include it.
    #[serde(skip)]
    pub run_id: RunId,
    pub args: RunConfig,
    pub query_all_blogs: String,
    pub error_count: usize,
    pub duration_all_seconds: f64,
    pub blog_tasks: Vec<TaskResult>,
}

impl RunOutcome {
    pub fn new(run_id: RunId, args: RunConfig, query_all_blogs: String) -> Self {
        Self {
            run_id,
            args,
            query_all_blogs,
            error_count: 0,
            duration_all_seconds: 0.0,
            blog_tasks: Vec::new(),
        }
    }

    /// Fix the aggregate counters once dispatch has finished.
    pub fn finalize(&mut self, duration_seconds: f64) {
        self.duration_all_seconds = duration_seconds;
        self.error_count = self.blog_tasks.iter().filter(|t| t.has_error()).count();
    }
}

/// Round to the 2-decimal precision used in reports and the log record.
pub fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(overtime_is_error: bool) -> RunConfig {
        let mut config = RunConfig::defaults("admin@network.example");
        config.overtime_is_error = overtime_is_error;
        config
    }

    fn failed(blog_id: u64, error: &str) -> TaskResult {
        let mut task = TaskResult::new(BlogId(blog_id), false);
        task.error = error.to_string();
        task
    }

    #[test]
    fn overtime_promotion_requires_flag_and_overtime() {
        let mut task = TaskResult::new(BlogId(5), true);
        task.apply_overtime_error(&config(false));
        assert!(!task.has_error());

        task.apply_overtime_error(&config(true));
        assert_eq!(task.error, OVER_TIME_MARKER);

        let mut in_budget = TaskResult::new(BlogId(6), false);
        in_budget.apply_overtime_error(&config(true));
        assert!(!in_budget.has_error());
    }

    #[test]
    fn overtime_promotion_keeps_existing_error() {
        let mut task = failed(5, "db unreachable");
        task.over_time = true;
        task.apply_overtime_error(&config(true));
        assert_eq!(task.error, "db unreachable");
    }

    #[test]
    fn processed_requires_a_response() {
        let mut task = TaskResult::new(BlogId(2), false);
        assert!(!task.processed());
        task.response = "Executed 3 events.".to_string();
        assert!(task.processed());
    }

    #[test]
    fn identical_failures_group_despite_duration() {
        let mut two = failed(2, "db unreachable");
        two.duration_seconds = Some(0.41);
        let mut three = failed(3, "db unreachable");
        three.duration_seconds = Some(1.07);

        let groups = group_by_blog_id(&[two, three]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].blog_ids, vec![BlogId(2), BlogId(3)]);
    }

    #[test]
    fn different_errors_split_groups() {
        let groups = group_by_blog_id(&[
            failed(2, "db unreachable"),
            failed(3, "curl timeout"),
            failed(4, "db unreachable"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].blog_ids, vec![BlogId(2), BlogId(4)]);
        assert_eq!(groups[1].blog_ids, vec![BlogId(3)]);
    }

    #[test]
    fn group_serialization_replaces_blog_id_with_blog_ids() {
        let groups = group_by_blog_id(&[failed(2, "boom"), failed(3, "boom")]);
        let value = serde_json::to_value(&groups).unwrap();
        let group = &value[0];
        assert!(group.get("blog_id").is_none());
        assert_eq!(group["blog_ids"], serde_json::json!([2, 3]));
        assert_eq!(group["error"], "boom");
    }

    #[test]
    fn finalize_counts_non_empty_errors() {
        let mut outcome = RunOutcome::new(
            RunId::new(),
            config(false),
            "SELECT 1".to_string(),
        );
        outcome.blog_tasks = vec![
            TaskResult::new(BlogId(1), false),
            failed(2, "boom"),
            failed(3, "boom"),
        ];
        outcome.finalize(1.234_5);
        assert_eq!(outcome.error_count, 2);
        assert!((outcome.duration_all_seconds - 1.234_5).abs() < f64::EPSILON);
    }

    #[test]
    fn round_seconds_keeps_two_decimals() {
        assert_eq!(round_seconds(1.234_9), 1.23);
        assert_eq!(round_seconds(0.019_9), 0.02);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: grouping is a partition — the group sizes sum to the
        /// input size and the union of the groups' ids is the input multiset.
        #[test]
        fn grouping_is_a_partition(
            specs in prop::collection::vec((1u64..200, 0usize..4, any::<bool>()), 1..60)
        ) {
            let errors = ["db unreachable", "over_time", "exit 1", "curl timeout"];
            let tasks: Vec<TaskResult> = specs
                .iter()
                .map(|(blog_id, which, over_time)| {
                    let mut task = TaskResult::new(BlogId(*blog_id), *over_time);
                    task.error = errors[*which].to_string();
                    task
                })
                .collect();

            let groups = group_by_blog_id(&tasks);

            let total: usize = groups.iter().map(|g| g.blog_ids.len()).sum();
            prop_assert_eq!(total, tasks.len());

            let mut grouped_ids: Vec<u64> = groups
                .iter()
                .flat_map(|g| g.blog_ids.iter().map(|b| b.0))
                .collect();
            grouped_ids.sort_unstable();
            let mut input_ids: Vec<u64> = specs.iter().map(|(blog_id, _, _)| *blog_id).collect();
            input_ids.sort_unstable();
            prop_assert_eq!(grouped_ids, input_ids);

            // No two groups share a representative record.
            for (i, a) in groups.iter().enumerate() {
                for b in groups.iter().skip(i + 1) {
                    prop_assert!(
                        a.task.error != b.task.error || a.task.over_time != b.task.over_time
                    );
                }
            }
        }
    }
}
