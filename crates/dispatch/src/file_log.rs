//! Error-triggered append-only file logging with a size circuit breaker.

use std::fs::File;
use std::io::Write;

use serde_json::Value;
use tracing::info;

use multicron_core::{RunConfig, RunError, RunOutcome, group_by_blog_id};

/// Append one JSON record for this run, keyed by its start timestamp.
///
/// No-op without a configured path or when the run had zero errors (logging
/// is error-triggered to bound log growth). Refuses with
/// [`RunError::LogTooLarge`] once the file is at or above the size cap; the
/// operator must intervene, the logger never truncates or rotates.
pub fn maybe_log_to_file(
    config: &RunConfig,
    outcome: &RunOutcome,
    timestamp: &str,
) -> Result<(), RunError> {
    let Some(path) = &config.log_errors_to_file else {
        return Ok(());
    };
    if outcome.error_count == 0 {
        return Ok(());
    }

    info!(path = %path.display(), "logging errors to file");

    let file = File::options().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    if size >= config.log_max_size {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
        return Err(RunError::LogTooLarge { path: resolved });
    }

    let record = render_record(outcome, timestamp)?;

    lock_exclusive(&file)?;
    let written = writeln!(&file, "{record}\n");
    let _ = unlock(&file);
    written?;
    Ok(())
}

/// `{ "<timestamp>": { args, query_all_blogs, error_count,
/// duration_all_seconds, blog_tasks: <grouped> } }` on a single line.
fn render_record(outcome: &RunOutcome, timestamp: &str) -> Result<String, RunError> {
    let to_io_err =
        |err: serde_json::Error| std::io::Error::new(std::io::ErrorKind::InvalidData, err);

    let mut body = serde_json::to_value(outcome).map_err(to_io_err)?;
    if let Value::Object(map) = &mut body {
        // The persisted task list is the deduplicated view.
        let groups = group_by_blog_id(&outcome.blog_tasks);
        map.insert(
            "blog_tasks".to_string(),
            serde_json::to_value(&groups).map_err(to_io_err)?,
        );
    }
    Ok(serde_json::json!({ timestamp: body }).to_string())
}

/// Exclusive advisory lock for the append (blocking).
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd is valid for the lifetime of `file`; flock is a
        // plain POSIX call with no memory arguments.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    #[cfg(not(unix))]
    let _ = file;
    Ok(())
}

fn unlock(file: &File) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: as above.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    #[cfg(not(unix))]
    let _ = file;
    Ok(())
}
