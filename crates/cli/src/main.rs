//! `multicron` binary: run cron across every blog of a multisite network.
//!
//! Wiring comes from the environment (`DATABASE_URL`, `TABLE_PREFIX`,
//! `WP_CLI_BIN`, `WP_PATH`); per-run behavior comes from `key=value`
//! overrides on the command line, mirroring how the run would be configured
//! from a scheduler entry.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use multicron_dispatch::{
    CronRun, Dispatcher, SendmailMailer, ShellExecutor, WpCliGateway, WpCliRunner,
};
use multicron_infra::MySqlDirectory;

#[derive(Parser)]
#[command(name = "multicron", about = "Budgeted cron runner for multisite networks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run cron once over every selected blog.
    Run {
        /// Overrides as `key=value`; a bare `key` means `key=true`.
        #[arg(value_parser = parse_override)]
        overrides: Vec<(String, String)>,
    },
}

/// `key=value` pairs; a bare key is shorthand for enabling a boolean.
fn parse_override(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Ok((raw.to_string(), "true".to_string())),
    }
}

fn build_run() -> anyhow::Result<CronRun> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must point at the network's MySQL database")?;
    let table_prefix = std::env::var("TABLE_PREFIX").unwrap_or_else(|_| "wp_".to_string());
    let wp_bin = std::env::var("WP_CLI_BIN").unwrap_or_else(|_| "wp".to_string());
    let wp_path = std::env::var("WP_PATH").ok();

    let directory = MySqlDirectory::connect(&database_url, &table_prefix)
        .context("connecting to the blog directory")?;
    let gateway = WpCliGateway::new(&wp_bin, wp_path.clone(), Box::new(ShellExecutor));
    let runner = WpCliRunner::new(&wp_bin, wp_path, Box::new(ShellExecutor));
    let dispatcher = Dispatcher::new(Box::new(gateway), Box::new(runner));

    Ok(CronRun::new(
        Box::new(directory),
        dispatcher,
        Box::new(SendmailMailer::new()),
    ))
}

fn main() -> anyhow::Result<()> {
    multicron_observability::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { overrides } => {
            info!(overrides = ?overrides, "starting cron run");
            let run = build_run()?;
            if !run.execute(&overrides) {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_overrides_split_on_the_first_equals() {
        assert_eq!(
            parse_override("order_by=blog_id ASC").unwrap(),
            ("order_by".to_string(), "blog_id ASC".to_string())
        );
        assert_eq!(
            parse_override("log_errors_to_file=/tmp/a=b.log").unwrap(),
            ("log_errors_to_file".to_string(), "/tmp/a=b.log".to_string())
        );
    }

    #[test]
    fn bare_keys_enable_booleans() {
        assert_eq!(
            parse_override("debug").unwrap(),
            ("debug".to_string(), "true".to_string())
        );
    }
}
