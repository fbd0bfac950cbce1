//! Outbound alerting: address validation and the gated error email.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::Context;
use tracing::{error, info};

use multicron_core::RunConfig;

/// Fixed subject of the alert email.
pub const ALERT_SUBJECT: &str = "Multisite cron errors";

/// Mail transport seam.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

impl<T: Mailer + ?Sized> Mailer for std::sync::Arc<T> {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        (**self).send(to, subject, body)
    }
}

/// Minimal structural address check, standing in for a full RFC parse.
pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.contains(char::is_whitespace)
}

/// Send the error alert when configured, the address validates, and there is
/// something to report.
///
/// Every failure here is logged and swallowed: alerting must never take the
/// run down with it. `config` is `None` when resolution itself failed, in
/// which case there is no trustworthy recipient and nothing is sent.
pub fn maybe_send_email(
    config: Option<&RunConfig>,
    error_messages: &[String],
    log_timestamp: &str,
    mailer: &dyn Mailer,
) {
    let Some(config) = config else {
        return;
    };
    if !config.send_error_email {
        return;
    }
    if !is_valid_email(&config.email_to) {
        error!(email_to = %config.email_to, "invalid alert recipient, not sending");
        return;
    }
    if error_messages.is_empty() {
        return;
    }

    info!(email_to = %config.email_to, "sending error email");
    let body = render_body(config, error_messages, log_timestamp);
    if let Err(err) = mailer.send(&config.email_to, ALERT_SUBJECT, &body) {
        error!(error = %err, "sending the error email failed");
    }
}

/// Joined error text, the full resolved config for operator diagnosis, and a
/// pointer into the log file when file logging is on.
fn render_body(config: &RunConfig, error_messages: &[String], log_timestamp: &str) -> String {
    let mut body = error_messages.join("\n");
    body.push_str("\n\n");
    body.push_str(
        &serde_json::to_string_pretty(config)
            .unwrap_or_else(|err| format!("<unrenderable config: {err}>")),
    );
    if let Some(path) = &config.log_errors_to_file {
        let offset = chrono::Local::now().offset().to_string();
        body.push_str(&format!(
            "\n\nCheck log file '{}' with timestamp '{log_timestamp}' {offset}.",
            path.display()
        ));
    }
    body
}

/// Pipes the assembled message to the local sendmail binary.
pub struct SendmailMailer {
    sendmail_bin: String,
}

impl SendmailMailer {
    pub fn new() -> Self {
        Self {
            sendmail_bin: "/usr/sbin/sendmail".to_string(),
        }
    }

    pub fn with_bin(sendmail_bin: &str) -> Self {
        Self {
            sendmail_bin: sendmail_bin.to_string(),
        }
    }
}

impl Default for SendmailMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailer for SendmailMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let mut child = Command::new(&self.sendmail_bin)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", self.sendmail_bin))?;

        let message = format!("To: {to}\r\nSubject: {subject}\r\n\r\n{body}\r\n");
        child
            .stdin
            .take()
            .context("sendmail stdin unavailable")?
            .write_all(message.as_bytes())
            .context("writing to sendmail")?;

        let output = child.wait_with_output().context("waiting for sendmail")?;
        if !output.status.success() {
            anyhow::bail!(
                "sendmail exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn config() -> RunConfig {
        RunConfig::defaults("admin@network.example")
    }

    fn errors() -> Vec<String> {
        vec!["2 job(s) failed (or were skipped).".to_string()]
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_email("admin@network.example"));
        assert!(is_valid_email("a.b+c@sub.domain.example"));
        assert!(!is_valid_email("not-an-address"));
        assert!(!is_valid_email("@domain.example"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.example"));
        assert!(!is_valid_email("user name@domain.example"));
        assert!(!is_valid_email("a@b@c.example"));
    }

    #[test]
    fn zero_errors_send_nothing() {
        let mailer = Arc::new(RecordingMailer::default());
        maybe_send_email(Some(&config()), &[], "ts", &mailer);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn disabled_alerting_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::default());
        let mut config = config();
        config.send_error_email = false;
        maybe_send_email(Some(&config), &errors(), "ts", &mailer);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_recipient_is_swallowed() {
        let mailer = Arc::new(RecordingMailer::default());
        let mut config = config();
        config.email_to = "not-an-address".to_string();
        maybe_send_email(Some(&config), &errors(), "ts", &mailer);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_config_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::default());
        maybe_send_email(None, &errors(), "ts", &mailer);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn alert_carries_errors_config_and_log_pointer() {
        let mailer = Arc::new(RecordingMailer::default());
        let mut config = config();
        config.log_errors_to_file = Some(PathBuf::from("/var/log/multicron.log"));

        maybe_send_email(Some(&config), &errors(), "2026-08-25 04:00:00", &mailer);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (to, subject, body) = &sent[0];
        assert_eq!(to, "admin@network.example");
        assert_eq!(subject, ALERT_SUBJECT);
        assert!(body.contains("2 job(s) failed"));
        assert!(body.contains("\"order_by\""));
        assert!(body.contains("Check log file '/var/log/multicron.log'"));
        assert!(body.contains("2026-08-25 04:00:00"));
    }

    #[test]
    fn no_log_pointer_without_file_logging() {
        let mailer = Arc::new(RecordingMailer::default());
        maybe_send_email(Some(&config()), &errors(), "ts", &mailer);
        let sent = mailer.sent.lock().unwrap();
        assert!(!sent[0].2.contains("Check log file"));
    }
}
