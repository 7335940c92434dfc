//! Notification delivery: native desktop popups when a helper is installed,
//! otherwise a line on stdout.

use anyhow::{Context, Result, bail};
use murmur_core::Notifier;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::warn;

pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        println!("🔔 {title} | {body}");
        Ok(())
    }
}

enum Helper {
    Osascript(PathBuf),
    NotifySend(PathBuf),
}

pub struct DesktopNotifier {
    helper: Helper,
}

impl DesktopNotifier {
    /// `None` when neither osascript nor notify-send is on PATH.
    pub fn detect() -> Option<Self> {
        if let Ok(p) = which::which("osascript") {
            return Some(Self {
                helper: Helper::Osascript(p),
            });
        }
        which::which("notify-send").ok().map(|p| Self {
            helper: Helper::NotifySend(p),
        })
    }

    fn command(&self, title: &str, body: &str) -> (PathBuf, Vec<String>) {
        match &self.helper {
            Helper::Osascript(bin) => (
                bin.clone(),
                vec![
                    "-e".to_string(),
                    format!(
                        "display notification {} with title {}",
                        applescript_quote(body),
                        applescript_quote(title)
                    ),
                ],
            ),
            Helper::NotifySend(bin) => (
                bin.clone(),
                vec![
                    "--app-name".to_string(),
                    "murmur".to_string(),
                    title.to_string(),
                    body.to_string(),
                ],
            ),
        }
    }
}

fn applescript_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Notifier for DesktopNotifier {
    /// Inside a runtime the helper runs as a tokio child process and is not
    /// waited on here; its failures are logged.
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        let (bin, args) = self.command(title, body);
        // Keep a trace in the terminal running the loop.
        println!("🔔 {title} | {body}");

        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn(async move {
                let status = tokio::process::Command::new(&bin)
                    .args(&args)
                    .stdin(Stdio::null())
                    .status()
                    .await;
                match status {
                    Ok(s) if s.success() => {}
                    Ok(s) => warn!(helper = %bin.display(), status = %s, "notification helper failed"),
                    Err(e) => warn!(helper = %bin.display(), error = %e, "running notification helper"),
                }
            });
            return Ok(());
        }

        let status = Command::new(&bin)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("running {}", bin.display()))?;
        if !status.success() {
            bail!("notification helper failed: {status}");
        }
        Ok(())
    }
}

/// Pick by config name; "desktop" falls back to stdout when no helper exists.
pub fn from_name(name: &str) -> Arc<dyn Notifier> {
    match name {
        "stdout" => Arc::new(StdoutNotifier),
        _ => match DesktopNotifier::detect() {
            Some(d) => Arc::new(d),
            None => {
                tracing::debug!("no desktop notification helper found, using stdout");
                Arc::new(StdoutNotifier)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify_send(path: &str) -> DesktopNotifier {
        DesktopNotifier {
            helper: Helper::NotifySend(PathBuf::from(path)),
        }
    }

    #[test]
    fn quotes_are_escaped_for_applescript() {
        assert_eq!(applescript_quote(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(applescript_quote(r"a\b"), r#""a\\b""#);
    }

    #[test]
    fn notify_send_gets_title_and_body_as_args() {
        let (bin, args) =
            notify_send("/usr/bin/notify-send").command("Reminder: call mom", "Due Thu Mar 5 20:00");
        assert_eq!(bin, PathBuf::from("/usr/bin/notify-send"));
        assert_eq!(
            args,
            ["--app-name", "murmur", "Reminder: call mom", "Due Thu Mar 5 20:00"]
        );
    }

    #[test]
    fn osascript_gets_one_quoted_script() {
        let n = DesktopNotifier {
            helper: Helper::Osascript(PathBuf::from("/usr/bin/osascript")),
        };
        let (_, args) = n.command(r#"Lunch "Sarah""#, "Starts 12:00");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], "-e");
        assert_eq!(
            args[1],
            r##"display notification "Starts 12:00" with title "Lunch \"Sarah\"""##
        );
    }

    #[tokio::test]
    async fn helper_runs_off_the_calling_task() {
        // Spawn errors surface in the log, not in the timer that fired.
        assert!(notify_send("/nonexistent/notify-send").notify("t", "b").is_ok());
    }

    #[test]
    fn missing_helper_fails_without_runtime() {
        assert!(notify_send("/nonexistent/notify-send").notify("t", "b").is_err());
    }
}
