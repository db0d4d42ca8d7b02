use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::io;
use std::process::{Command, Stdio};
use std::thread;

/// Alerts waiting for the desktop worker; further alerts are dropped.
pub const DEFAULT_ALERT_BACKLOG: usize = 32;

/// Best-effort alert channel for high-severity events.
pub trait Notifier: Send {
    fn notify(&self, title: &str, body: &str);
}

#[derive(Debug)]
struct Alert {
    title: String,
    body: String,
}

/// Raises critical desktop notifications through `notify-send`.
///
/// Alerts are handed to a single worker thread that runs one command at a
/// time. When the backlog is full, new alerts are dropped.
#[derive(Debug)]
pub struct DesktopNotifier {
    queue: Sender<Alert>,
}

impl DesktopNotifier {
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be started.
    pub fn new() -> io::Result<Self> {
        Self::with_command(
            vec![
                "notify-send".to_string(),
                "-u".to_string(),
                "critical".to_string(),
            ],
            DEFAULT_ALERT_BACKLOG,
        )
    }

    /// Runs `command` followed by the title and body for every alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be started.
    pub fn with_command(command: Vec<String>, backlog: usize) -> io::Result<Self> {
        let (queue, alerts) = crossbeam_channel::bounded(backlog);
        thread::Builder::new()
            .name("notifier".to_string())
            .spawn(move || deliver(&command, &alerts))?;
        Ok(Self { queue })
    }

    /// Queues an alert. Returns `false` if it was dropped.
    pub fn try_notify(&self, title: &str, body: &str) -> bool {
        let alert = Alert {
            title: title.to_string(),
            body: body.to_string(),
        };
        match self.queue.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("alert backlog full; dropping \"{}\"", title);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("notifier worker gone; dropping \"{}\"", title);
                false
            }
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.try_notify(title, body);
    }
}

/// Runs until every `DesktopNotifier` handle is dropped.
fn deliver(command: &[String], alerts: &Receiver<Alert>) {
    let (program, args) = match command.split_first() {
        Some(split) => split,
        None => return,
    };
    for alert in alerts.iter() {
        let status = Command::new(program)
            .args(args)
            .arg(&alert.title)
            .arg(&alert.body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            log::debug!("desktop notification unavailable: {}", e);
        }
    }
}

#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _title: &str, _body: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_backlog_is_dropped() {
        let notifier = DesktopNotifier::with_command(
            vec!["sh".to_string(), "-c".to_string(), "sleep 2".to_string()],
            2,
        )
        .unwrap();
        let accepted = (0..50)
            .filter(|i| notifier.try_notify("kernolog", &format!("disk {} failed", i)))
            .count();
        // the worker holds at most one alert while the backlog fills
        assert!(accepted >= 2, "accepted {}", accepted);
        assert!(accepted <= 3, "accepted {}", accepted);
    }

    #[test]
    fn missing_program_is_swallowed() {
        let notifier =
            DesktopNotifier::with_command(vec!["kernolog-no-such-notifier".to_string()], 4)
                .unwrap();
        for _ in 0..10 {
            notifier.notify("kernolog", "thermal zone 0 critical");
        }
    }

    #[test]
    fn empty_command_drops_alerts() {
        let notifier = DesktopNotifier::with_command(Vec::new(), 1).unwrap();
        let mut dropped = false;
        for _ in 0..200 {
            if !notifier.try_notify("kernolog", "x") {
                dropped = true;
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(dropped);
    }
}
