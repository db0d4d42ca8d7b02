use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cooperative cancellation shared by all workers.
///
/// Nothing is ever sent on the channel; triggering drops the only sender, so
/// every receiver observes a disconnect. That makes the token usable inside
/// `crossbeam_channel::select!` next to a work queue.
#[derive(Clone, Debug)]
pub struct Shutdown {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    pub fn trigger(&self) {
        match self.trigger.lock() {
            Ok(mut sender) => {
                sender.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for up to `timeout`. Returns `true` if shutdown was triggered.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.signal.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Becomes ready (with an error) once shutdown is triggered.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_seen_by_clones() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        assert!(!clone.is_triggered());
        assert!(!clone.wait(Duration::from_millis(5)));

        shutdown.trigger();
        assert!(clone.is_triggered());
        assert!(clone.wait(Duration::from_secs(10)));
        shutdown.trigger();
    }
}
