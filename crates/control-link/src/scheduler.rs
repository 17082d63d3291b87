//! Reconnect timers

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::LinkInput;

/// Identifies one scheduled reconnect; a fired token that is no longer
/// pending is ignored by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

/// Delivers `TimerFired` back to the link after a delay
pub trait Scheduler: Send {
    fn schedule(&mut self, token: TimerToken, delay: Duration);
    fn cancel(&mut self, token: TimerToken);
}

/// Timers backed by tokio sleeps
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<LinkInput>,
    timers: HashMap<TimerToken, AbortHandle>,
}

impl TokioScheduler {
    pub fn new(tx: mpsc::UnboundedSender<LinkInput>) -> Self {
        Self {
            tx,
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        // Drop handles of timers that already fired
        self.timers.retain(|_, handle| !handle.is_finished());

        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LinkInput::TimerFired(token));
        });

        trace!("Timer {:?} armed for {:?}", token, delay);
        self.timers.insert(token, task.abort_handle());
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(handle) = self.timers.remove(&token) {
            trace!("Timer {:?} cancelled", token);
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
