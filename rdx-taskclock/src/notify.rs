//! Best-effort, user-visible notifications (the "toast" channel).
//!
//! Drivers call [`Notifier::notify`] from whatever task they run on. The
//! notifier must hand the message off without blocking; presentation happens
//! on the consumer's own context.

use tokio::sync::mpsc;
use tracing::{info, trace};

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes notifications to the diagnostic log. Used by the daemon.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        info!(target: "toast", "{}", message);
    }
}

/// Forwards notifications to a receiver owned by a UI loop.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str) {
        if self.tx.send(message.to_string()).is_err() {
            trace!("Notification dropped, receiver closed: {}", message);
        }
    }
}
