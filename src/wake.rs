use std::sync::atomic::{AtomicU64, Ordering};

use log::{info, warn};
use tokio::sync::futures::Notified;
use tokio::sync::{Notify, mpsc};

/// Broadcast pulse with no memory: `trigger` releases whoever is waiting
/// right now, and a waiter that arrives later blocks until the next pulse.
#[derive(Debug, Default)]
pub struct WakeSignal {
    notify: Notify,
    pulses: AtomicU64,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    /// Register interest before checking state to avoid missing a pulse.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    pub async fn wait(&self) {
        self.notify.notified().await
    }

    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::Relaxed)
    }
}

/// Why an out-of-band refresh was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshReason {
    Signal(i32),
    External(String),
}

/// Sending half used by out-of-band sources (OS signals, block notify
/// hooks) to ask the poll loop for an immediate refresh.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    send: mpsc::UnboundedSender<RefreshReason>,
}

pub type RefreshReceiver = mpsc::UnboundedReceiver<RefreshReason>;

impl RefreshTrigger {
    pub fn new() -> (Self, RefreshReceiver) {
        let (send, recv) = mpsc::unbounded_channel();
        (Self { send }, recv)
    }

    pub fn request(&self, reason: RefreshReason) -> bool {
        self.send.send(reason).is_ok()
    }
}

/// Forward every delivery of OS signal `signum` into `trigger`.
#[cfg(unix)]
pub async fn listen_for_signal(signum: i32, trigger: RefreshTrigger) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut stream = match signal(SignalKind::from_raw(signum)) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Unable to listen on signal {}: {}", signum, e);
            return;
        }
    };
    info!("Listening for push block notifs on signal {}", signum);

    while stream.recv().await.is_some() {
        if !trigger.request(RefreshReason::Signal(signum)) {
            break;
        }
    }
}

#[cfg(not(unix))]
pub async fn listen_for_signal(signum: i32, _trigger: RefreshTrigger) {
    warn!("Signal {} refresh is only supported on unix targets", signum);
}
