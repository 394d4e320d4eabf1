//! Connectivity tracking.
//!
//! `NetworkStateMonitor` is the only writer of the online flag. Queue
//! managers read it through [`ConnectivityProvider`], which they receive at
//! construction time.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Read-only view of device connectivity.
pub trait ConnectivityProvider: Send + Sync {
    /// Current online state.
    fn is_online(&self) -> bool;

    /// Receiver that observes every online/offline transition.
    fn subscribe(&self) -> watch::Receiver<bool>;

    /// Token cancelled the next time connectivity drops.
    fn connection_token(&self) -> CancellationToken;
}

type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Tracks the platform's connectivity notifications.
pub struct NetworkStateMonitor {
    state: watch::Sender<bool>,
    epoch: Mutex<CancellationToken>,
    callbacks: Mutex<Vec<ReconnectCallback>>,
}

impl NetworkStateMonitor {
    /// Create a monitor from the platform's initial reading.
    ///
    /// `None` means the platform API is unavailable; the monitor then
    /// assumes offline.
    #[must_use]
    pub fn new(initial: Option<bool>) -> Self {
        let (state, _) = watch::channel(initial.unwrap_or(false));
        Self {
            state,
            epoch: Mutex::new(CancellationToken::new()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback run on every offline to online transition.
    pub fn on_reconnect(&self, callback: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(Arc::new(callback));
        }
    }

    /// Feed one platform connectivity notification.
    pub fn report(&self, online: bool) {
        let was_online = self.state.send_replace(online);
        if was_online == online {
            return;
        }

        if online {
            tracing::info!("connectivity restored");
            let callbacks: Vec<ReconnectCallback> = self
                .callbacks
                .lock()
                .map(|c| c.clone())
                .unwrap_or_default();
            for callback in callbacks {
                callback();
            }
        } else {
            tracing::info!("connectivity lost");
            if let Ok(mut epoch) = self.epoch.lock() {
                epoch.cancel();
                *epoch = CancellationToken::new();
            }
        }
    }

    /// The platform stopped answering; treat as offline.
    pub fn report_unavailable(&self) {
        tracing::warn!("connectivity provider unavailable, assuming offline");
        self.report(false);
    }
}

impl Default for NetworkStateMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ConnectivityProvider for NetworkStateMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    fn connection_token(&self) -> CancellationToken {
        self.epoch
            .lock()
            .map(|epoch| epoch.clone())
            .unwrap_or_else(|_| {
                let token = CancellationToken::new();
                token.cancel();
                token
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unavailable_platform_is_offline() {
        let monitor = NetworkStateMonitor::new(None);
        assert!(!monitor.is_online());
    }

    #[test]
    fn test_reconnect_callback_runs_on_transition_only() {
        let monitor = NetworkStateMonitor::new(Some(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        monitor.on_reconnect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.report(true);
        monitor.report(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        monitor.report(false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        monitor.report(true);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(monitor.is_online());
    }

    #[test]
    fn test_token_cancelled_on_disconnect() {
        let monitor = NetworkStateMonitor::new(Some(true));
        let token = monitor.connection_token();
        assert!(!token.is_cancelled());

        monitor.report(false);
        assert!(token.is_cancelled());

        // The next epoch starts with a fresh token
        monitor.report(true);
        assert!(!monitor.connection_token().is_cancelled());
    }

    #[test]
    fn test_report_unavailable_goes_offline() {
        let monitor = NetworkStateMonitor::new(Some(true));
        monitor.report_unavailable();
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_subscriber_sees_transition() {
        let monitor = NetworkStateMonitor::new(Some(false));
        let mut rx = monitor.subscribe();

        monitor.report(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
