use std::sync::Arc;

use tokio::sync::watch;

/// A session-scoped cancellation token.
///
/// One token is held per client session; tripping it makes every in-flight
/// transport read and scheduler wait return `AirliftError::Cancelled` at
/// its next suspension point. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Trip the token. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send_replace(true);
    }

    /// Non-blocking check, used between stream chunks.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the token trips.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative pause flag for in-flight downloads.
///
/// Stream readers call [`PauseGate::wait_while_paused`] between chunks:
/// while the gate is closed the reader parks; clearing the flag resumes
/// it. Cancellation always wins over pause.
#[derive(Debug, Clone)]
pub struct PauseGate {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn pause(&self) {
        let _ = self.tx.send_replace(true);
    }

    pub fn resume(&self) {
        let _ = self.tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.rx.borrow()
    }

    /// Park until the gate opens or the session is cancelled.
    pub async fn wait_while_paused(&self, cancel: &CancelToken) {
        let mut rx = self.rx.clone();
        while *rx.borrow_and_update() {
            if cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
