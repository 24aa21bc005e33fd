use std::sync::Arc;

use tokio::sync::watch;

/// Requests a cooperative stop. Can be triggered by any module (CLI signal
/// handler, run-duration timer, status API) and observed by any number of
/// [`AbortSignal`]s.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<Option<String>>>,
}

/// Receiving side of an [`AbortHandle`]. Checked by long-running loops at
/// their suspension points.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<Option<String>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// First reason wins; later calls are ignored.
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            log::info!("Abort requested: {}", reason);
            *current = Some(reason);
            true
        });
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves once an abort has been requested. Never resolves if every
    /// handle is dropped without aborting.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|reason| reason.is_some()).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
