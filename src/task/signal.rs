//! Cooperative cancellation signal.

use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;

/// Shared, idempotent, irreversible cancel flag.
///
/// Clones observe the same flag. A signal is never un-set; "clearing" means
/// handing out a fresh one.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that is cancelled whenever `self` is, but can also be
    /// cancelled on its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is set.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Checkpoint for adapters: bail out with a cancellation fault if set.
    pub fn ensure_not_cancelled(&self, detail: impl Into<String>) -> Result<(), AdapterError> {
        if self.is_cancelled() {
            return Err(AdapterError::Cancelled {
                detail: detail.into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
        // idempotent
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn child_follows_parent_only() {
        let parent = CancelSignal::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn checkpoint_reports_detail() {
        let signal = CancelSignal::new();
        assert!(signal.ensure_not_cancelled("before a.docx").is_ok());
        signal.cancel();
        match signal.ensure_not_cancelled("before b.docx") {
            Err(AdapterError::Cancelled { detail }) => assert_eq!(detail, "before b.docx"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        signal.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
