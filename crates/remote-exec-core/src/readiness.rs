//! Single-resolution readiness signal for session creation.

use thiserror::Error;
use tokio::sync::watch;

use crate::SessionIdentity;

/// Observable creation state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    /// Creation has not completed yet.
    Pending,
    /// Creation succeeded; the identity pair is set.
    Ready(SessionIdentity),
    /// Creation failed; the session is permanently unusable.
    Failed(String),
}

/// Reason a waiter did not get an identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("Process creation failed: {0}")]
    Failed(String),
    #[error("Session dropped before creation completed")]
    Abandoned,
}

/// One-shot, result-bearing readiness signal.
///
/// Resolves exactly once, either to an identity or to a failure, so
/// waiters never have to poll a side flag to detect the failure path.
#[derive(Debug)]
pub struct Readiness {
    sender: watch::Sender<ReadyState>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    /// Create an unresolved signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ReadyState::Pending);
        Self { sender }
    }

    /// Resolve the signal.
    ///
    /// Returns `false` (and changes nothing) if it was already resolved.
    pub fn resolve(&self, outcome: Result<SessionIdentity, String>) -> bool {
        self.sender.send_if_modified(|state| {
            if !matches!(state, ReadyState::Pending) {
                return false;
            }
            *state = match outcome {
                Ok(identity) => ReadyState::Ready(identity),
                Err(reason) => ReadyState::Failed(reason),
            };
            true
        })
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> ReadyState {
        self.sender.borrow().clone()
    }

    /// True once creation succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.sender.borrow(), ReadyState::Ready(_))
    }

    /// Identity pair, if creation succeeded.
    #[must_use]
    pub fn identity(&self) -> Option<SessionIdentity> {
        match &*self.sender.borrow() {
            ReadyState::Ready(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    /// Get a waiter that can be moved to another task.
    #[must_use]
    pub fn subscribe(&self) -> ReadyWaiter {
        ReadyWaiter {
            receiver: self.sender.subscribe(),
        }
    }

    /// Wait until the signal resolves.
    ///
    /// # Errors
    /// Returns the creation failure reason.
    pub async fn wait(&self) -> Result<SessionIdentity, ReadinessError> {
        self.subscribe().wait().await
    }
}

/// Detached handle awaiting a [`Readiness`] resolution.
#[derive(Debug, Clone)]
pub struct ReadyWaiter {
    receiver: watch::Receiver<ReadyState>,
}

impl ReadyWaiter {
    /// Wait until the signal resolves.
    ///
    /// # Errors
    /// Returns the creation failure reason, or `Abandoned` if the signal
    /// was dropped while still pending.
    pub async fn wait(mut self) -> Result<SessionIdentity, ReadinessError> {
        let state = self
            .receiver
            .wait_for(|state| !matches!(state, ReadyState::Pending))
            .await
            .map_err(|_| ReadinessError::Abandoned)?
            .clone();

        match state {
            ReadyState::Ready(identity) => Ok(identity),
            ReadyState::Failed(reason) => Err(ReadinessError::Failed(reason)),
            ReadyState::Pending => Err(ReadinessError::Abandoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_waiter_receives_identity() {
        let readiness = Readiness::new();
        let waiter = readiness.subscribe();
        let task = tokio::spawn(waiter.wait());

        assert!(readiness.resolve(Ok(SessionIdentity::new("abc", "zzz"))));

        let identity = task.await.unwrap().unwrap();
        assert_eq!(identity.id(), "abc");
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_waiter_receives_failure() {
        let readiness = Readiness::new();
        let waiter = readiness.subscribe();

        readiness.resolve(Err("boom".to_string()));

        assert_eq!(
            waiter.wait().await,
            Err(ReadinessError::Failed("boom".to_string()))
        );
        assert!(!readiness.is_ready());
        assert!(readiness.identity().is_none());
    }

    #[tokio::test]
    async fn test_resolves_only_once() {
        let readiness = Readiness::new();
        assert!(readiness.resolve(Ok(SessionIdentity::new("abc", "zzz"))));
        assert!(!readiness.resolve(Err("late".to_string())));
        assert!(!readiness.resolve(Ok(SessionIdentity::new("other", "pair"))));

        assert_eq!(readiness.identity(), Some(SessionIdentity::new("abc", "zzz")));
    }

    #[tokio::test]
    async fn test_late_waiter_sees_resolved_state() {
        let readiness = Readiness::new();
        readiness.resolve(Ok(SessionIdentity::new("abc", "zzz")));

        let identity = readiness.wait().await.unwrap();
        assert_eq!(identity.auth_code(), "zzz");
    }

    #[tokio::test]
    async fn test_dropped_signal_abandons_waiters() {
        let readiness = Readiness::new();
        let waiter = readiness.subscribe();
        drop(readiness);

        assert_eq!(waiter.wait().await, Err(ReadinessError::Abandoned));
    }

    #[test]
    fn test_waiter_pending_until_resolved() {
        use tokio_test::{assert_pending, assert_ready, task};

        let readiness = Readiness::default();
        assert_eq!(readiness.state(), ReadyState::Pending);

        let mut waiter = task::spawn(readiness.subscribe().wait());
        assert_pending!(waiter.poll());

        readiness.resolve(Ok(SessionIdentity::new("abc", "zzz")));
        assert!(waiter.is_woken());
        let identity = assert_ready!(waiter.poll()).unwrap();
        assert_eq!(identity.id(), "abc");
    }
}
