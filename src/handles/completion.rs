//! # Completion: single-shot promise for a command's verdict.
//!
//! Asynchronous operations (publish, ack, nack, progress) return a
//! [`Completion`] instead of blocking the caller. The command loop resolves
//! it exactly once; a caller that does not care may simply drop it
//! (fire-and-forget is safe).

use tokio::sync::oneshot;

use crate::core::command::Verdict;
use crate::error::BrokerError;

/// Pending verdict of one broker operation.
pub struct Completion {
    rx: oneshot::Receiver<Result<(), BrokerError>>,
}

impl Completion {
    /// Creates a resolver/completion pair.
    pub(crate) fn channel() -> (Verdict, Completion) {
        let (tx, rx) = oneshot::channel();
        (tx, Completion { rx })
    }

    /// Creates an already-resolved completion (for immediate errors
    /// detected before the command ever reaches the loop).
    pub(crate) fn ready(result: Result<(), BrokerError>) -> Completion {
        let (tx, completion) = Completion::channel();
        let _ = tx.send(result);
        completion
    }

    /// Suspends until the loop resolves the operation.
    ///
    /// If the loop went away without answering (shutdown race), the verdict
    /// is [`BrokerError::Stopped`].
    pub async fn wait(self) -> Result<(), BrokerError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Stopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_completion_resolves_immediately() {
        let c = Completion::ready(Ok(()));
        assert!(c.wait().await.is_ok());

        let c = Completion::ready(Err(BrokerError::NotInitialized));
        assert!(matches!(c.wait().await, Err(BrokerError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_dropped_resolver_reads_as_stopped() {
        let (tx, c) = Completion::channel();
        drop(tx);
        assert!(matches!(c.wait().await, Err(BrokerError::Stopped)));
    }
}
