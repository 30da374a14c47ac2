//! Linked cancellation
//!
//! A linked token observes cancellation of either of two parents. The link is
//! edge-triggered and fires at most once. Dropping the link cancels the child
//! token, so a sender that abandons its await (timeout, dropped future)
//! propagates cancellation to the receiver side instead of leaving it
//! dangling.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A child token wired to two parent tokens.
#[derive(Debug)]
pub(crate) struct LinkedCancellation {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl LinkedCancellation {
    /// Links a fresh token to two parents; cancelling either parent cancels
    /// the child. Must be called from within a tokio runtime.
    pub(crate) fn link(first: &CancellationToken, second: &CancellationToken) -> Self {
        let token = CancellationToken::new();
        let watcher = tokio::spawn({
            let first = first.clone();
            let second = second.clone();
            let child = token.clone();
            async move {
                tokio::select! {
                    () = first.cancelled() => {}
                    () = second.cancelled() => {}
                }
                child.cancel();
            }
        });
        Self { token, watcher }
    }

    /// A handle to the linked token.
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for LinkedCancellation {
    fn drop(&mut self) {
        self.watcher.abort();
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelling_either_parent_cancels_child() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();

        let linked = LinkedCancellation::link(&a, &b);
        let child = linked.token();
        assert!(!child.is_cancelled());

        b.cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
        // Parents are unaffected.
        assert!(!a.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_the_link_cancels_child() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();

        let linked = LinkedCancellation::link(&a, &b);
        let child = linked.token();
        drop(linked);

        child.cancelled().await;
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
