//! Mailbox buffers
//!
//! The unbounded FIFO backing per-node inboxes and per-cluster broadcast
//! inboxes. Multiple consumers may race on one inbox (broadcast receive);
//! the first poll to win the queue pop gets the item. Closing the inbox
//! rejects further pushes and hands the undelivered items back for dropping.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

/// The inbox was closed; no more items will be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InboxClosed;

#[derive(Debug)]
struct InboxState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded multi-consumer FIFO with a thread-safe close.
#[derive(Debug)]
pub(crate) struct Inbox<T> {
    state: Mutex<InboxState<T>>,
    notify: Notify,
}

impl<T> Inbox<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(InboxState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueues an item, or returns it when the inbox is closed.
    pub(crate) fn push(&self, item: T) -> Result<(), T> {
        {
            let mut state = self.state.lock().expect("inbox mutex poisoned");
            if state.closed {
                return Err(item);
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Dequeues the next item in FIFO order, waiting for one to arrive.
    ///
    /// Cancel-safe: an item is only removed from the queue in the poll that
    /// returns it, and a wakeup consumed by a dropped waiter is passed on to
    /// the next one.
    pub(crate) async fn pop(&self) -> Result<T, InboxClosed> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().expect("inbox mutex poisoned");
                if let Some(item) = state.items.pop_front() {
                    // Another item may be waiting behind this one; keep a
                    // competing consumer awake.
                    if !state.items.is_empty() {
                        self.notify.notify_one();
                    }
                    return Ok(item);
                }
                if state.closed {
                    return Err(InboxClosed);
                }
            }

            notified.await;
        }
    }

    /// Closes the inbox and returns the items that were never delivered.
    pub(crate) fn close(&self) -> Vec<T> {
        let drained = {
            let mut state = self.state.lock().expect("inbox mutex poisoned");
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.notify.notify_waiters();
        drained
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().expect("inbox mutex poisoned").closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let inbox = Inbox::new();
        inbox.push(1).unwrap();
        inbox.push(2).unwrap();
        inbox.push(3).unwrap();

        assert_eq!(inbox.pop().await, Ok(1));
        assert_eq!(inbox.pop().await, Ok(2));
        assert_eq!(inbox.pop().await, Ok(3));
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let inbox = Arc::new(Inbox::new());
        let waiter = {
            let inbox = Arc::clone(&inbox);
            tokio::spawn(async move { inbox.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        inbox.push(7u32).unwrap();

        assert_eq!(waiter.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn close_rejects_pushes_and_wakes_waiters() {
        let inbox = Arc::new(Inbox::new());
        let waiter = {
            let inbox = Arc::clone(&inbox);
            tokio::spawn(async move { inbox.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let drained: Vec<u32> = inbox.close();
        assert!(drained.is_empty());
        assert!(inbox.is_closed());

        assert_eq!(waiter.await.unwrap(), Err(InboxClosed));
        assert_eq!(inbox.push(1), Err(1));
    }

    #[tokio::test]
    async fn close_returns_undelivered_items() {
        let inbox = Inbox::new();
        inbox.push(1).unwrap();
        inbox.push(2).unwrap();

        assert_eq!(inbox.close(), vec![1, 2]);
    }

    #[tokio::test]
    async fn competing_consumers_each_get_one_item() {
        let inbox = Arc::new(Inbox::new());
        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let inbox = Arc::clone(&inbox);
                tokio::spawn(async move { inbox.pop().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        inbox.push(1u32).unwrap();
        inbox.push(2u32).unwrap();

        let mut delivered: Vec<u32> = Vec::new();
        for consumer in consumers {
            delivered.push(consumer.await.unwrap().unwrap());
        }
        delivered.sort_unstable();
        assert_eq!(delivered, vec![1, 2]);
    }
}
