//! The receive-result handshake
//!
//! A [`ReceiveResult`] travels from the sender to the receiver through an
//! inbox and carries everything the receiver needs: the message, who sent it,
//! and the sender's cancellation. The receiver reports exactly one terminal
//! outcome back through it; the sender awaits that outcome on the paired
//! future. The first completion wins, every later attempt is a silent no-op.

use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain_types::{EndpointAddress, RouteMessageHandleResult};
use crate::message::Message;

/// The terminal outcome reported through a receive result.
#[derive(Debug)]
pub(crate) enum Completion {
    /// The receiver produced a handle result (an ack is the default,
    /// unhandled result).
    Completed(RouteMessageHandleResult),
    /// The receiver observed the sender's cancellation.
    Canceled,
}

/// The sender's handle on the outcome of one delivery.
pub(crate) type ResultFuture = oneshot::Receiver<Completion>;

/// One in-flight delivery, as seen by the receiver.
#[derive(Debug)]
pub struct ReceiveResult {
    message: Message,
    remote_end_point: EndpointAddress,
    cancellation: CancellationToken,
    completion: Mutex<Option<oneshot::Sender<Completion>>>,
}

impl ReceiveResult {
    /// Creates the handshake pair: the receive result to enqueue and the
    /// future the sender awaits.
    pub(crate) fn new(
        message: Message,
        remote_end_point: EndpointAddress,
        cancellation: CancellationToken,
    ) -> (Self, ResultFuture) {
        let (tx, rx) = oneshot::channel();
        let result = Self {
            message,
            remote_end_point,
            cancellation,
            completion: Mutex::new(Some(tx)),
        };
        (result, rx)
    }

    /// The delivered message.
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The address of the end point that sent the message.
    #[must_use]
    pub fn remote_end_point(&self) -> &EndpointAddress {
        &self.remote_end_point
    }

    /// The sender's cancellation, for the receiver to observe while
    /// handling.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Completes with the default, unhandled result: the receiver saw the
    /// message but took no responsibility for it.
    pub fn send_ack(&self) {
        self.complete(Completion::Completed(RouteMessageHandleResult::default()));
    }

    /// Completes with the receiver's handle result.
    pub fn send_result(&self, result: RouteMessageHandleResult) {
        self.complete(Completion::Completed(result));
    }

    /// Completes by reporting the sender's cancellation back to it.
    pub fn send_cancellation(&self) {
        self.complete(Completion::Canceled);
    }

    fn complete(&self, completion: Completion) {
        let sender = self
            .completion
            .lock()
            .expect("completion mutex poisoned")
            .take();
        if let Some(sender) = sender {
            // The sender may have stopped waiting; that is its business.
            let _ = sender.send(completion);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{RouteMessage, RouteMessageHandleResult};
    use bytes::Bytes;

    fn handshake() -> (ReceiveResult, ResultFuture) {
        ReceiveResult::new(
            Message::from(Bytes::from_static(b"m")),
            "sender".into(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn first_completion_wins() {
        let (result, rx) = handshake();

        let handled = RouteMessageHandleResult::handled(RouteMessage::from_message(
            Message::from(Bytes::from_static(b"response")),
        ));
        result.send_result(handled.clone());
        result.send_ack();
        result.send_cancellation();

        match rx.await.unwrap() {
            Completion::Completed(outcome) => assert_eq!(outcome, handled),
            Completion::Canceled => panic!("result was overwritten by cancellation"),
        }
    }

    #[tokio::test]
    async fn ack_reports_unhandled() {
        let (result, rx) = handshake();
        result.send_ack();

        match rx.await.unwrap() {
            Completion::Completed(outcome) => {
                assert!(!outcome.is_handled());
                assert_eq!(*outcome.route_message(), RouteMessage::default());
            }
            Completion::Canceled => panic!("ack reported as cancellation"),
        }
    }

    #[tokio::test]
    async fn cancellation_is_terminal() {
        let (result, rx) = handshake();
        result.send_cancellation();
        result.send_ack();

        assert!(matches!(rx.await.unwrap(), Completion::Canceled));
    }

    #[tokio::test]
    async fn dropping_the_result_closes_the_future() {
        let (result, rx) = handshake();
        drop(result);
        assert!(rx.await.is_err());
    }
}
