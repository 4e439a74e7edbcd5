//! # Store Transport
//!
//! The opaque outbound channel for one store connection.
//!
//! A transport is the writer half of a bounded mpsc channel. The listener
//! owns the receiving half inside the per-connection writer task; the
//! registry owns the [`StoreTransport`] and is the only component allowed
//! to close it. Dropping the registry entry closes the channel, which the
//! writer task treats as the close signal and tears the socket down.
//!
//! Sends are ordered within one connection (single channel, single writer
//! task). Backpressure from a slow store surfaces here as a send timeout.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use crate::protocol::OutboundFrame;

/// Outcome of a transport-level send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSendError {
    /// The frame could not be enqueued within the bound.
    Timeout,
    /// The writer task is gone; the connection is dead.
    Closed,
}

/// Writer handle for one store connection.
///
/// Owned exclusively by the registry entry for that store. Cloning is
/// restricted to the registry, which clones only for the duration of a
/// single send so the lock is never held across the await.
#[derive(Debug, Clone)]
pub struct StoreTransport {
    tx: mpsc::Sender<OutboundFrame>,
}

impl StoreTransport {
    /// Creates a transport and its receiving half.
    ///
    /// The receiver belongs in the connection's writer task; the transport
    /// belongs in the registry.
    pub fn channel(capacity: usize) -> (StoreTransport, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (StoreTransport { tx }, rx)
    }

    /// Returns true if the writer side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueues a frame for the writer task, waiting at most `timeout` for
    /// channel capacity.
    pub async fn send(
        &self,
        frame: OutboundFrame,
        timeout: Duration,
    ) -> Result<(), TransportSendError> {
        match self.tx.send_timeout(frame, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(TransportSendError::Timeout),
            Err(SendTimeoutError::Closed(_)) => Err(TransportSendError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SyncEnvelope, WelcomeFrame};
    use serde_json::json;

    #[tokio::test]
    async fn test_send_delivers_to_receiver() {
        let (transport, mut rx) = StoreTransport::channel(4);
        transport
            .send(
                OutboundFrame::Sync(SyncEnvelope::push("price_list", json!({}))),
                Duration::from_millis(100),
            )
            .await
            .expect("send succeeds");

        match rx.recv().await {
            Some(OutboundFrame::Sync(env)) => assert_eq!(env.data_type(), "price_list"),
            other => panic!("expected sync frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_to_closed_receiver() {
        let (transport, rx) = StoreTransport::channel(4);
        drop(rx);

        let result = transport
            .send(
                OutboundFrame::Welcome(WelcomeFrame::now()),
                Duration::from_millis(100),
            )
            .await;
        assert_eq!(result, Err(TransportSendError::Closed));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_send_times_out_when_full() {
        let (transport, _rx) = StoreTransport::channel(1);
        transport
            .send(
                OutboundFrame::Welcome(WelcomeFrame::now()),
                Duration::from_millis(50),
            )
            .await
            .expect("first send fills the buffer");

        let result = transport
            .send(
                OutboundFrame::Welcome(WelcomeFrame::now()),
                Duration::from_millis(50),
            )
            .await;
        assert_eq!(result, Err(TransportSendError::Timeout));
    }
}
