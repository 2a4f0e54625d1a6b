//! In-process transport: a cross-wired pair of channel connections.
//!
//! Not every peer is on the network. An embedded host can drive the
//! protocol over a pair of in-memory queues, and the integration tests
//! talk to dispatchers the same way. [`ChannelConnection::pair`] returns
//! two ends wired to each other: whatever one sends, the other receives.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, TransportError};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// One end of an in-process connection pair.
pub struct ChannelConnection {
    id: ConnectionId,
    /// Outbound queue into the peer. `None` once this end is closed.
    tx: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    /// Inbound queue from the peer.
    rx: Mutex<UnboundedReceiver<Vec<u8>>>,
}

impl ChannelConnection {
    /// Two connected ends. Dropping either end reads as a clean close
    /// on the other.
    pub fn pair() -> (Self, Self) {
        let (to_right, from_left) = mpsc::unbounded_channel();
        let (to_left, from_right) = mpsc::unbounded_channel();

        let left = Self {
            id: next_id(),
            tx: Mutex::new(Some(to_right)),
            rx: Mutex::new(from_right),
        };
        let right = Self {
            id: next_id(),
            tx: Mutex::new(Some(to_left)),
            rx: Mutex::new(from_left),
        };
        (left, right)
    }
}

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
}

impl Connection for ChannelConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let tx = self.tx.lock().await;
        let Some(sender) = tx.as_ref() else {
            return Err(TransportError::ConnectionClosed(
                "connection closed locally".into(),
            ));
        };
        sender
            .send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer end dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        // `None` from the queue means every sender is gone, which is
        // exactly the clean-close contract.
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        // Dropping the sender closes the peer's inbound queue once it
        // drains. Closing our receiver refuses further traffic from the
        // peer but lets already-queued messages through.
        self.tx.lock().await.take();
        self.rx.lock().await.close();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

// =========================================================================
// Tests
// =========================================================================
