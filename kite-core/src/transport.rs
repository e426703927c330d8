use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RpcError;

/// An opaque pipe of text frames connecting two peers.
///
/// The runtime treats the transport as a black box: frames go out through
/// `send`, arrive through `recv`, and a closed pipe is signalled by `recv`
/// returning `None`. Implementations must release a blocked `recv` when
/// the underlying connection closes.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: String) -> Result<(), RpcError>;
    async fn recv(&mut self) -> Option<String>;
    async fn close(&mut self);
}

/// An in-process duplex transport; both halves speak to each other.
///
/// Wires two dispatchers together for tests and local composition without
/// touching a network.
pub fn pipe() -> (PipeTransport, PipeTransport) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        PipeTransport {
            tx: Some(a_tx),
            rx: b_rx,
        },
        PipeTransport {
            tx: Some(b_tx),
            rx: a_rx,
        },
    )
}

pub struct PipeTransport {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for PipeTransport {
    async fn send(&mut self, frame: String) -> Result<(), RpcError> {
        match &self.tx {
            Some(tx) => tx.send(frame).map_err(|_| RpcError::Disconnect),
            None => Err(RpcError::Disconnect),
        }
    }

    async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.tx.take();
        self.rx.close();
    }
}
