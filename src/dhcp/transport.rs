//! The frame transport the client's sender/receiver tasks speak over: the
//! real raw L2 socket (`dhcp::raw::RawSocket`) in production, or an
//! in-memory queue pair (`MockTransport`) for pcap-replay style tests that
//! can't open an `AF_PACKET` socket.

use crate::dhcp::Error;
use async_trait::async_trait;
use std::cell::RefCell;
use tokio::sync::mpsc;

#[async_trait(?Send)]
pub trait Transport {
    async fn send(&self, frame: &[u8]) -> Result<(), Error>;
    async fn recv(&self) -> Result<Vec<u8>, Error>;
}

#[async_trait(?Send)]
impl Transport for crate::dhcp::raw::RawSocket {
    async fn send(&self, frame: &[u8]) -> Result<(), Error> {
        crate::dhcp::raw::RawSocket::send(self, frame).await
    }

    async fn recv(&self) -> Result<Vec<u8>, Error> {
        crate::dhcp::raw::RawSocket::recv(self).await
    }
}

/// An in-process transport for tests: `sent` captures every frame the
/// client transmits (inspectable after the fact), `inbound` feeds frames to
/// the client's receiver loop as if they'd arrived from the wire.
pub struct MockTransport {
    sent: mpsc::UnboundedSender<Vec<u8>>,
    inbound: RefCell<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MockTransport {
    /// Returns the transport plus a sender the test harness uses to queue
    /// inbound frames and a receiver it uses to observe outbound ones.
    pub fn pair() -> (MockTransport, mpsc::UnboundedSender<Vec<u8>>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (MockTransport { sent: sent_tx, inbound: RefCell::new(inbound_rx) }, inbound_tx, sent_rx)
    }
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn send(&self, frame: &[u8]) -> Result<(), Error> {
        let _ = self.sent.send(frame.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, Error> {
        let mut rx = self.inbound.borrow_mut();
        rx.recv().await.ok_or_else(|| Error::Resource("mock transport closed".into()))
    }
}
