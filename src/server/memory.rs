//! In-process transport that stands in for TCP.
//!
//! Each [`MemoryConnector::connect`] creates a `tokio::io::duplex` pair, keeps
//! the client half and queues the server half for [`MemoryListener::accept`].

use std::io;

use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;

use crate::server::listener::Listener;

const PIPE_CAPACITY: usize = 64 * 1024;

pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
    accepted: u64,
}

#[derive(Clone)]
pub struct MemoryConnector {
    outgoing: mpsc::UnboundedSender<DuplexStream>,
}

pub fn memory_listener() -> (MemoryListener, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryListener {
            incoming: rx,
            accepted: 0,
        },
        MemoryConnector { outgoing: tx },
    )
}

impl MemoryListener {
    /// Stops accepting. Connections already queued are still handed out.
    pub fn close(&mut self) {
        self.incoming.close();
    }
}

impl MemoryConnector {
    /// Opens a connection and returns the client side.
    pub fn connect(&self) -> io::Result<DuplexStream> {
        let (client, server) = duplex(PIPE_CAPACITY);
        self.outgoing
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "listener closed"))?;
        Ok(client)
    }
}

impl Listener for MemoryListener {
    type Conn = DuplexStream;

    async fn accept(&mut self) -> io::Result<Option<(DuplexStream, String)>> {
        match self.incoming.recv().await {
            Some(stream) => {
                self.accepted += 1;
                Ok(Some((stream, format!("memory#{}", self.accepted))))
            }
            None => Ok(None),
        }
    }
}
