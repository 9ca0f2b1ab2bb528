//! Per-connection state for effect clients (hub side).
//!
//! Each accepted stream is split. The read half moves into a reader task
//! that forwards raw reads as [`HubEvent`]s; the write half stays here and is
//! written synchronously by the hub loop, so a slow peer can never stall it.

use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::events::HubEvent;
use crate::protocol::RecordDecoder;
use crate::registry::ConnectionId;

/// Hub-side state for one TCP client.
pub(crate) struct EffectConn {
    id: ConnectionId,
    peer: SocketAddr,
    writer: OwnedWriteHalf,
    /// Partial-record carry for this stream.
    decoder: RecordDecoder,
    read_handle: JoinHandle<()>,
}

impl std::fmt::Debug for EffectConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectConn")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl EffectConn {
    /// Take ownership of an accepted stream and spawn its reader task.
    pub(crate) fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        read_buffer_len: usize,
        max_record_len: usize,
        hub_event_tx: UnboundedSender<HubEvent>,
    ) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("[Conn] Failed to set TCP_NODELAY for {id}: {e}");
        }
        let (read_half, writer) = stream.into_split();
        let read_handle = tokio::spawn(Self::read_loop(id, read_half, read_buffer_len, hub_event_tx));

        Self {
            id,
            peer,
            writer,
            decoder: RecordDecoder::new(max_record_len),
            read_handle,
        }
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn decoder_mut(&mut self) -> &mut RecordDecoder {
        &mut self.decoder
    }

    /// Write `data` without waiting.
    ///
    /// Anything short of writing every byte immediately is an error,
    /// including `WouldBlock`.
    pub(crate) fn try_send(&self, data: &[u8]) -> io::Result<()> {
        match self.writer.try_write(data) {
            Ok(n) if n == data.len() => Ok(()),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {n} of {} bytes", data.len()),
            )),
            Err(e) => Err(e),
        }
    }

    /// Stop the reader task and drop the socket.
    pub(crate) fn close(self) {
        self.read_handle.abort();
    }

    /// Forward raw reads to the hub until EOF, an error, or the hub goes away.
    async fn read_loop(
        id: ConnectionId,
        mut reader: OwnedReadHalf,
        read_buffer_len: usize,
        hub_event_tx: UnboundedSender<HubEvent>,
    ) {
        let mut buf = vec![0u8; read_buffer_len];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    log::info!("[Conn] {id} closed by peer");
                    break;
                }
                Ok(n) => {
                    let event = HubEvent::Received {
                        connection: id,
                        data: Bytes::copy_from_slice(&buf[..n]),
                    };
                    if hub_event_tx.send(event).is_err() {
                        return; // Hub gone
                    }
                }
                Err(e) => {
                    log::info!("[Conn] Read error on {id}: {e}");
                    break;
                }
            }
        }

        let _ = hub_event_tx.send(HubEvent::Closed { connection: id });
    }
}
