//! Event channel between connection reader tasks and the hub loop.
//!
//! Reader tasks own nothing but their socket half. Every read, and the end
//! of every stream, is forwarded through one
//! `mpsc::UnboundedSender<HubEvent>` and handled by the hub in arrival order.

use bytes::Bytes;

use crate::registry::ConnectionId;

/// Event from a connection reader task.
#[derive(Debug)]
pub(crate) enum HubEvent {
    /// Raw bytes from one read. May hold partial or multiple records.
    Received {
        /// Connection the bytes arrived on.
        connection: ConnectionId,
        /// Bytes as read, at most `read_buffer_len`.
        data: Bytes,
    },

    /// The peer closed the stream or a read failed.
    ///
    /// May arrive after the hub already tore the connection down; the hub
    /// ignores ids it no longer knows.
    Closed {
        /// Connection that ended.
        connection: ConnectionId,
    },
}
