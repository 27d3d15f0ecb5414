//! The opaque wire contract consumed by the publisher.
//!
//! The pipeline never interprets the wire protocol; it only asks a
//! [`Transport`] to move a file's worth of bytes to or from a
//! [`RemoteResource`]. Blockwise semantics, timeouts and retransmissions
//! are the transport's own business.

use std::io;

use crate::vstorage::FileIo;

/// Description of a remote endpoint resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteResource {
    /// Backend server address.
    pub address: String,
    /// Backend server port.
    pub port: u16,
    /// Resource path on the server.
    pub path: String,
}

/// A blocking datagram transport.
///
/// Both operations return the number of payload bytes moved; callers must
/// not read anything but success into a positive count. Implementations own
/// their timeouts.
pub trait Transport: Send + Sync {
    /// Send the file's contents to the resource, blocking until the
    /// transfer is complete or fails.
    fn send(&self, res: &RemoteResource, file: &mut dyn FileIo) -> io::Result<usize>;

    /// Receive from the resource into the file, blocking until the transfer
    /// is complete or fails.
    fn recv(&self, _res: &RemoteResource, _file: &mut dyn FileIo) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "transport does not support receiving",
        ))
    }
}
