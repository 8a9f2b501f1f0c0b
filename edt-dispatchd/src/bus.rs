//! The message bus: a non-blocking transport carrying the literal wire frame
//! `"<type> <x> <y> <unix_ts>"` over a `tokio::net::UnixDatagram` bound at a
//! filesystem path derived from the grid config's `queue_name`. At least 10
//! outstanding datagrams are accepted by the kernel socket buffer; there is
//! no separate slot-count limit to enforce on top of that.

use std::path::{Path, PathBuf};

use edt_common::errors::DispatchError;
use edt_common::limits::MAX_FRAME_BYTES;
use tokio::net::UnixDatagram;

/// A bound, non-blocking datagram endpoint for inbound emergency requests.
pub struct DatagramBus {
    socket: UnixDatagram,
    path: PathBuf,
}

impl DatagramBus {
    /// Binds a fresh socket at `path`, removing any stale socket file left
    /// behind by a previous, uncleanly terminated run.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                DispatchError::infrastructural(format!("removing stale bus socket {}", path.display()), e)
            })?;
        }
        let socket = UnixDatagram::bind(&path)
            .map_err(|e| DispatchError::infrastructural(format!("binding bus socket {}", path.display()), e))?;
        Ok(Self { socket, path })
    }

    /// Attempts a non-blocking receive. Returns `Ok(None)` on `WouldBlock`
    /// (the ingress loop backs off on this), and an error for any oversized
    /// or otherwise unreadable datagram.
    pub async fn try_recv(&self) -> Result<Option<Vec<u8>>, DispatchError> {
        let mut buf = vec![0u8; MAX_FRAME_BYTES];
        match self.socket.try_recv(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(DispatchError::infrastructural("reading from bus socket", e)),
        }
    }
}

impl Drop for DatagramBus {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
