use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::FaceSyncError;
use crate::FrameTransport;

/// Sends each encoded frame as one UDP datagram to a LiveLink listener.
pub struct UdpTransport {
    socket: UdpSocket,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to `addr`.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, FaceSyncError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(addr)?;
        if let Ok(peer) = socket.peer_addr() {
            log::info!("LiveLink transport connected to {peer}");
        }
        Ok(Self {
            socket,
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl FrameTransport for UdpTransport {
    fn send(&self, packet: &[u8]) -> Result<(), FaceSyncError> {
        if self.is_closed() {
            return Err(FaceSyncError::EngineStopped);
        }
        let sent = self.socket.send(packet)?;
        if sent != packet.len() {
            return Err(FaceSyncError::Emission(format!(
                "short datagram write: {sent} of {} bytes",
                packet.len()
            )));
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::info!("LiveLink transport closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UdpTransport;
    use crate::FrameTransport;
    use std::net::UdpSocket;
    use std::time::Duration;

    #[test]
    fn delivers_packets_until_closed() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let transport = UdpTransport::connect(listener.local_addr().unwrap()).unwrap();

        transport.send(&[6, 1, 2, 3]).unwrap();
        let mut buf = [0u8; 16];
        let n = listener.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[6, 1, 2, 3]);

        transport.close();
        assert!(transport.is_closed());
        assert!(transport.send(&[6]).is_err());
    }
}
