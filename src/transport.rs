use crate::protocol::HANDSHAKE;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("handshake refused: {0}")]
    Handshake(#[source] io::Error),
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
}

/// What to do once the gesture server connection is lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// Stop the relay.
    Exit,
    /// Keep running and wait for a reconnect.
    Reconnect,
}

/// A connected sink for encoded records.
pub trait Transport: Send + 'static {
    /// Deliver one record. Any error means the connection is unusable.
    fn send(&mut self, record: &[u8]) -> Result<(), TransportError>;
}

pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connect and announce the device type.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let target = format!("{}:{}", host, port);
        let addr = target
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve(target.clone()))?
            .next()
            .ok_or_else(|| TransportError::Resolve(target.clone()))?;

        let mut stream =
            TcpStream::connect_timeout(&addr, timeout).map_err(|source| TransportError::Connect {
                addr: target.clone(),
                source,
            })?;
        // Records are tiny and latency matters more than throughput.
        stream
            .set_nodelay(true)
            .map_err(|source| TransportError::Connect {
                addr: target.clone(),
                source,
            })?;
        write_fully(&mut stream, &[HANDSHAKE]).map_err(TransportError::Handshake)?;

        info!(%addr, "connected to gesture server");
        Ok(Self { stream, peer: addr })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, record: &[u8]) -> Result<(), TransportError> {
        write_fully(&mut self.stream, record).map_err(TransportError::Send)
    }
}

fn write_fully(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(bytes)?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn connect_sends_handshake_then_records() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).expect("read");
            buf
        });

        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_secs(2)).expect("connect");
        assert_eq!(transport.peer().port(), port);
        transport.send(&[7, 8, 9]).expect("send");

        let received = server.join().expect("join");
        assert_eq!(received, [HANDSHAKE, 7, 8, 9]);
    }

    #[test]
    fn connect_to_closed_port_fails() {
        // Grab a free port, then release it so nothing is listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("addr")
            .port();
        let result = TcpTransport::connect("127.0.0.1", port, Duration::from_millis(500));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
