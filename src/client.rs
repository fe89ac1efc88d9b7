// Client side of the datagram protocol: frame one request, send it, wait for the
// acknowledgement. Delivery is best-effort; a lost datagram surfaces as a timeout.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{ToSocketAddrs, UdpSocket};

use crate::error::ProtocolError;
use crate::protocol::{self, Acknowledgement};
use crate::registry::{Opcode, Operation};

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

// Acknowledgements are short text; anything longer is not ours.
const REPLY_BUFFER_LEN: usize = 512;

pub struct DatagramClient {
    socket: UdpSocket,
    reply_timeout: Duration,
}

impl DatagramClient {
    /// Binds an ephemeral local socket and connects it to `server`.
    pub async fn connect(server: impl ToSocketAddrs) -> Result<Self, ProtocolError> {
        let server = tokio::net::lookup_host(server)
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "server address resolved to nothing"))?;
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;
        Ok(Self {
            socket,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.socket.peer_addr()?)
    }

    pub async fn send_operation(&self, operation: Operation, image: &[u8]) -> Result<Acknowledgement, ProtocolError> {
        self.send(operation.opcode(), image).await
    }

    /// Sends one request and waits for its acknowledgement. Payloads that do not fit
    /// in a single datagram are refused before anything is sent.
    pub async fn send(&self, opcode: Opcode, image: &[u8]) -> Result<Acknowledgement, ProtocolError> {
        let datagram = protocol::encode_request(opcode, image)?;
        self.socket.send(&datagram).await?;

        let mut reply = [0u8; REPLY_BUFFER_LEN];
        let len = tokio::time::timeout(self.reply_timeout, self.socket.recv(&mut reply))
            .await
            .map_err(|_| ProtocolError::Timeout(self.reply_timeout))??;
        Acknowledgement::parse(&reply[..len])
    }
}
