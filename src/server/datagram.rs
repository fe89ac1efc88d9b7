// THEORY:
// The datagram dispatcher is a single receive loop on one UDP socket. Each request
// moves through a fixed sequence of states:
//
//   AWAITING_DATAGRAM -> DECODING_HEADER -> DECODING_IMAGE -> DISPATCHING -> REPLYING
//
// and the loop immediately returns to AWAITING_DATAGRAM; everything after the
// receive happens on a task of its own, so a slow image never delays the next one.
//
// Key architectural principles:
// 1.  **Silent failure**: a datagram that is too short, too long or undecodable is
//     dropped without a reply. The client learns about it through its own timeout.
// 2.  **Unknown opcodes are identity**: the image is re-encoded unchanged and
//     acknowledged like any other request.
// 3.  **Blocking work off the runtime**: decoding and the pixel pipeline run on the
//     blocking pool; encoding happens inside the output store, also off the runtime.
// 4.  **Reply after persist**: the acknowledgement is only sent once the result is
//     on disk, so a client holding an id can always fetch it.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use log::{Level, debug, info, log, warn};
use tokio::net::{ToSocketAddrs, UdpSocket};

use crate::core_modules::utils::image_helper;
use crate::error::{CodecError, DispatchError};
use crate::output::{Naming, OutputStore, RequestId};
use crate::pipeline;
use crate::protocol::{self, DatagramRequest, MAX_DATAGRAM_SIZE};
use crate::registry::Operation;

/// What happened to a datagram that made it all the way through.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub request_id: RequestId,
    /// `None` when the opcode was unknown and the image passed through unchanged.
    pub operation: Option<Operation>,
    pub path: PathBuf,
}

impl DispatchError {
    /// Level a dropped datagram is logged at.
    pub fn log_level(&self) -> Level {
        match self {
            DispatchError::MalformedRequest(_) => Level::Debug,
            DispatchError::DecodeFailure(_) | DispatchError::Reply(_) => Level::Warn,
            DispatchError::Persist(_) | DispatchError::Task(_) => Level::Error,
        }
    }
}

pub struct DatagramServer {
    socket: Arc<UdpSocket>,
    store: Arc<OutputStore>,
}

impl DatagramServer {
    pub async fn bind(addr: impl ToSocketAddrs, store: Arc<OutputStore>) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            store,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves until the process exits.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves. Requests already handed to a task finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("datagram dispatcher listening on udp://{}", self.local_addr()?);
        // One byte over the limit, so oversized datagrams are seen as such instead of
        // being silently truncated to an acceptable length.
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("datagram dispatcher shutting down");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buffer) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(err) => {
                            warn!("datagram receive failed: {err}");
                            continue;
                        }
                    };
                    let datagram = buffer[..len].to_vec();
                    let socket = Arc::clone(&self.socket);
                    let store = Arc::clone(&self.store);
                    tokio::spawn(async move {
                        match handle_datagram(&socket, &store, peer, &datagram).await {
                            Ok(done) => debug!(
                                "{peer}: {} -> {}",
                                done.operation.map_or("identity", Operation::name),
                                done.path.display()
                            ),
                            Err(err) => log!(err.log_level(), "{peer}: dropped datagram of {len} bytes: {err}"),
                        }
                    });
                }
            }
        }
    }
}

/// Runs one datagram through decode, dispatch, persist and reply.
pub async fn handle_datagram(
    socket: &UdpSocket,
    store: &OutputStore,
    peer: SocketAddr,
    datagram: &[u8],
) -> Result<Dispatched, DispatchError> {
    let request = DatagramRequest::decode(datagram).map_err(DispatchError::MalformedRequest)?;
    let request_id = store.allocate_request_id();
    let operation = request.operation();
    let step = request.step();
    let payload = request.payload.to_vec();

    let processed = tokio::task::spawn_blocking(move || -> Result<_, CodecError> {
        let buffer = image_helper::decode(&payload)?;
        Ok(pipeline::run(buffer, std::slice::from_ref(&step)).into_final())
    })
    .await?
    .map_err(DispatchError::DecodeFailure)?;

    let path = store
        .persist_datagram_result(&request_id, processed)
        .await
        .map_err(DispatchError::Persist)?;

    let echoed_id = match store.naming() {
        Naming::PerRequest => Some(request_id.as_str()),
        Naming::Shared => None,
    };
    let reply = protocol::acknowledgement(echoed_id);
    socket
        .send_to(reply.as_bytes(), peer)
        .await
        .map_err(DispatchError::Reply)?;

    Ok(Dispatched {
        request_id,
        operation,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use crate::client::DatagramClient;
    use crate::core_modules::pixel_buffer::{Pixel, PixelBuffer};
    use crate::core_modules::utils::image_helper::OutputFormat;
    use crate::error::ProtocolError;

    struct Harness {
        addr: SocketAddr,
        store: Arc<OutputStore>,
        stop: Option<oneshot::Sender<()>>,
        task: tokio::task::JoinHandle<io::Result<()>>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        async fn start(naming: Naming) -> Self {
            Self::start_on("127.0.0.1:0", naming).await.expect("bind")
        }

        async fn start_on(bind: &str, naming: Naming) -> io::Result<Self> {
            let dir = tempfile::tempdir().expect("tempdir");
            let store = Arc::new(OutputStore::new(dir.path().join("output"), naming, OutputFormat::Png));
            let server = DatagramServer::bind(bind, Arc::clone(&store)).await?;
            let addr = server.local_addr().expect("local addr");
            let (stop, stopped) = oneshot::channel::<()>();
            let task = tokio::spawn(server.run_until(async move {
                let _ = stopped.await;
            }));
            Ok(Self {
                addr,
                store,
                stop: Some(stop),
                task,
                _dir: dir,
            })
        }

        async fn client(&self) -> DatagramClient {
            DatagramClient::connect(self.addr)
                .await
                .expect("connect")
                .with_reply_timeout(Duration::from_secs(5))
        }

        async fn shutdown(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            self.task.await.expect("join").expect("serve");
        }
    }

    fn png(buffer: &PixelBuffer) -> Vec<u8> {
        image_helper::encode(buffer, OutputFormat::Png).expect("encode")
    }

    fn read_result(path: &Path) -> PixelBuffer {
        image_helper::decode(&std::fs::read(path).expect("result file")).expect("decode")
    }

    fn sample() -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(6, 5, Pixel::new(200, 50, 10, 255));
        buffer.put(0, 0, Pixel::new(1, 2, 3, 255));
        buffer
    }

    #[tokio::test]
    async fn known_opcode_is_processed_and_acknowledged() {
        let harness = Harness::start(Naming::PerRequest).await;
        let client = harness.client().await;

        let ack = client
            .send_operation(Operation::Achromatopsia, &png(&sample()))
            .await
            .expect("ack");
        let id = RequestId::parse(ack.request_id.as_deref().expect("request id")).expect("valid id");

        let result = read_result(&harness.store.datagram_result_path(&id));
        assert_eq!(result.get(3, 3), Some(Pixel::new(90, 90, 90, 255)));
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_opcode_returns_the_image_unchanged() {
        let harness = Harness::start(Naming::PerRequest).await;
        let client = harness.client().await;

        let ack = client.send(42, &png(&sample())).await.expect("ack");
        let id = RequestId::parse(ack.request_id.as_deref().expect("request id")).expect("valid id");
        assert_eq!(read_result(&harness.store.datagram_result_path(&id)), sample());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn acknowledged_id_fetches_the_result_from_the_store() {
        let harness = Harness::start(Naming::PerRequest).await;
        let client = harness.client().await;

        let ack = client.send_operation(Operation::Flip, &png(&sample())).await.expect("ack");
        let id = ack.request_id.expect("request id");
        let bytes = harness.store.load(&id, "result.png").await.expect("load by acknowledged id");
        let result = image_helper::decode(&bytes).expect("decode");
        assert_eq!(result.get(0, 4), Some(Pixel::new(1, 2, 3, 255)));
        harness.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn oversized_ipv6_datagram_is_dropped_and_the_loop_keeps_serving() {
        // IPv6 carries up to 65527 bytes of UDP payload, so the server sees more than 65507.
        let Ok(harness) = Harness::start_on("[::1]:0", Naming::PerRequest).await else {
            warn!("IPv6 loopback unavailable; skipping");
            return;
        };
        let socket = UdpSocket::bind("[::1]:0").await.expect("bind");

        let mut datagram = Operation::Flip.opcode().to_be_bytes().to_vec();
        datagram.extend_from_slice(&png(&sample()));
        datagram.resize(MAX_DATAGRAM_SIZE + 10, 0);
        if let Err(err) = socket.send_to(&datagram, harness.addr).await {
            warn!("cannot send {} bytes over IPv6 loopback ({err}); skipping", datagram.len());
            harness.shutdown().await;
            return;
        }

        let mut reply = [0u8; 64];
        let waited = tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut reply)).await;
        assert!(waited.is_err(), "oversized datagram must not be answered");
        assert!(!harness.store.root().exists());

        let ack = harness
            .client()
            .await
            .send_operation(Operation::Flip, &png(&sample()))
            .await
            .expect("next request is still served");
        assert!(ack.request_id.is_some());
        harness.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn two_byte_datagram_gets_no_reply_and_writes_nothing() {
        let harness = Harness::start(Naming::PerRequest).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        socket.send_to(&[0, 1], harness.addr).await.expect("send");

        let mut reply = [0u8; 64];
        let waited = tokio::time::timeout(Duration::from_millis(300), socket.recv_from(&mut reply)).await;
        assert!(waited.is_err(), "malformed datagram must not be answered");
        assert!(!harness.store.root().exists());
        harness.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn undecodable_image_gets_no_reply() {
        let harness = Harness::start(Naming::PerRequest).await;
        let client = harness.client().await.with_reply_timeout(Duration::from_millis(300));

        let result = client.send(Operation::Flip.opcode(), b"not an image at all").await;
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
        assert!(!harness.store.root().exists());
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn shared_naming_writes_the_legacy_file_without_an_id() {
        let harness = Harness::start(Naming::Shared).await;
        let client = harness.client().await;

        let ack = client
            .send_operation(Operation::Flip, &png(&sample()))
            .await
            .expect("ack");
        assert_eq!(ack.request_id, None);
        assert_eq!(ack.text, protocol::ACK_TEXT);

        let path = harness.store.root().join("udp_processed.png");
        assert_eq!(read_result(&path).get(0, 4), Some(Pixel::new(1, 2, 3, 255)));
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_requests_get_distinct_results() {
        let harness = Harness::start(Naming::PerRequest).await;
        let red = PixelBuffer::filled(4, 4, Pixel::new(255, 0, 0, 255));
        let blue = PixelBuffer::filled(4, 4, Pixel::new(0, 0, 255, 255));
        let (a, b) = (harness.client().await, harness.client().await);
        let (red_png, blue_png) = (png(&red), png(&blue));

        let (ack_red, ack_blue) = tokio::join!(a.send(0, &red_png), b.send(0, &blue_png));
        let red_id = RequestId::parse(&ack_red.expect("ack").request_id.expect("id")).expect("id");
        let blue_id = RequestId::parse(&ack_blue.expect("ack").request_id.expect("id")).expect("id");

        assert_ne!(red_id, blue_id);
        assert_eq!(read_result(&harness.store.datagram_result_path(&red_id)), red);
        assert_eq!(read_result(&harness.store.datagram_result_path(&blue_id)), blue);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_requests_log_at_debug_and_decode_failures_at_warn() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let peer = socket.local_addr().expect("addr");
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OutputStore::new(dir.path(), Naming::PerRequest, OutputFormat::Png);

        let short = handle_datagram(&socket, &store, peer, &[9]).await.unwrap_err();
        assert!(matches!(short, DispatchError::MalformedRequest(_)));
        assert_eq!(short.log_level(), Level::Debug);

        let garbage = handle_datagram(&socket, &store, peer, &[0, 0, 0, 1, 7, 7]).await.unwrap_err();
        assert!(matches!(garbage, DispatchError::DecodeFailure(_)));
        assert_eq!(garbage.log_level(), Level::Warn);
    }
}
