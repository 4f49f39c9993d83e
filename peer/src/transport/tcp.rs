use std::{
    collections::{HashMap, VecDeque},
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, trace, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
};

use tabletop_shared::{
    NetworkEvent, PeerId, Roster, Transport, TransportError, TransportEvent, WireMessage,
};

/// Contains Config properties which will be used by a TcpTransport
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Address other peers dial to reach this one
    pub listen_addr: SocketAddr,
    pub connect_timeout: Duration,
    /// Longest accepted frame in bytes, newline excluded
    pub max_frame_length: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 14191)),
            connect_timeout: Duration::from_secs(10),
            max_frame_length: 16 * 1024 * 1024,
        }
    }
}

type DialRequest = (SocketAddr, Option<PeerId>);

struct Link {
    id: u64,
    frames: mpsc::UnboundedSender<Vec<u8>>,
}

// state shared between the polling side and the runtime thread
struct Shared {
    local_peer_id: PeerId,
    connect_timeout: Duration,
    max_frame_length: usize,
    next_link_id: AtomicU64,
    links: Mutex<HashMap<PeerId, Link>>,
    inbound: Mutex<VecDeque<TransportEvent>>,
}

/// Peer-to-peer links over TCP. Frames are newline-delimited JSON
/// [`WireMessage`]s, and every link opens with a `hello` naming the sender.
///
/// Sockets live on a tokio runtime in a background thread; events are
/// queued there and handed out by `receive` on the polling side.
pub struct TcpTransport {
    local_peer_id: PeerId,
    local_addr: SocketAddr,
    roster: Roster,
    addresses: HashMap<PeerId, SocketAddr>,
    shared: Arc<Shared>,
    dials: mpsc::UnboundedSender<DialRequest>,
}

impl TcpTransport {
    pub fn listen(config: &TcpConfig, local_peer_id: impl Into<PeerId>) -> Result<Self, TransportError> {
        let local_peer_id = local_peer_id.into();
        let listener = StdTcpListener::bind(config.listen_addr).map_err(io_error)?;
        listener.set_nonblocking(true).map_err(io_error)?;
        let local_addr = listener.local_addr().map_err(io_error)?;

        let shared = Arc::new(Shared {
            local_peer_id: local_peer_id.clone(),
            connect_timeout: config.connect_timeout,
            max_frame_length: config.max_frame_length,
            next_link_id: AtomicU64::new(0),
            links: Mutex::new(HashMap::new()),
            inbound: Mutex::new(VecDeque::new()),
        });
        let (dials, dial_receiver) = mpsc::unbounded_channel();
        spawn_runtime(listener, dial_receiver, shared.clone());

        Ok(Self {
            local_peer_id,
            local_addr,
            roster: Roster::new(),
            addresses: HashMap::new(),
            shared,
            dials,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Makes `peer_id` reachable through `connect`
    pub fn add_peer_address(&mut self, peer_id: impl Into<PeerId>, address: SocketAddr) {
        self.addresses.insert(peer_id.into(), address);
    }

    /// Dials an address whose peer id is not known yet. The id is learned
    /// from the handshake.
    pub fn dial(&self, address: SocketAddr) -> Result<(), TransportError> {
        self.request_dial(address, None)
    }

    fn request_dial(&self, address: SocketAddr, expected: Option<PeerId>) -> Result<(), TransportError> {
        self.dials
            .send((address, expected))
            .map_err(|_| TransportError::Io {
                reason: "transport runtime has stopped".to_string(),
            })
    }
}

impl Transport for TcpTransport {
    fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    fn roster(&self) -> Roster {
        self.roster.clone()
    }

    fn connect(&mut self, target: &PeerId) -> Result<(), TransportError> {
        if *target == self.local_peer_id {
            return Err(TransportError::SelfConnect {
                peer_id: target.to_string(),
            });
        }
        if lock(&self.shared.links).contains_key(target) {
            return Ok(());
        }
        let Some(address) = self.addresses.get(target).copied() else {
            return Err(TransportError::UnknownPeer {
                peer_id: target.to_string(),
            });
        };
        self.request_dial(address, Some(target.clone()))
    }

    fn disconnect(&mut self, peer_id: &PeerId) {
        // dropping the sender ends the writer task, which closes our half
        if lock(&self.shared.links).remove(peer_id).is_some() {
            debug!("Closing link to {}", peer_id);
        }
    }

    fn send(&mut self, peer_id: &PeerId, event: &NetworkEvent) -> Result<(), TransportError> {
        let bytes = WireMessage::Event(event.clone()).encode()?;
        let links = lock(&self.shared.links);
        let Some(link) = links.get(peer_id) else {
            return Err(TransportError::NotConnected {
                peer_id: peer_id.to_string(),
            });
        };
        link.frames
            .send(bytes)
            .map_err(|_| TransportError::NotConnected {
                peer_id: peer_id.to_string(),
            })
    }

    fn receive(&mut self) -> Option<TransportEvent> {
        let event = lock(&self.shared.inbound).pop_front()?;
        match &event {
            TransportEvent::Connected(peer_id) => {
                self.roster.insert(peer_id);
            }
            TransportEvent::Disconnected(peer_id) => {
                self.roster.remove(peer_id);
            }
            TransportEvent::Message(..) => {}
        }
        Some(event)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        lock(&self.shared.links).clear();
    }
}

fn spawn_runtime(
    listener: StdTcpListener,
    mut dials: mpsc::UnboundedReceiver<DialRequest>,
    shared: Arc<Shared>,
) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Failed to create tokio runtime: {}", e);
                return;
            }
        };

        runtime.block_on(async move {
            let listener = match TcpListener::from_std(listener) {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to register TCP listener: {}", e);
                    return;
                }
            };
            info!(
                "Peer {} listening on {:?}",
                shared.local_peer_id,
                listener.local_addr()
            );

            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, address)) => {
                            debug!("Incoming TCP connection from {}", address);
                            tokio::spawn(run_link(stream, None, shared.clone()));
                        }
                        Err(e) => warn!("Failed to accept TCP connection: {}", e),
                    },
                    request = dials.recv() => match request {
                        Some((address, expected)) => {
                            tokio::spawn(dial(address, expected, shared.clone()));
                        }
                        None => {
                            info!("Peer {} transport closed", shared.local_peer_id);
                            break;
                        }
                    },
                }
            }
        });
    });
}

async fn dial(address: SocketAddr, expected: Option<PeerId>, shared: Arc<Shared>) {
    match tokio::time::timeout(shared.connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => run_link(stream, expected, shared).await,
        Ok(Err(e)) => warn!("Failed to connect to {}: {}", address, e),
        Err(_) => warn!("Timed out connecting to {}", address),
    }
}

async fn run_link(stream: TcpStream, expected: Option<PeerId>, shared: Arc<Shared>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let hello = WireMessage::Hello {
        peer_id: shared.local_peer_id.clone(),
    };
    let sent = match hello.encode() {
        Ok(bytes) => write_frame(&mut write_half, &bytes).await.map_err(io_error),
        Err(error) => Err(error),
    };
    if let Err(error) = sent {
        warn!("Handshake failed: {}", error);
        return;
    }

    let remote = match read_frame(&mut reader, shared.max_frame_length).await {
        Ok(Some(bytes)) => match WireMessage::decode(&bytes) {
            Ok(WireMessage::Hello { peer_id }) => peer_id,
            Ok(WireMessage::Event(event)) => {
                warn!("Expected hello, got {}", event.event_name);
                return;
            }
            Err(error) => {
                warn!("Handshake failed: {}", error);
                return;
            }
        },
        Ok(None) => return,
        Err(error) => {
            warn!("Handshake failed: {}", error);
            return;
        }
    };
    if remote == shared.local_peer_id {
        warn!("Refusing link to own peer id {}", remote);
        return;
    }
    if let Some(expected) = &expected {
        if *expected != remote {
            warn!("Dialed {} but {} answered", expected, remote);
            return;
        }
    }

    let link_id = shared.next_link_id.fetch_add(1, Ordering::Relaxed);
    let (frames, frame_receiver) = mpsc::unbounded_channel();
    {
        let mut links = lock(&shared.links);
        if links.contains_key(&remote) {
            debug!("Already linked to {}, dropping duplicate", remote);
            return;
        }
        links.insert(remote.clone(), Link { id: link_id, frames });
    }
    lock(&shared.inbound).push_back(TransportEvent::Connected(remote.clone()));
    tokio::spawn(write_loop(write_half, frame_receiver));

    read_loop(&mut reader, &remote, &shared).await;

    {
        let mut links = lock(&shared.links);
        if links.get(&remote).map_or(false, |link| link.id == link_id) {
            links.remove(&remote);
        }
    }
    lock(&shared.inbound).push_back(TransportEvent::Disconnected(remote));
}

async fn read_loop(reader: &mut BufReader<OwnedReadHalf>, remote: &PeerId, shared: &Shared) {
    loop {
        match read_frame(reader, shared.max_frame_length).await {
            Ok(Some(bytes)) => match WireMessage::decode(&bytes) {
                Ok(WireMessage::Event(mut event)) => {
                    event.send_from = remote.clone();
                    lock(&shared.inbound).push_back(TransportEvent::Message(remote.clone(), event));
                }
                Ok(WireMessage::Hello { .. }) => trace!("Repeated hello from {}", remote),
                Err(error) => warn!("Dropping frame from {}: {}", remote, error),
            },
            Ok(None) => {
                debug!("{} closed the link", remote);
                break;
            }
            Err(error) => {
                warn!("Closing link to {}: {}", remote, error);
                break;
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = frames.recv().await {
        if let Err(e) = write_frame(&mut writer, &bytes).await {
            warn!("Failed to write frame: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_frame(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Next newline-terminated frame, `None` at end of stream
async fn read_frame(
    reader: &mut BufReader<OwnedReadHalf>,
    limit: usize,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut line)
        .await
        .map_err(io_error)?;
    if read == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.len() > limit {
        return Err(TransportError::FrameTooLarge {
            length: line.len(),
            limit,
        });
    }
    Ok(Some(line))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn io_error(error: std::io::Error) -> TransportError {
    TransportError::Io {
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;

    use super::*;

    fn config() -> TcpConfig {
        TcpConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..TcpConfig::default()
        }
    }

    fn wait_for(transport: &mut TcpTransport) -> TransportEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = transport.receive() {
                return event;
            }
            assert!(Instant::now() < deadline, "timed out waiting for transport event");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn peers_link_and_exchange_events() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init()
            .ok();

        let mut alice = TcpTransport::listen(&config(), "alice").unwrap();
        let mut bob = TcpTransport::listen(&config(), "bob").unwrap();
        alice.add_peer_address("bob", bob.local_addr());

        alice.connect(&PeerId::from("bob")).unwrap();

        assert_eq!(wait_for(&mut alice), TransportEvent::Connected(PeerId::from("bob")));
        assert_eq!(wait_for(&mut bob), TransportEvent::Connected(PeerId::from("alice")));
        assert!(alice.roster().contains(&PeerId::from("bob")));

        let event = NetworkEvent {
            event_name: "PING".to_string(),
            data: json!({ "n": 1 }),
            send_from: PeerId::from("someone-else"),
        };
        alice.send(&PeerId::from("bob"), &event).unwrap();

        match wait_for(&mut bob) {
            TransportEvent::Message(from, received) => {
                assert_eq!(from, PeerId::from("alice"));
                assert_eq!(received.event_name, "PING");
                assert_eq!(received.send_from, PeerId::from("alice"));
                assert_eq!(received.data, json!({ "n": 1 }));
            }
            other => panic!("unexpected event {:?}", other),
        }

        alice.disconnect(&PeerId::from("bob"));
        assert_eq!(wait_for(&mut bob), TransportEvent::Disconnected(PeerId::from("alice")));
        assert_eq!(wait_for(&mut alice), TransportEvent::Disconnected(PeerId::from("bob")));
        assert!(!alice.roster().contains(&PeerId::from("bob")));
    }

    #[test]
    fn connect_needs_known_address() {
        let mut alice = TcpTransport::listen(&config(), "alice").unwrap();
        assert!(matches!(
            alice.connect(&PeerId::from("nobody")),
            Err(TransportError::UnknownPeer { .. })
        ));
        assert!(matches!(
            alice.connect(&PeerId::from("alice")),
            Err(TransportError::SelfConnect { .. })
        ));
        assert!(matches!(
            alice.send(&PeerId::from("nobody"), &NetworkEvent {
                event_name: "PING".to_string(),
                data: json!(null),
                send_from: PeerId::from("alice"),
            }),
            Err(TransportError::NotConnected { .. })
        ));
    }
}
