//! TCP transport: a peer's identity is the socket address it listens on.
//!
//! The dialing side opens with a hello frame `{"peer": "<its identity>"}` so
//! the accepting side knows who connected. Everything after that is one JSON
//! message per frame.

use super::errors::{TransportError, TransportErrorKind};
use super::transport::{ConnectionId, PeerIdentity, Transport, TransportEvent};
use super::wire::{FrameCodec, WireConfig, WireProtocolError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    peer: String,
}

struct ConnectionHandle {
    outgoing: mpsc::UnboundedSender<String>,
    stop: broadcast::Sender<()>,
}

type ConnectionMap = Arc<Mutex<HashMap<ConnectionId, ConnectionHandle>>>;

fn lock(connections: &ConnectionMap) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
    connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared pieces every connection task needs
#[derive(Clone)]
struct Shared {
    codec: FrameCodec,
    events: mpsc::UnboundedSender<TransportEvent>,
    connections: ConnectionMap,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Transport event receiver dropped");
        }
    }
}

pub struct TcpTransport {
    id: Option<PeerIdentity>,
    shared: Shared,
    next_conn: Arc<AtomicU64>,
    shutdown: broadcast::Sender<()>,
}

impl TcpTransport {
    /// Listen on `addr` and start accepting peers
    ///
    /// On success `Open` is queued on `events` with the bound address as
    /// identity. Failure to bind maps onto the transport error taxonomy.
    #[instrument(skip(config, events))]
    pub async fn bind(
        addr: &str,
        config: WireConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            let kind = match e.kind() {
                std::io::ErrorKind::AddrInUse => TransportErrorKind::UnavailableId,
                std::io::ErrorKind::AddrNotAvailable | std::io::ErrorKind::InvalidInput => {
                    TransportErrorKind::InvalidId
                }
                _ => TransportErrorKind::SocketError,
            };
            TransportError::new(kind, format!("failed to bind {}: {}", addr, e))
        })?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::new(TransportErrorKind::SocketError, e.to_string()))?;
        let id = PeerIdentity::new(local.to_string());
        info!(%id, "Listening for peers");

        let shared = Shared {
            codec: FrameCodec::new(config),
            events,
            connections: Arc::new(Mutex::new(HashMap::new())),
        };
        let next_conn = Arc::new(AtomicU64::new(1));
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        shared.emit(TransportEvent::Open { id: id.clone() });
        tokio::spawn(accept_loop(
            listener,
            shared.clone(),
            next_conn.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            id: Some(id),
            shared,
            next_conn,
            shutdown,
        })
    }
}

impl Transport for TcpTransport {
    fn id(&self) -> Option<&PeerIdentity> {
        self.id.as_ref()
    }

    fn connect(&mut self, target: &PeerIdentity) -> ConnectionId {
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let Some(me) = self.id.clone() else {
            self.shared.emit(TransportEvent::error(
                TransportErrorKind::Disconnected,
                "transport destroyed",
            ));
            return conn;
        };

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = broadcast::channel(1);
        lock(&self.shared.connections).insert(conn, ConnectionHandle { outgoing, stop });

        tokio::spawn(dial(
            conn,
            me,
            target.clone(),
            self.shared.clone(),
            outgoing_rx,
            stop_rx,
        ));
        conn
    }

    fn send(&mut self, conn: ConnectionId, payload: String) {
        match lock(&self.shared.connections).get(&conn) {
            Some(handle) => {
                if handle.outgoing.send(payload).is_err() {
                    debug!(conn, "Writer already finished");
                }
            }
            None => debug!(conn, "Send on unknown connection"),
        }
    }

    fn close(&mut self, conn: ConnectionId) {
        if let Some(handle) = lock(&self.shared.connections).remove(&conn) {
            debug!(conn, "Closing connection");
            let _ = handle.stop.send(());
        }
    }

    fn destroy(&mut self) {
        if let Some(id) = self.id.take() {
            info!(%id, "Shutting down transport");
        }
        let _ = self.shutdown.send(());
        let handles: Vec<ConnectionHandle> = lock(&self.shared.connections)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            let _ = handle.stop.send(());
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Shared,
    next_conn: Arc<AtomicU64>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("Accept loop stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(%addr, "Accepted TCP stream");
                    let conn = next_conn.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(accept_peer(conn, stream, shared.clone()));
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            }
        }
    }
}

#[instrument(skip(stream, shared))]
async fn accept_peer(conn: ConnectionId, stream: TcpStream, shared: Shared) {
    let (mut reader, writer) = stream.into_split();
    let handshake_timeout = shared.codec.config().handshake_timeout;
    let hello = match shared
        .codec
        .read_frame_within(&mut reader, handshake_timeout)
        .await
    {
        Ok(frame) => serde_json::from_str::<Hello>(&frame),
        Err(e) => {
            warn!(error = %e, "No hello from connecting peer");
            return;
        }
    };
    let remote = match hello {
        Ok(hello) => PeerIdentity::new(hello.peer),
        Err(e) => {
            warn!(error = %e, "Malformed hello frame");
            return;
        }
    };

    let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
    let (stop, stop_rx) = broadcast::channel(1);
    lock(&shared.connections).insert(conn, ConnectionHandle { outgoing, stop });

    info!(%remote, "Peer connected");
    shared.emit(TransportEvent::IncomingConnection {
        conn,
        remote: remote.clone(),
    });
    shared.emit(TransportEvent::ConnectionOpen { conn, remote });
    run_connection(conn, reader, writer, shared, outgoing_rx, stop_rx).await;
}

#[instrument(skip(shared, outgoing_rx, stop_rx))]
async fn dial(
    conn: ConnectionId,
    me: PeerIdentity,
    target: PeerIdentity,
    shared: Shared,
    outgoing_rx: mpsc::UnboundedReceiver<String>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let handshake_timeout = shared.codec.config().handshake_timeout;
    let connect = async {
        let mut stream = TcpStream::connect(target.as_str()).await?;
        let hello = serde_json::to_string(&Hello {
            peer: me.to_string(),
        })
        .map_err(|e| WireProtocolError::CorruptedData {
            reason: e.to_string(),
        })?;
        shared.codec.write_frame(&mut stream, &hello).await?;
        Ok::<_, WireProtocolError>(stream)
    };

    let stream = tokio::select! {
        _ = stop_rx.recv() => {
            debug!("Dial abandoned");
            shared.emit(TransportEvent::ConnectionClosed { conn });
            return;
        }
        result = tokio::time::timeout(handshake_timeout, connect) => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                lock(&shared.connections).remove(&conn);
                shared.emit(TransportEvent::error(
                    TransportErrorKind::PeerUnavailable,
                    format!("could not connect to peer {}: {}", target, e),
                ));
                return;
            }
            Err(_) => {
                lock(&shared.connections).remove(&conn);
                shared.emit(TransportEvent::error(
                    TransportErrorKind::PeerUnavailable,
                    format!("timed out connecting to peer {}", target),
                ));
                return;
            }
        }
    };

    info!(%target, "Connected to peer");
    let (reader, writer) = stream.into_split();
    shared.emit(TransportEvent::ConnectionOpen {
        conn,
        remote: target,
    });
    run_connection(conn, reader, writer, shared, outgoing_rx, stop_rx).await;
}

async fn run_connection(
    conn: ConnectionId,
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    shared: Shared,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let codec = shared.codec.clone();
    let writer_task = tokio::spawn(async move {
        while let Some(payload) = outgoing_rx.recv().await {
            if let Err(e) = codec.write_frame(&mut writer, &payload).await {
                warn!(conn, error = %e, "Failed to write frame");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            frame = shared.codec.next_frame(&mut reader) => match frame {
                Ok(payload) => shared.emit(TransportEvent::ConnectionData { conn, payload }),
                Err(WireProtocolError::ConnectionClosed) => {
                    debug!(conn, "Peer closed the connection");
                    break;
                }
                Err(e) => {
                    shared.emit(TransportEvent::ConnectionError {
                        conn,
                        description: e.to_string(),
                    });
                    break;
                }
            }
        }
    }

    // Dropping the handle ends the writer, which shuts down our write half
    lock(&shared.connections).remove(&conn);
    if let Err(e) = writer_task.await {
        debug!(conn, error = %e, "Writer task ended abnormally");
    }
    shared.emit(TransportEvent::ConnectionClosed { conn });
}
