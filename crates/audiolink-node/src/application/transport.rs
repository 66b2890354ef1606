//! Transport session: the UDP socket loop and the send primitive.
//!
//! # Socket loop
//!
//! ```text
//! loop {
//!     bind 0.0.0.0:<port>         ── fails? wait bind_retry, try again
//!     client with a target?       ── mark socket ready
//!     receive until 0 bytes / error
//!     close, reset connection flags, wait reconnect_delay
//! }
//! ```
//!
//! Nothing in the loop is fatal. Create, bind and receive errors are logged
//! and retried forever; only the shutdown token ends it.
//!
//! # Receiving
//!
//! The first datagram of a session marks the peer connected. In client role
//! its sender becomes the target if none is set yet, and the socket is marked
//! ready. In host role the sender becomes the send destination.
//!
//! Payloads go to the registered RX callback. Without one they are queued,
//! up to [`RX_QUEUE_DEPTH`]; arrivals beyond that are dropped so the oldest
//! data is kept. Registering a callback drains the queue into it first.
//!
//! # Sending
//!
//! [`TransportSession::send`] splits the payload into fixed-size chunks and
//! sends them in order. The first failing chunk aborts the call.
//!
//! [`RX_QUEUE_DEPTH`]: audiolink_core::constants::RX_QUEUE_DEPTH

use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use audiolink_core::constants::{
    MAX_DATAGRAM_SIZE, RX_QUEUE_DEPTH, SEND_CHUNK_SIZE, TRANSPORT_STACK_SIZE,
};
use audiolink_core::protocol::chunk::{chunk_count, chunks};
use audiolink_core::{Role, SessionState, ShutdownToken, SignalError};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::bootstrap::{Bootstrap, BootstrapError};
use super::ports::{DatagramSocket, DeviceControl, SessionHandle, SocketFactory};
use super::{lock, pause, Timings};

/// Consumer of received payloads.
pub type RxCallback = Arc<dyn Fn(&[u8], SocketAddrV4) + Send + Sync>;

/// Errors returned by [`TransportSession::send`].
#[derive(Debug, Error)]
pub enum SendError {
    /// No peer endpoint is known, or the socket is not bound.
    #[error("not connected")]
    NotConnected,

    /// A chunk could not be sent. Later chunks were not attempted.
    #[error("send of chunk {index} of {total} failed after {sent} bytes: {source}")]
    Chunk {
        index: usize,
        total: usize,
        sent: usize,
        #[source]
        source: io::Error,
    },
}

/// A datagram held while no RX callback is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub from: SocketAddrV4,
}

/// The transport's socket session.
pub struct TransportSession {
    state: Arc<SessionState>,
    factory: Arc<dyn SocketFactory>,
    bind_addr: SocketAddrV4,
    timings: Timings,
    socket: Mutex<Option<Arc<dyn DatagramSocket>>>,
    peer_addr: Mutex<Option<SocketAddrV4>>,
    rx_callback: Mutex<Option<RxCallback>>,
    rx_tx: Sender<Datagram>,
    rx_rx: Receiver<Datagram>,
}

impl TransportSession {
    /// Creates an unbound session. Nothing happens until [`run`] is called.
    ///
    /// [`run`]: TransportSession::run
    pub fn new(
        state: Arc<SessionState>,
        factory: Arc<dyn SocketFactory>,
        bind_addr: SocketAddrV4,
        timings: Timings,
    ) -> Self {
        let (rx_tx, rx_rx) = crossbeam_channel::bounded(RX_QUEUE_DEPTH);
        Self {
            state,
            factory,
            bind_addr,
            timings,
            socket: Mutex::new(None),
            peer_addr: Mutex::new(None),
            rx_callback: Mutex::new(None),
            rx_tx,
            rx_rx,
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Whether a socket is currently bound.
    pub fn is_bound(&self) -> bool {
        lock(&self.socket).is_some()
    }

    /// Host role: the sender of the most recent datagram.
    pub fn peer_addr(&self) -> Option<SocketAddrV4> {
        *lock(&self.peer_addr)
    }

    /// Datagrams waiting for an RX callback.
    pub fn queued(&self) -> usize {
        self.rx_rx.len()
    }

    /// Registers the payload consumer, first handing it every queued
    /// datagram in arrival order.
    ///
    /// The callback runs on the transport thread and must not call back into
    /// this method.
    pub fn set_rx_callback(&self, cb: RxCallback) {
        let mut slot = lock(&self.rx_callback);
        while let Ok(datagram) = self.rx_rx.try_recv() {
            cb(&datagram.payload, datagram.from);
        }
        *slot = Some(cb);
    }

    /// Runs the socket loop until `shutdown` fires.
    pub fn run(&self, shutdown: &ShutdownToken) {
        while shutdown.is_running() {
            let socket = match self.factory.bind(self.bind_addr) {
                Ok(socket) => socket,
                Err(e) => {
                    error!("unable to bind socket on {}: {e}", self.bind_addr);
                    pause(self.timings.bind_retry, shutdown);
                    continue;
                }
            };

            info!("socket bound on port {}", self.bind_addr.port());
            *lock(&self.socket) = Some(Arc::clone(&socket));

            if self.state.role() == Role::Client && self.state.target().is_set() {
                self.state.target().mark_socket_ready();
            }

            self.receive_loop(socket.as_ref(), shutdown);

            *lock(&self.socket) = None;
            self.end_session();
            info!("socket closed");

            if shutdown.is_running() {
                pause(self.timings.reconnect_delay, shutdown);
            }
        }
        info!("transport session stopped");
    }

    fn receive_loop(&self, socket: &dyn DatagramSocket, shutdown: &ShutdownToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while shutdown.is_running() {
            match socket.recv_from(&mut buf) {
                Ok((0, _)) => {
                    info!("peer disconnected");
                    break;
                }
                Ok((len, SocketAddr::V4(from))) => self.on_datagram(&buf[..len], from),
                Ok((_, SocketAddr::V6(from))) => debug!("ignoring datagram from {from}"),
                Err(e) if is_timeout_error(&e) => continue,
                Err(e) => {
                    warn!("receive failed: {e}");
                    break;
                }
            }
        }
    }

    fn on_datagram(&self, payload: &[u8], from: SocketAddrV4) {
        if self.state.mark_connected() {
            info!("peer connected: {from}");
        }
        debug!("received {} bytes from {from}", payload.len());

        match self.state.role() {
            Role::Client => {
                self.state.target().set_if_unset(from);
                self.state.target().mark_socket_ready();
            }
            Role::Host => *lock(&self.peer_addr) = Some(from),
        }

        self.deliver(payload, from);
    }

    fn deliver(&self, payload: &[u8], from: SocketAddrV4) {
        let slot = lock(&self.rx_callback);
        if let Some(cb) = slot.clone() {
            drop(slot);
            cb(payload, from);
            return;
        }

        let datagram = Datagram {
            payload: payload.to_vec(),
            from,
        };
        match self.rx_tx.try_send(datagram) {
            Ok(()) => {}
            Err(TrySendError::Full(d)) => {
                debug!("rx queue full, dropping {} bytes from {from}", d.payload.len());
            }
            Err(TrySendError::Disconnected(_)) => warn!("rx queue closed"),
        }
    }

    /// Resets connection state after the receive loop ends.
    fn end_session(&self) {
        self.state.clear_connected();
        match self.state.role() {
            Role::Client => self.state.target().end_socket_cycle(),
            Role::Host => *lock(&self.peer_addr) = None,
        }
    }

    /// Sends `payload` to the peer in chunks.
    ///
    /// Returns the number of bytes sent.
    ///
    /// # Errors
    ///
    /// [`SendError::NotConnected`] when there is no destination (host role:
    /// no connected peer; client role: no target) or no bound socket; no I/O
    /// is attempted. [`SendError::Chunk`] for the first chunk that fails.
    pub fn send(&self, payload: &[u8]) -> Result<usize, SendError> {
        let dest = match self.state.role() {
            Role::Host if self.state.is_connected() => self.peer_addr(),
            Role::Host => None,
            Role::Client => self.state.target().target(),
        }
        .ok_or(SendError::NotConnected)?;
        let socket = lock(&self.socket).clone().ok_or(SendError::NotConnected)?;

        let total = chunk_count(payload.len(), SEND_CHUNK_SIZE);
        debug!("sending {} bytes to {dest} in {total} chunks", payload.len());

        let mut sent = 0;
        for (index, chunk) in chunks(payload, SEND_CHUNK_SIZE).enumerate() {
            sent += socket
                .send_to(chunk, dest)
                .map_err(|source| SendError::Chunk {
                    index,
                    total,
                    sent,
                    source,
                })?;
        }
        Ok(sent)
    }
}

impl SessionHandle for TransportSession {
    fn handle_peer_disconnect(&self) {
        info!("peer disconnected, keeping socket open for the next peer");
        self.state.clear_connected();
        *lock(&self.peer_addr) = None;
    }
}

/// Starts the transport thread: bootstrap, then the socket loop.
///
/// A bootstrap failure other than shutdown is fatal and restarts the device.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn(
    session: Arc<TransportSession>,
    bootstrap: Bootstrap,
    device: Arc<dyn DeviceControl>,
    shutdown: ShutdownToken,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("audiolink-transport".to_string())
        .stack_size(TRANSPORT_STACK_SIZE)
        .spawn(move || match bootstrap.run(&shutdown) {
            Ok(()) => session.run(&shutdown),
            Err(BootstrapError::Wait(SignalError::Cancelled(gate))) => {
                info!("bootstrap cancelled while waiting for {gate}");
            }
            Err(e) => {
                error!("bootstrap failed: {e}");
                device.restart(&format!("bootstrap failed: {e}"));
            }
        })
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
