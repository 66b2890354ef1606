//! Scripted sockets for exercising the transport session without a network.
//!
//! A [`ScriptedSocket`] plays back a list of datagrams and receive errors,
//! then reports a timeout on every further receive. Sends are recorded; one
//! send index can be made to fail. A [`ScriptedSocketFactory`] hands out
//! queued sockets in order, can fail the first few binds and records when
//! each bind was attempted.
//!
//! ```ignore
//! let factory = Arc::new(ScriptedSocketFactory::new());
//! factory.fail_next_binds(2);
//! factory.push_socket(ScriptedSocket::new().with_datagrams(vec![(b"hi".to_vec(), host)]));
//! ```

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::application::lock;
use crate::application::ports::{DatagramSocket, SocketFactory};

/// How long an empty [`ScriptedSocket`] blocks before reporting a timeout.
const IDLE_RECV: Duration = Duration::from_millis(5);

enum RecvStep {
    Datagram(Vec<u8>, SocketAddrV4),
    Error(io::ErrorKind),
}

/// A socket that replays datagrams and records sends.
#[derive(Default)]
pub struct ScriptedSocket {
    incoming: Mutex<VecDeque<RecvStep>>,
    sent: Mutex<Vec<(Vec<u8>, SocketAddrV4)>>,
    fail_send_at: Option<usize>,
}

impl ScriptedSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues datagrams for `recv_from`. An empty payload ends the session.
    pub fn with_datagrams(self, datagrams: Vec<(Vec<u8>, SocketAddrV4)>) -> Self {
        lock(&self.incoming).extend(
            datagrams
                .into_iter()
                .map(|(payload, from)| RecvStep::Datagram(payload, from)),
        );
        self
    }


    /// Makes the send with this zero-based index fail.
    pub fn fail_send_at(mut self, index: usize) -> Self {
        self.fail_send_at = Some(index);
        self
    }

    /// Queues one more datagram on a live socket.
    pub fn push_datagram(&self, payload: &[u8], from: SocketAddrV4) {
        lock(&self.incoming).push_back(RecvStep::Datagram(payload.to_vec(), from));
    }

    /// Queues a receive error on a live socket, after any pending datagrams.
    pub fn push_recv_error(&self, kind: io::ErrorKind) {
        lock(&self.incoming).push_back(RecvStep::Error(kind));
    }

    /// Every successful send so far, in order.
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddrV4)> {
        lock(&self.sent).clone()
    }
}

impl DatagramSocket for ScriptedSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let next = lock(&self.incoming).pop_front();
        match next {
            Some(RecvStep::Datagram(payload, from)) => {
                let len = payload.len().min(buf.len());
                buf[..len].copy_from_slice(&payload[..len]);
                Ok((len, SocketAddr::V4(from)))
            }
            Some(RecvStep::Error(kind)) => Err(io::Error::from(kind)),
            None => {
                thread::sleep(IDLE_RECV);
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
        }
    }

    fn send_to(&self, buf: &[u8], dest: SocketAddrV4) -> io::Result<usize> {
        let mut sent = lock(&self.sent);
        if self.fail_send_at == Some(sent.len()) {
            return Err(io::Error::other("scripted send failure"));
        }
        sent.push((buf.to_vec(), dest));
        Ok(buf.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
    }
}

/// Hands out [`ScriptedSocket`]s and counts bind attempts.
#[derive(Default)]
pub struct ScriptedSocketFactory {
    sockets: Mutex<VecDeque<Arc<ScriptedSocket>>>,
    failures_left: Mutex<usize>,
    binds: Mutex<Vec<Instant>>,
    bound: Condvar,
}

impl ScriptedSocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a socket for a future successful bind.
    pub fn push_socket(&self, socket: ScriptedSocket) -> Arc<ScriptedSocket> {
        let socket = Arc::new(socket);
        lock(&self.sockets).push_back(Arc::clone(&socket));
        socket
    }

    /// Makes the next `n` binds fail with `AddrInUse`.
    pub fn fail_next_binds(&self, n: usize) {
        *lock(&self.failures_left) = n;
    }

    /// Bind attempts so far, failed ones included.
    pub fn binds(&self) -> usize {
        lock(&self.binds).len()
    }

    /// When each bind attempt started, oldest first.
    pub fn bind_times(&self) -> Vec<Instant> {
        lock(&self.binds).clone()
    }

    /// Blocks until at least `n` binds were attempted or `timeout` passes.
    pub fn wait_for_binds(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut binds = lock(&self.binds);
        while binds.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            binds = match self.bound.wait_timeout(binds, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl SocketFactory for ScriptedSocketFactory {
    fn bind(&self, _addr: SocketAddrV4) -> io::Result<Arc<dyn DatagramSocket>> {
        {
            lock(&self.binds).push(Instant::now());
            self.bound.notify_all();
        }

        let mut failures = lock(&self.failures_left);
        if *failures > 0 {
            *failures -= 1;
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }
        drop(failures);

        let socket = lock(&self.sockets)
            .pop_front()
            .unwrap_or_else(|| Arc::new(ScriptedSocket::new()));
        Ok(socket as Arc<dyn DatagramSocket>)
    }
}
