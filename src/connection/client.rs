//! Connection Lifecycle
//!
//! A `Connection` owns one TCP session to the administration interface and
//! moves through a small state machine:
//!
//! ```text
//!  connect()          handshake()            start_keepalive()
//! ──────────> Unauthenticated ──────> Ready ──────────────────> KeepaliveActive
//!                   │                   │  <──────────────────        │
//!                   │                   │     stop_keepalive()        │
//!                   │ close()           │ close()                     │ close()
//!                   ▼                   ▼                             ▼
//!                 Closed  <──────────────────────────────────────────┘
//! ```
//!
//! Every transition that does not apply to the current state is a no-op, so
//! `close` can be called on a connection whose handshake failed, and twice.
//!
//! ## Ordering
//!
//! The protocol has no request IDs. Commands are therefore serialized through
//! one async mutex that is held for the whole write-then-read round trip; the
//! keepalive task goes through the same lock. Whoever acquires the lock is
//! fully served before the next caller writes anything.
//!
//! `cmd` runs its round trip on a spawned task. Dropping the `cmd` future, for
//! example from a `timeout`, abandons the result but not the exchange: the
//! response is still read before the lock is released. If the stream ever
//! loses track of where a response ends, every later command fails with
//! [`ClientError::Desynchronized`].

use crate::config::ClientConfig;
use crate::connection::auth::{challenge_from_greeting, challenge_response, AUTH_COMMAND};
use crate::connection::keepalive::Keepalive;
use crate::connection::stats::ConnectionStats;
use crate::connection::wire::Wire;
use crate::protocol::{ParseError, Request, Response, Status};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Errors returned by connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The TCP connection could not be established
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection was not established within the connect timeout
    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// I/O error while writing a request or reading a response
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent bytes that are not a valid response frame
    #[error("framing error: {0}")]
    Parse(#[from] ParseError),

    /// An earlier exchange did not finish cleanly, so responses can no
    /// longer be matched to commands
    #[error("connection lost response framing, reconnect")]
    Desynchronized,

    /// The task running the round trip panicked or was cancelled
    #[error("command task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The server closed the connection before a full response arrived
    #[error("connection closed by the server")]
    UnexpectedEof,

    /// The greeting status does not match whether a secret was configured
    #[error("greeting returned status {status}, expected {expected}")]
    UnexpectedGreeting { status: Status, expected: Status },

    /// The server did not accept the challenge response
    #[error("authentication failed with status {status}")]
    AuthRejected { status: Status },

    /// A previous handshake on this connection failed
    #[error("handshake already failed on this connection")]
    HandshakeFailed,

    /// The connection has been closed
    #[error("connection is closed")]
    Closed,
}

impl ClientError {
    /// Returns true for errors raised by the authentication handshake.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ClientError::UnexpectedGreeting { .. }
                | ClientError::AuthRejected { .. }
                | ClientError::HandshakeFailed
        )
    }

    /// Returns true if the stream is still on a frame boundary after this
    /// error, so the next command can be sent safely.
    pub(crate) fn leaves_stream_aligned(&self) -> bool {
        match self {
            ClientError::UnexpectedGreeting { .. } | ClientError::AuthRejected { .. } => true,
            ClientError::Parse(e) => e.frame_len().is_some(),
            _ => false,
        }
    }
}

/// Lifecycle state reported by [`Connection::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, greeting not yet processed
    Unauthenticated,
    /// Handshake completed
    Ready,
    /// Handshake completed and a keepalive task is running
    KeepaliveActive,
    /// Closed, no further commands are possible
    Closed,
}

enum State {
    Unauthenticated { attempted: bool },
    Ready,
    KeepaliveActive(Keepalive),
    Closed,
}

impl State {
    fn kind(&self) -> ConnectionState {
        match self {
            State::Unauthenticated { .. } => ConnectionState::Unauthenticated,
            State::Ready => ConnectionState::Ready,
            State::KeepaliveActive(_) => ConnectionState::KeepaliveActive,
            State::Closed => ConnectionState::Closed,
        }
    }
}

/// The socket behind its command lock, shared with the keepalive task.
pub(crate) struct Channel {
    /// `None` once the connection has been closed
    wire: tokio::sync::Mutex<Option<Wire<TcpStream>>>,
    pub(crate) stats: ConnectionStats,
    peer: SocketAddr,
}

impl Channel {
    /// Writes one command and reads its response while holding the lock.
    pub(crate) async fn round_trip(
        &self,
        command: &str,
        args: &[&str],
    ) -> Result<Response, ClientError> {
        let mut guard = self.wire.lock().await;
        let wire = guard.as_mut().ok_or(ClientError::Closed)?;
        wire.round_trip(&Request::new(command, args), &self.stats)
            .await
    }

    /// Takes the socket out of the channel and shuts it down.
    async fn shutdown(&self) -> std::io::Result<()> {
        let wire = self.wire.lock().await.take();
        match wire {
            Some(mut wire) => match wire.shutdown().await {
                Err(e) if peer_already_gone(&e) => {
                    debug!(peer = %self.peer, error = %e, "Socket already closed by peer");
                    Ok(())
                }
                other => other,
            },
            None => Ok(()),
        }
    }
}

fn peer_already_gone(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::NotConnected | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
    )
}

/// A session with the administration interface.
///
/// `Connection` is `Send + Sync`; wrap it in an `Arc` to issue commands
/// from several tasks at once.
///
/// # Example
///
/// ```ignore
/// use vcli::{ClientConfig, Connection};
/// use std::time::Duration;
///
/// let config = ClientConfig::new("127.0.0.1", 6082).with_secret_file("/etc/varnish/secret")?;
/// let conn = Connection::open(&config).await?;
///
/// let response = conn.cmd("vcl.list", &[]).await?;
/// println!("{}", response.body);
///
/// conn.start_keepalive(Duration::from_secs(30));
/// // ...
/// conn.close().await?;
/// ```
pub struct Connection {
    channel: Arc<Channel>,
    state: Mutex<State>,
    secret: Option<String>,
}

impl Connection {
    /// Connects and performs the handshake.
    ///
    /// If the handshake fails the socket is shut down before the error is
    /// returned. Use [`Connection::connect`] and [`Connection::handshake`]
    /// to keep the connection object around after a failed handshake.
    pub async fn open(config: &ClientConfig) -> Result<Self, ClientError> {
        let conn = Self::connect(config).await?;
        if let Err(e) = conn.handshake().await {
            if let Err(close_err) = conn.close().await {
                debug!(error = %close_err, "Close after failed handshake");
            }
            return Err(e);
        }
        Ok(conn)
    }

    /// Establishes the TCP connection without reading the greeting.
    ///
    /// Fails immediately if the connection cannot be made within the
    /// configured timeout. There is no retry.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let addr = config.address();
        debug!(remote = %addr, "Connecting");

        let stream =
            match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
                Err(_) => {
                    return Err(ClientError::ConnectTimeout {
                        addr,
                        timeout: config.connect_timeout,
                    })
                }
            };

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!(peer = %peer, "Connected");

        Ok(Self {
            channel: Arc::new(Channel {
                wire: tokio::sync::Mutex::new(Some(Wire::new(stream, config.log_traffic))),
                stats: ConnectionStats::new(),
                peer,
            }),
            state: Mutex::new(State::Unauthenticated { attempted: false }),
            secret: config.secret.clone(),
        })
    }

    /// Reads the server greeting and authenticates if a secret is configured.
    ///
    /// Without a secret the greeting must be 200. With a secret it must be
    /// 107, and the digest computed from its challenge must be accepted with
    /// 200. The greeting and the `auth` exchange happen under the command
    /// lock, so no other command can slip in between.
    ///
    /// Does nothing if the handshake already completed. The greeting is only
    /// sent once, so after a failed attempt this returns
    /// [`ClientError::HandshakeFailed`]; close the connection and open a new one.
    pub async fn handshake(&self) -> Result<(), ClientError> {
        let mut guard = self.channel.wire.lock().await;

        match &*self.lock_state() {
            State::Unauthenticated { attempted: false } => {}
            State::Unauthenticated { attempted: true } => {
                return Err(ClientError::HandshakeFailed)
            }
            State::Closed => return Err(ClientError::Closed),
            State::Ready | State::KeepaliveActive(_) => return Ok(()),
        }

        let wire = guard.as_mut().ok_or(ClientError::Closed)?;
        let result = match wire.begin() {
            Ok(()) => {
                let result = self.authenticate(wire).await;
                wire.settle(&result);
                result
            }
            Err(e) => Err(e),
        };

        let mut state = self.lock_state();
        match result {
            Ok(()) => {
                if matches!(*state, State::Unauthenticated { .. }) {
                    *state = State::Ready;
                }
                info!(
                    peer = %self.channel.peer,
                    authenticated = self.secret.is_some(),
                    "Handshake complete"
                );
                Ok(())
            }
            Err(e) => {
                if matches!(*state, State::Unauthenticated { .. }) {
                    *state = State::Unauthenticated { attempted: true };
                }
                warn!(peer = %self.channel.peer, error = %e, "Handshake failed");
                Err(e)
            }
        }
    }

    async fn authenticate(&self, wire: &mut Wire<TcpStream>) -> Result<(), ClientError> {
        let stats = &self.channel.stats;
        let greeting = wire.read_response(stats).await?;

        match (&self.secret, greeting.status) {
            (None, Status::Ok) => Ok(()),
            (None, status) => Err(ClientError::UnexpectedGreeting {
                status,
                expected: Status::Ok,
            }),
            (Some(secret), Status::Auth) => {
                let challenge = challenge_from_greeting(&greeting.body);
                let digest = challenge_response(challenge, secret);
                wire.write_request(&Request::new(AUTH_COMMAND, &[digest.as_str()]), stats)
                    .await?;
                let response = wire.read_response(stats).await?;
                if response.is_success() {
                    Ok(())
                } else {
                    Err(ClientError::AuthRejected {
                        status: response.status,
                    })
                }
            }
            (Some(_), status) => Err(ClientError::UnexpectedGreeting {
                status,
                expected: Status::Auth,
            }),
        }
    }

    /// Sends a command and returns the server's response.
    ///
    /// The command and arguments are joined with single spaces and sent as
    /// one line; nothing is escaped. Safe to call from many tasks at once.
    ///
    /// A non-200 status is not an error here; check [`Response::is_success`].
    ///
    /// Once the request is queued it runs to completion even if this future
    /// is dropped, so the connection stays usable after a caller times out.
    pub async fn cmd(&self, command: &str, args: &[&str]) -> Result<Response, ClientError> {
        let channel = Arc::clone(&self.channel);
        let command = command.to_string();
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();

        tokio::spawn(async move {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            channel.round_trip(&command, &args).await
        })
        .await?
    }

    /// Starts sending `ping` every `interval`.
    ///
    /// Responses and errors are discarded. Returns `false` without doing
    /// anything unless the connection is `Ready`, the interval is non-zero
    /// and a Tokio runtime is available.
    pub fn start_keepalive(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!("Ignoring keepalive with a zero interval");
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("Ignoring keepalive outside of a Tokio runtime");
            return false;
        }

        let mut state = self.lock_state();
        if !matches!(*state, State::Ready) {
            debug!(state = ?state.kind(), "Keepalive not started");
            return false;
        }
        *state = State::KeepaliveActive(Keepalive::start(Arc::clone(&self.channel), interval));
        true
    }

    /// Stops the keepalive task and waits for it to exit.
    ///
    /// Returns `false` if no keepalive was running.
    pub async fn stop_keepalive(&self) -> bool {
        let keepalive = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Ready) {
                State::KeepaliveActive(keepalive) => Some(keepalive),
                other => {
                    *state = other;
                    None
                }
            }
        };

        match keepalive {
            Some(keepalive) => {
                keepalive.stop().await;
                true
            }
            None => false,
        }
    }

    /// Returns the interval of the running keepalive, if any.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        match &*self.lock_state() {
            State::KeepaliveActive(keepalive) => Some(keepalive.interval()),
            _ => None,
        }
    }

    /// Stops the keepalive and closes the socket.
    ///
    /// Safe to call in any state and more than once. A ping that is already
    /// in flight completes first. Only the error from shutting down the
    /// socket is returned; a socket the peer already closed is not an error.
    pub async fn close(&self) -> Result<(), ClientError> {
        let previous = std::mem::replace(&mut *self.lock_state(), State::Closed);

        let was_open = !matches!(previous, State::Closed);
        if let State::KeepaliveActive(keepalive) = previous {
            keepalive.stop().await;
        }

        self.channel.shutdown().await?;

        if was_open {
            info!(peer = %self.channel.peer, "Connection closed");
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.lock_state().kind()
    }

    /// Address of the server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.channel.peer
    }

    /// Counters for this connection.
    pub fn stats(&self) -> &ConnectionStats {
        &self.channel.stats
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.channel.peer)
            .field("state", &self.state())
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
