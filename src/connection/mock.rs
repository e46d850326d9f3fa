//! In-process administration server for tests.
//!
//! Speaks just enough of the protocol to exercise the client: the greeting,
//! `auth`, `ping`, `echo`, `slow`, `banner` and `quit`. Responses to `echo`
//! are written in several pieces so the client sees partial reads on a real
//! socket. `slow <ms>` answers after a delay.

use crate::protocol::{Response, Status};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

pub(crate) const SECRET: &str = "opensesame\n";
pub(crate) const CHALLENGE: &str = "gvwbmpwzlcnkcsbiuxfxmidypzjoxrqv";

const BANNER: &str = "-----------------------------\n\
                      Cache CLI 1.0\n\
                      -----------------------------\n\
                      \n\
                      Type 'help' for command list.\n\
                      Type 'quit' to close CLI session.\n";

#[derive(Default)]
struct Counters {
    pings: AtomicU64,
    auth_attempts: AtomicU64,
    reject_pings: AtomicBool,
    /// Sessions that ended because the client closed its end
    client_hangups: AtomicU64,
}

pub(crate) struct MockServer {
    addr: SocketAddr,
    counters: Arc<Counters>,
}

impl MockServer {
    /// Starts a server that asks for authentication when `secret` is set.
    pub(crate) async fn start(secret: Option<&str>) -> Self {
        Self::spawn(secret.map(str::to_string), None).await
    }

    /// Starts a server that sends `greeting` verbatim, then behaves like an
    /// unauthenticated server.
    pub(crate) async fn start_with_greeting(greeting: Vec<u8>) -> Self {
        Self::spawn(None, Some(greeting)).await
    }

    async fn spawn(secret: Option<String>, greeting: Option<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(Counters::default());

        let shared = Arc::clone(&counters);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    secret.clone(),
                    greeting.clone(),
                    Arc::clone(&shared),
                ));
            }
        });

        Self { addr, counters }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn pings(&self) -> u64 {
        self.counters.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn auth_attempts(&self) -> u64 {
        self.counters.auth_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn client_hangups(&self) -> u64 {
        self.counters.client_hangups.load(Ordering::SeqCst)
    }

    /// Waits up to one second for `n` sessions to see EOF from the client.
    pub(crate) async fn wait_for_client_hangups(&self, n: u64) -> bool {
        for _ in 0..100 {
            if self.client_hangups() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Answers `ping` with 300 instead of 200.
    pub(crate) fn reject_pings(&self, reject: bool) {
        self.counters.reject_pings.store(reject, Ordering::SeqCst);
    }
}

async fn serve(
    stream: TcpStream,
    secret: Option<String>,
    greeting: Option<Vec<u8>>,
    counters: Arc<Counters>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let greeting = match (greeting, &secret) {
        (Some(raw), _) => raw,
        (None, Some(_)) => Response::new(
            Status::Auth,
            format!("{}\n\nAuthentication required.\n", CHALLENGE),
        )
        .serialize(),
        (None, None) => Response::new(Status::Ok, BANNER).serialize(),
    };
    if writer.write_all(&greeting).await.is_err() {
        return;
    }

    let mut authenticated = secret.is_none();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                counters.client_hangups.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Err(_) => return,
        };

        let mut tokens = line.split(' ');
        let command = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        let (response, hang_up) = match command {
            "auth" => {
                counters.auth_attempts.fetch_add(1, Ordering::SeqCst);
                let expected = secret.as_deref().map(|secret| {
                    let input = format!("{}\n{}{}\n", CHALLENGE, secret, CHALLENGE);
                    hex::encode(Sha256::digest(input.as_bytes()))
                });
                if args.len() == 1 && expected.as_deref() == Some(args[0]) {
                    authenticated = true;
                    (Response::new(Status::Ok, BANNER), false)
                } else {
                    (Response::new(Status::Close, "Authentication failed."), true)
                }
            }
            _ if !authenticated => (
                Response::new(Status::Auth, "Authentication required."),
                false,
            ),
            "ping" => {
                counters.pings.fetch_add(1, Ordering::SeqCst);
                if counters.reject_pings.load(Ordering::SeqCst) {
                    (Response::new(Status::Cant, "ping rejected"), false)
                } else {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap()
                        .as_secs();
                    (Response::new(Status::Ok, format!("PONG {} 1.0", now)), false)
                }
            }
            "echo" => (Response::new(Status::Ok, args.join(" ")), false),
            "slow" => {
                let delay = args.first().and_then(|ms| ms.parse().ok()).unwrap_or(100);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                (Response::new(Status::Ok, "slow"), false)
            }
            "banner" => (Response::new(Status::Ok, BANNER), false),
            "quit" => (Response::new(Status::Close, "Closing CLI connection"), true),
            _ => (
                Response::new(
                    Status::Unknown,
                    "Unknown request.\nType 'help' for more info.",
                ),
                false,
            ),
        };

        let written = if command == "echo" {
            write_in_pieces(&mut writer, &response.serialize()).await
        } else {
            writer.write_all(&response.serialize()).await
        };
        if written.is_err() || hang_up {
            return;
        }
    }
}

async fn write_in_pieces(writer: &mut OwnedWriteHalf, frame: &[u8]) -> std::io::Result<()> {
    for piece in frame.chunks(5) {
        writer.write_all(piece).await?;
        writer.flush().await?;
        tokio::task::yield_now().await;
    }
    Ok(())
}
