// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

//! Minimal in-process RESP2 server for exercising `RedisCache` without a
//! real Redis. Understands GET, SETEX, DEL and PING; any other command
//! (handshake included) gets `+OK`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::CacheConfig;

/// GETs on keys with this prefix answer with a WRONGTYPE error.
pub const WRONGTYPE_PREFIX: &str = "wrongtype:";

#[derive(Clone, Copy, Default)]
pub struct Options {
    /// Delay before answering each GET.
    pub get_delay: Duration,
    /// Close every accepted connection this long after accepting it.
    pub close_after: Option<Duration>,
}

type Store = Arc<Mutex<HashMap<String, (String, Instant)>>>;

pub struct TestServer {
    port: u16,
    connections: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_options(Options::default()).await
    }

    pub async fn with_options(options: Options) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let store: Store = Arc::new(Mutex::new(HashMap::new()));

        let accepted = connections.clone();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                serve(sock, store.clone(), options);
            }
        });

        Self { port, connections }
    }

    pub fn config(&self) -> CacheConfig {
        CacheConfig {
            url: format!("redis://127.0.0.1:{}/0", self.port),
            connect_timeout_ms: 2000,
            ..CacheConfig::default()
        }
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(sock: tokio::net::TcpStream, store: Store, options: Options) {
    let (rd, mut wr) = sock.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Vec<u8>)>();

    let reader = tokio::spawn(async move {
        let mut rd = BufReader::new(rd);
        while let Some(cmd) = read_command(&mut rd).await {
            let now = Instant::now();
            let (at, reply) = match cmd[0].to_ascii_uppercase().as_str() {
                "GET" => (now + options.get_delay, get(&store, &cmd[1])),
                "SETEX" => (now, setex(&store, &cmd[1], &cmd[2], &cmd[3])),
                "DEL" => (now, del(&store, &cmd[1])),
                "PING" => (now, b"+PONG\r\n".to_vec()),
                _ => (now, b"+OK\r\n".to_vec()),
            };
            if tx.send((at, reply)).is_err() {
                break;
            }
        }
    });

    // Replies leave in the order the commands arrived
    let writer = tokio::spawn(async move {
        while let Some((at, reply)) = rx.recv().await {
            tokio::time::sleep_until(at).await;
            if wr.write_all(&reply).await.is_err() {
                break;
            }
        }
    });

    if let Some(close_after) = options.close_after {
        tokio::spawn(async move {
            tokio::time::sleep(close_after).await;
            reader.abort();
            writer.abort();
        });
    }
}

async fn read_command<R: AsyncBufRead + Unpin>(rd: &mut R) -> Option<Vec<String>> {
    let mut line = String::new();
    if rd.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        rd.read_line(&mut line).await.ok()?;
        let len: usize = line.trim().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0u8; len + 2];
        rd.read_exact(&mut buf).await.ok()?;
        args.push(String::from_utf8_lossy(&buf[..len]).to_string());
    }
    if args.is_empty() {
        return None;
    }
    Some(args)
}

fn get(store: &Store, key: &str) -> Vec<u8> {
    if key.starts_with(WRONGTYPE_PREFIX) {
        return b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_vec();
    }
    let mut store = store.lock().unwrap();
    let now = Instant::now();
    match store.get(key).map(|(value, expires_at)| (*expires_at > now, value.clone())) {
        Some((true, value)) => format!("${}\r\n{}\r\n", value.len(), value).into_bytes(),
        Some((false, _)) => {
            store.remove(key);
            b"$-1\r\n".to_vec()
        }
        None => b"$-1\r\n".to_vec(),
    }
}

fn setex(store: &Store, key: &str, ttl: &str, value: &str) -> Vec<u8> {
    let ttl: u64 = match ttl.parse() {
        Ok(ttl) if ttl > 0 => ttl,
        _ => return b"-ERR invalid expire time in 'setex' command\r\n".to_vec(),
    };
    store.lock().unwrap().insert(
        key.to_string(),
        (value.to_string(), Instant::now() + Duration::from_secs(ttl)),
    );
    b"+OK\r\n".to_vec()
}

fn del(store: &Store, key: &str) -> Vec<u8> {
    let removed = store.lock().unwrap().remove(key).is_some();
    format!(":{}\r\n", removed as u8).into_bytes()
}
