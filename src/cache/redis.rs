// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, AsyncConnectionConfig, ConnectionAddr, RedisResult};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error};

use crate::cache::connection::{ConnectionState, ConnectionStatus};
use crate::cache::types::Cache;
use crate::config::CacheConfig;
use crate::types::{is_transport_error, CacheError};

/// Requests waiting to be handed to the connection.
const REQUEST_QUEUE_SIZE: usize = 4096;
/// Commands sent and not yet answered.
const MAX_IN_FLIGHT: usize = 1024;

enum Request {
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<String>, CacheError>>,
    },
    Set {
        key: String,
        value: String,
        ttl_secs: u64,
    },
    Delete {
        key: String,
    },
    Sync {
        reply: oneshot::Sender<()>,
    },
}

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Client for a remote Redis server over one persistent connection.
///
/// The connection is opened by a background task spawned at construction and
/// is never recreated. Calls are handed to the connection in the order they
/// were issued, and many of them can wait for their answers at once.
pub struct RedisCache {
    status: Arc<ConnectionStatus>,
    requests: mpsc::Sender<Request>,
}

impl RedisCache {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.connection_url().as_str())
            .map_err(|e| CacheError::config(format!("Invalid redis url: {}", e)))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CacheError::runtime(format!("No tokio runtime: {}", e)))?;
        debug!(
            "Creating redis cache for {} db={}",
            client.get_connection_info().addr,
            client.get_connection_info().redis.db
        );

        let status = Arc::new(ConnectionStatus::new());
        let (requests, rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let worker = Worker {
            client,
            status: status.clone(),
            shutdown: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
        };
        runtime.spawn(worker.run(rx));

        Ok(Self { status, requests })
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Queues a write without waiting. A full queue drops it.
    fn push(&self, request: Request, what: &str, key: &str) {
        match self.requests.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                error!("Redis request queue full, dropping {} key={}", what, key);
            }
            Err(TrySendError::Closed(_)) => {
                error!("Redis connection task is gone, dropping {} key={}", what, key);
            }
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Get {
                key: key.to_string(),
                reply,
            })
            .await
            .map_err(|_| CacheError::runtime("Redis connection task is gone"))?;
        rx.await
            .map_err(|_| CacheError::runtime("Redis connection task dropped the request"))?
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        let request = Request::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl_secs,
        };
        self.push(request, "SETEX", key);
    }

    fn delete(&self, key: &str) {
        let request = Request::Delete {
            key: key.to_string(),
        };
        self.push(request, "DEL", key);
    }

    async fn sync(&self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Sync { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

struct Worker {
    client: redis::Client,
    status: Arc<ConnectionStatus>,
    /// Set once the cache is dropped, so closing the connection is not
    /// reported as an error.
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<Semaphore>,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl Worker {
    async fn run(self, mut requests: mpsc::Receiver<Request>) {
        let mut conn = self.connect().await;

        while let Some(request) = requests.recv().await {
            if !self.status.is_alive() {
                conn = None;
            }
            let Some(c) = conn.as_ref() else {
                reject(request);
                continue;
            };
            let Ok(permit) = self.in_flight.clone().acquire_owned().await else {
                break;
            };
            submit(self.task(c.clone(), request, permit)).await;
        }

        self.shutdown.store(true, Ordering::Release);
        debug!("Redis cache dropped, closing connection");
    }

    async fn connect(&self) -> Option<MultiplexedConnection> {
        self.status.on_connecting();
        match timeout(self.connect_timeout, self.open()).await {
            Ok(Ok(conn)) => {
                self.status.on_connect();
                Some(conn)
            }
            Ok(Err(e)) => {
                self.status.on_error(&e.to_string());
                None
            }
            Err(_) => {
                self.status.on_error(&format!(
                    "connection timed out after {}ms",
                    self.connect_timeout.as_millis()
                ));
                None
            }
        }
    }

    /// Opens the socket and runs the connection driver on a task we own, so
    /// the connection closing is seen even while no command is pending.
    async fn open(&self) -> RedisResult<MultiplexedConnection> {
        let info = self.client.get_connection_info();
        let config = AsyncConnectionConfig::new().set_response_timeout(self.response_timeout);
        match &info.addr {
            ConnectionAddr::Tcp(host, port) => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                let (conn, driver) =
                    MultiplexedConnection::new_with_config(&info.redis, stream, config).await?;
                self.watch(driver);
                Ok(conn)
            }
            #[cfg(unix)]
            ConnectionAddr::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                let (conn, driver) =
                    MultiplexedConnection::new_with_config(&info.redis, stream, config).await?;
                self.watch(driver);
                Ok(conn)
            }
            addr => Err(redis::RedisError::from((
                redis::ErrorKind::InvalidClientConfig,
                "Unsupported redis address",
                addr.to_string(),
            ))),
        }
    }

    fn watch(&self, driver: impl Future<Output = ()> + Send + 'static) {
        let status = self.status.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            driver.await;
            if !shutdown.load(Ordering::Acquire) {
                status.on_error("connection closed");
            }
        });
    }

    fn task(
        &self,
        mut conn: MultiplexedConnection,
        request: Request,
        permit: OwnedSemaphorePermit,
    ) -> Task {
        let status = self.status.clone();
        match request {
            Request::Get { key, reply } => Box::pin(async move {
                let _permit = permit;
                debug!("GET key={}", key);
                let ret = conn.get::<_, Option<String>>(key.as_str()).await;
                // The caller may have given up waiting
                let _ = reply.send(check(&status, ret));
            }),
            Request::Set {
                key,
                value,
                ttl_secs,
            } => Box::pin(async move {
                let _permit = permit;
                debug!("SETEX key={} ttl={}", key, ttl_secs);
                let ret = conn
                    .set_ex::<_, _, ()>(key.as_str(), value.as_str(), ttl_secs)
                    .await;
                if let Err(e) = check(&status, ret) {
                    error!("Failed to set redis key={}: {}", key, e);
                }
            }),
            Request::Delete { key } => Box::pin(async move {
                let _permit = permit;
                debug!("DEL key={}", key);
                let ret = conn.del::<_, ()>(key.as_str()).await;
                if let Err(e) = check(&status, ret) {
                    error!("Failed to delete redis key={}: {}", key, e);
                }
            }),
            // Replies come back in order, so PING is answered after
            // everything sent before it
            Request::Sync { reply } => Box::pin(async move {
                let _permit = permit;
                let ret = redis::cmd("PING").query_async::<()>(&mut conn).await;
                let _ = check(&status, ret);
                let _ = reply.send(());
            }),
        }
    }
}

/// Polls `task` once, which puts its command on the connection right away
/// and so in submission order, then lets it wait for the answer on its own.
async fn submit(mut task: Task) {
    let first = std::future::poll_fn(|cx| Poll::Ready(task.as_mut().poll(cx))).await;
    if first.is_pending() {
        tokio::spawn(task);
    }
}

fn reject(request: Request) {
    match request {
        Request::Get { reply, .. } => {
            let _ = reply.send(Err(CacheError::connection(
                "Redis client not connected to the server",
            )));
        }
        Request::Set { key, .. } => debug!("Not connected, dropping SETEX key={}", key),
        Request::Delete { key } => debug!("Not connected, dropping DEL key={}", key),
        Request::Sync { reply } => {
            let _ = reply.send(());
        }
    }
}

/// Maps a command outcome to the caller's result, reporting transport
/// failures to the connection status.
fn check<T>(status: &ConnectionStatus, ret: RedisResult<T>) -> Result<T, CacheError> {
    ret.map_err(|e| {
        if is_transport_error(&e) {
            status.on_error(&e.to_string());
        }
        e.into()
    })
}
