//! Redis connection management.

use std::collections::HashMap;
use std::sync::Arc;

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncConnectionConfig, Client};
use tokio::sync::{Mutex, OnceCell};

use rankpulse_core::error::{AppError, ErrorKind};
use rankpulse_core::result::AppResult;

use crate::keys::BrokerKeys;

/// Redis client wrapper with lazy connection management.
///
/// Regular commands share one reconnecting [`ConnectionManager`]. Blocking
/// claims get a dedicated connection per queue so they never stall the
/// shared one.
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    conn: Arc<OnceCell<ConnectionManager>>,
    blocking: Arc<Mutex<HashMap<String, Arc<Mutex<MultiplexedConnection>>>>>,
    keys: BrokerKeys,
    masked_url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &self.masked_url)
            .field("keys", &self.keys)
            .finish()
    }
}

impl RedisClient {
    /// Parse the URL and prepare a client. No connection is made yet.
    pub fn open(url: &str, key_prefix: &str) -> AppResult<Self> {
        let masked_url = mask_redis_url(url);
        tracing::info!(url = %masked_url, "Configuring Redis broker");

        let client = Client::open(url).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid Redis broker URL", e)
        })?;

        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
            blocking: Arc::new(Mutex::new(HashMap::new())),
            keys: BrokerKeys::new(key_prefix),
            masked_url,
        })
    }

    /// Shared connection, connecting on first use.
    pub async fn conn(&self) -> AppResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(map_redis_err)?;
                tracing::info!(url = %self.masked_url, "Connected to Redis broker");
                Ok::<_, AppError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    /// Dedicated connection for blocking commands on one queue.
    ///
    /// No response timeout: a blocking command answers only after its own
    /// server-side timeout and must never be abandoned mid-flight.
    pub async fn blocking_conn(&self, queue: &str) -> AppResult<Arc<Mutex<MultiplexedConnection>>> {
        let mut map = self.blocking.lock().await;
        if let Some(conn) = map.get(queue) {
            return Ok(Arc::clone(conn));
        }

        let config = AsyncConnectionConfig::new().set_response_timeout(None);
        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(map_redis_err)?;
        let conn = Arc::new(Mutex::new(conn));
        map.insert(queue.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    /// Forget a dedicated connection after an error so the next claim reconnects.
    pub async fn drop_blocking_conn(&self, queue: &str) {
        if self.blocking.lock().await.remove(queue).is_some() {
            tracing::warn!(queue, "Discarded blocking Redis connection");
        }
    }

    /// Key builder for this client's prefix.
    pub fn keys(&self) -> &BrokerKeys {
        &self.keys
    }
}

/// Map a Redis error to an AppError.
///
/// Connection-level failures become `BrokerUnavailable`; everything else
/// is a plain broker error.
pub fn map_redis_err(e: redis::RedisError) -> AppError {
    let kind = if e.is_connection_refusal()
        || e.is_connection_dropped()
        || e.is_io_error()
        || e.is_timeout()
    {
        ErrorKind::BrokerUnavailable
    } else {
        ErrorKind::Broker
    };
    AppError::with_source(kind, format!("Redis error: {e}"), e)
}

/// Mask password in Redis URL for safe logging.
fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}
