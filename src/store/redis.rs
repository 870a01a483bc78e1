//! Redis Store Module
//!
//! Connection contract implemented over the `redis` crate's multiplexed
//! async connection.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, IntoConnectionInfo, RedisError};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::store::{Connector, StoreConnection};

/// Keys requested per SCAN iteration
const SCAN_COUNT: usize = 100;

/// Maps a Redis failure of `op` into the cache error taxonomy.
fn store_error(err: RedisError, op: &'static str, after: Duration) -> CacheError {
    if err.is_timeout() {
        CacheError::StoreTimeout { op, after }
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        CacheError::StoreUnavailable(err.to_string())
    } else {
        CacheError::Command(err.to_string())
    }
}

// == Redis Connector ==
/// Opens multiplexed connections to a Redis server.
#[derive(Clone)]
pub struct RedisConnector {
    client: Client,
    config: StoreConfig,
}

impl fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnector")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("db", &self.config.db)
            .field("password", &self.config.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RedisConnector {
    /// Creates a connector from store configuration.
    ///
    /// No connection is opened until the pool asks for one.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let mut info = (config.host.as_str(), config.port)
            .into_connection_info()
            .map_err(|e| CacheError::InvalidConfig(format!("Invalid Redis address: {}", e)))?;
        info.redis.db = config.db;
        info.redis.password = config.password.clone();

        let client = Client::open(info)
            .map_err(|e| CacheError::InvalidConfig(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection> {
        let conn = tokio::time::timeout(
            self.config.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| CacheError::StoreTimeout {
            op: "CONNECT",
            after: self.config.connect_timeout,
        })?
        .map_err(|e| store_error(e, "CONNECT", self.config.connect_timeout))?;

        debug!(
            "Opened Redis connection to {}:{}",
            self.config.host, self.config.port
        );
        Ok(RedisConnection {
            conn,
            op_timeout: self.config.op_timeout,
        })
    }
}

// == Redis Connection ==
/// A leased Redis connection.
pub struct RedisConnection {
    conn: MultiplexedConnection,
    op_timeout: Duration,
}

impl RedisConnection {
    fn fault(&self, op: &'static str) -> impl Fn(RedisError) -> CacheError {
        let after = self.op_timeout;
        move |err| store_error(err, op, after)
    }
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnection")
            .field("conn", &"<MultiplexedConnection>")
            .finish()
    }
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.conn.get(key).await.map_err(self.fault("GET"))
    }

    async fn mget(&mut self, keys: &[String]) -> Result<Vec<Option<String>>> {
        // Explicit MGET: the AsyncCommands helper sends GET for a single key,
        // whose nil reply would not keep its slot
        redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut self.conn)
            .await
            .map_err(self.fault("MGET"))
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .set::<_, _, ()>(key, value)
            .await
            .map_err(self.fault("SET"))
    }

    async fn del(&mut self, keys: &[String]) -> Result<u64> {
        self.conn.del(keys).await.map_err(self.fault("DEL"))
    }

    async fn flush_db(&mut self) -> Result<()> {
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut self.conn)
            .await
            .map_err(self.fault("FLUSHDB"))
    }

    async fn pipelined_set(&mut self, entries: &BTreeMap<String, String>) -> Result<()> {
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set(key, value).ignore();
        }
        pipe.query_async::<()>(&mut self.conn)
            .await
            .map_err(self.fault("PIPELINE"))
    }

    async fn scan_match(&mut self, pattern: &str) -> Result<Vec<String>> {
        let mut cursor = 0u64;
        let mut found = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut self.conn)
                .await
                .map_err(self.fault("SCAN"))?;

            found.extend(keys);
            cursor = next;

            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn ping(&mut self) -> Result<()> {
        redis::cmd("PING")
            .query_async::<String>(&mut self.conn)
            .await
            .map_err(self.fault("PING"))?;
        Ok(())
    }
}
