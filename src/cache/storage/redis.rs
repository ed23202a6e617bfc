//! Redis-backed durable store, single node or cluster.

use redis::aio::MultiplexedConnection;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{Cmd, ConnectionAddr, ConnectionInfo, FromRedisValue, IntoConnectionInfo};
use tracing::debug;

use crate::cache::config::RedisMode;
use crate::cache::error::CacheResult;

/// Keys requested per `SCAN` round trip.
const SCAN_COUNT: usize = 500;

enum Connection {
    Single(MultiplexedConnection),
    Cluster {
        conn: ClusterConnection,
        // Credentials and database for direct connections to discovered primaries.
        seed: ConnectionInfo,
    },
}

/// A connected Redis store.
///
/// Connections are multiplexed, so every operation works on a cheap clone of
/// the handle and no lock is held across `.await`.
pub struct RedisStore {
    conn: Connection,
}

impl RedisStore {
    /// Connects to Redis.
    ///
    /// `uri` is a single `redis://host:port` address, or for
    /// [`RedisMode::Clustered`] a comma-separated list of seed nodes; the
    /// first seed also supplies credentials for direct primary connections.
    /// Entries without a scheme get `redis://` prepended.
    ///
    /// # Errors
    ///
    /// [`CacheError::Store`](crate::cache::CacheError::Store) when the address
    /// is malformed or no connection can be established.
    pub async fn connect(uri: &str, mode: RedisMode) -> CacheResult<Self> {
        let nodes = node_uris(uri);

        let conn = match mode {
            RedisMode::Single => {
                let target = nodes.first().map(String::as_str).unwrap_or("redis://127.0.0.1");
                let client = redis::Client::open(target)?;
                Connection::Single(client.get_multiplexed_async_connection().await?)
            }
            RedisMode::Clustered => {
                let seed = nodes
                    .first()
                    .map(String::as_str)
                    .unwrap_or("redis://127.0.0.1")
                    .into_connection_info()?;
                let conn = ClusterClient::new(nodes)?.get_async_connection().await?;
                Connection::Cluster { conn, seed }
            }
        };

        Ok(Self { conn })
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> CacheResult<T> {
        let value = match &self.conn {
            Connection::Single(conn) => cmd.query_async(&mut conn.clone()).await?,
            Connection::Cluster { conn, .. } => cmd.query_async(&mut conn.clone()).await?,
        };
        Ok(value)
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(&cmd).await
    }

    /// `SET key value EX ttl`, so the expiry lands atomically with the write.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_secs);
        self.query(&cmd).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<usize> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.query(&cmd).await
    }

    /// Deletes every key matching `pattern` on every primary.
    ///
    /// In cluster mode the primaries are looked up with `CLUSTER NODES` on
    /// each flush, so nodes added after connecting are included and replicas
    /// are never written to.
    pub async fn flush(&self, pattern: &str) -> CacheResult<usize> {
        let (conn, seed) = match &self.conn {
            Connection::Single(conn) => return scan_delete(&mut conn.clone(), pattern).await,
            Connection::Cluster { conn, seed } => (conn, seed),
        };

        let mut cmd = redis::cmd("CLUSTER");
        cmd.arg("NODES");
        let topology: String = cmd.query_async(&mut conn.clone()).await?;

        let mut total = 0;
        for (host, port) in primary_addrs(&topology) {
            debug!(host = %host, port, pattern, "flushing cluster primary");
            let info = ConnectionInfo {
                addr: ConnectionAddr::Tcp(host, port),
                redis: seed.redis.clone(),
            };
            let mut node = redis::Client::open(info)?
                .get_multiplexed_async_connection()
                .await?;
            total += scan_delete(&mut node, pattern).await?;
        }
        Ok(total)
    }
}

// Addresses of the healthy primaries in a `CLUSTER NODES` reply.
//
// Each line reads `<id> <ip:port@cport[,hostname]> <flags> <master> ...`.
fn primary_addrs(topology: &str) -> Vec<(String, u16)> {
    topology
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _id = fields.next()?;
            let address = fields.next()?;
            let flags = fields.next()?;

            let flags: Vec<&str> = flags.split(',').collect();
            let unusable = flags
                .iter()
                .any(|flag| matches!(*flag, "fail" | "noaddr" | "handshake"));
            if !flags.contains(&"master") || unusable {
                return None;
            }

            let endpoint = address.split(['@', ',']).next()?;
            let (host, port) = endpoint.rsplit_once(':')?;
            if host.is_empty() {
                return None;
            }
            Some((host.to_owned(), port.parse().ok()?))
        })
        .collect()
}

// Walks the keyspace with SCAN and deletes each page in one pipeline.
// Deletes are issued per key so cluster nodes never see a cross-slot DEL.
async fn scan_delete(conn: &mut MultiplexedConnection, pattern: &str) -> CacheResult<usize> {
    let mut cursor: u64 = 0;
    let mut removed = 0;

    loop {
        let mut scan = redis::cmd("SCAN");
        scan.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT);
        let (next, keys): (u64, Vec<String>) = scan.query_async(conn).await?;

        if !keys.is_empty() {
            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.cmd("DEL").arg(key);
            }
            let deleted: Vec<usize> = pipe.query_async(conn).await?;
            removed += deleted.iter().sum::<usize>();
            debug!(pattern, batch = keys.len(), "deleted scanned keys");
        }

        if next == 0 {
            return Ok(removed);
        }
        cursor = next;
    }
}

fn node_uris(uri: &str) -> Vec<String> {
    uri.split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(|node| {
            if node.contains("://") {
                node.to_owned()
            } else {
                format!("redis://{node}")
            }
        })
        .collect()
}
