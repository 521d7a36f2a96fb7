//! Data-layer migration status.
//!
//! The node lifecycle manager only needs one signal from the data store: "is
//! this node still moving partitions around?".  [`MigrationProbe`] opens a
//! session to one node and [`wait_for_migrations`] polls it until the answer
//! is no, bounded by a timeout.  The session is closed on every exit path.
//!
//! [`InfoProbe`] is the production implementation and speaks the Aerospike
//! info protocol: an 8-byte header (version 2, type 1, 48-bit big-endian
//! payload length) followed by newline-separated command names; the reply
//! carries `name\tvalue\n` lines.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Port serving both client traffic and info requests.
pub const SERVICE_PORT: u16 = 3000;

const INFO_VERSION: u8 = 2;
const INFO_TYPE: u8 = 1;
const HEADER_LEN: usize = 8;
const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Opens migration-status sessions against a single node.
#[async_trait::async_trait]
pub trait MigrationProbe: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn MigrationSession>>;
}

/// An open connection to one node.
#[async_trait::async_trait]
pub trait MigrationSession: Send {
    async fn migrations_in_flight(&mut self) -> Result<bool>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Block until `address` reports no migrations in flight.
///
/// Fails with [`Error::MigrationTimeout`] if migrations are still running
/// after `timeout`.  The session is closed before returning, whatever the
/// outcome.
pub async fn wait_for_migrations(
    probe: &dyn MigrationProbe,
    address: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let mut session = probe.connect(address).await?;

    let outcome = tokio::time::timeout(
        timeout,
        poll_until_clear(session.as_mut(), address, poll_interval),
    )
    .await;

    if let Err(e) = session.close().await {
        warn!(%address, %e, "failed to close data-layer session");
    }

    match outcome {
        Ok(res) => res,
        Err(_) => Err(Error::MigrationTimeout {
            address: address.to_string(),
            timeout,
        }),
    }
}

async fn poll_until_clear(
    session: &mut dyn MigrationSession,
    address: &str,
    poll_interval: Duration,
) -> Result<()> {
    loop {
        if !session.migrations_in_flight().await? {
            return Ok(());
        }
        debug!(%address, "migrations in flight, waiting");
        tokio::time::sleep(poll_interval).await;
    }
}

// ── Info protocol ───────────────────────────────────────────────────────────

/// Production probe speaking the Aerospike info protocol.
pub struct InfoProbe {
    port: u16,
    connect_timeout: Duration,
}

impl InfoProbe {
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
        }
    }
}

impl Default for InfoProbe {
    fn default() -> Self {
        Self::new(SERVICE_PORT, Duration::from_secs(10))
    }
}

#[async_trait::async_trait]
impl MigrationProbe for InfoProbe {
    async fn connect(&self, address: &str) -> Result<Box<dyn MigrationSession>> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((address, self.port)),
        )
        .await
        .map_err(|_| Error::info_protocol(format!("connecting to {address}:{} timed out", self.port)))??;
        Ok(Box::new(InfoSession { stream }))
    }
}

/// One TCP connection to a node's info port.
pub struct InfoSession {
    stream: TcpStream,
}

impl InfoSession {
    /// Send info commands and return the value of each one that was answered.
    pub async fn request(&mut self, commands: &[&str]) -> Result<HashMap<String, String>> {
        self.stream.write_all(&encode_request(commands)).await?;

        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header).await?;
        let len = decode_header(&header)?;

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(decode_response(&payload))
    }
}

#[async_trait::async_trait]
impl MigrationSession for InfoSession {
    async fn migrations_in_flight(&mut self) -> Result<bool> {
        let response = self.request(&["statistics"]).await?;
        let stats = response
            .get("statistics")
            .ok_or_else(|| Error::info_protocol("node did not answer the statistics command"))?;
        Ok(migrations_in_flight(&parse_stats(stats)))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Encode an info request for the given commands.
pub fn encode_request(commands: &[&str]) -> Vec<u8> {
    let body: String = commands.iter().map(|c| format!("{c}\n")).collect();
    let len = body.len() as u64;
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.push(INFO_VERSION);
    buf.push(INFO_TYPE);
    buf.extend_from_slice(&len.to_be_bytes()[2..]);
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Validate a reply header and return the payload length.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<usize> {
    if header[0] != INFO_VERSION || header[1] != INFO_TYPE {
        return Err(Error::info_protocol(format!(
            "unexpected header version {} type {}",
            header[0], header[1]
        )));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes[2..].copy_from_slice(&header[2..]);
    let len = u64::from_be_bytes(len_bytes) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(Error::info_protocol(format!("payload of {len} bytes too large")));
    }
    Ok(len)
}

/// Split a reply payload into `name -> value`.
pub fn decode_response(payload: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(payload)
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once('\t')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse a `key=value;key=value` statistics string.
pub fn parse_stats(stats: &str) -> HashMap<&str, &str> {
    stats
        .split(';')
        .filter_map(|kv| kv.split_once('='))
        .collect()
}

/// Whether the node reports partitions still waiting to migrate.
///
/// Older servers expose `migrate_partitions_remaining`; newer ones split it
/// into transmit and receive counters.  Missing counters mean no migrations.
pub fn migrations_in_flight(stats: &HashMap<&str, &str>) -> bool {
    let remaining = |key: &str| -> u64 {
        stats
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    };
    if stats.contains_key("migrate_partitions_remaining") {
        return remaining("migrate_partitions_remaining") > 0;
    }
    remaining("migrate_tx_partitions_remaining") + remaining("migrate_rx_partitions_remaining") > 0
}
