//! Discovered Address Output
//!
//! Writes each discovered address exactly once to the configured target:
//! standard output, a file (one address per line), or a Redis pub/sub channel
//! as JSON. Write failures are fatal for the session.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::Address;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::model::{format_address, BlockRef};
use crate::range::BlockRange;

/// Default Redis channel for discovered addresses
pub const DEFAULT_CHANNEL: &str = "discovered_addresses";

/// Placeholder replaced by the block range in output paths
pub const RANGE_PLACEHOLDER: &str = "{range}";

/// Errors that can occur while writing discovered addresses
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Unable to create output {path}: {source}")]
    Create {
        path: String,
        source: std::io::Error,
    },

    #[error("Unable to write address {address} of block {block}: {source}")]
    Write {
        address: String,
        block: String,
        source: std::io::Error,
    },

    #[error("Unable to flush output: {0}")]
    Flush(std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An address discovered in a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredAddress {
    pub address: Address,
    pub block: BlockRef,
}

/// Destination for discovered addresses
#[async_trait]
pub trait AddressSink: Send {
    async fn write_address(&mut self, discovered: &DiscoveredAddress) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Output target selected by the `--output` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Addresses are not written anywhere
    Discard,
    Stdout,
    File(PathBuf),
    /// Redis connection URL
    Redis(String),
}

impl OutputTarget {
    /// Interpret an `--output` value for the given range
    ///
    /// `-` is standard output, an empty value discards, `redis://` and
    /// `rediss://` URLs publish to Redis, anything else is a file path where
    /// `{range}` is replaced by the compact range and `~/` is expanded.
    pub fn parse(raw: &str, range: &BlockRange) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return OutputTarget::Discard;
        }
        if raw == "-" {
            return OutputTarget::Stdout;
        }
        if raw.starts_with("redis://") || raw.starts_with("rediss://") {
            return OutputTarget::Redis(raw.to_string());
        }

        let path = raw.replacen(RANGE_PLACEHOLDER, &range.compact(), 1);
        OutputTarget::File(PathBuf::from(expand_path(&path)))
    }
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Line-oriented sink over any async writer
pub struct WriterSink {
    writer: BufWriter<Box<dyn AsyncWrite + Unpin + Send>>,
}

impl WriterSink {
    pub fn new(writer: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Create (or truncate) a file, creating missing parent directories
    pub async fn create_file(path: &Path) -> Result<Self, SinkError> {
        let create_error = |source| SinkError::Create {
            path: path.display().to_string(),
            source,
        };

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(create_error)?;
        }
        let file = tokio::fs::File::create(path).await.map_err(create_error)?;

        Ok(Self::new(Box::new(file)))
    }
}

#[async_trait]
impl AddressSink for WriterSink {
    async fn write_address(&mut self, discovered: &DiscoveredAddress) -> Result<(), SinkError> {
        let mut line = format_address(&discovered.address);
        line.push('\n');

        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|source| SinkError::Write {
                address: format_address(&discovered.address),
                block: discovered.block.to_string(),
                source,
            })
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await.map_err(SinkError::Flush)
    }
}

/// Message format for Redis publication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredAddressMessage {
    /// Lowercase address with 0x prefix
    pub address: String,
    pub block_number: u64,
    /// Block hash with 0x prefix
    pub block_hash: String,
    /// Unix timestamp in milliseconds when the address was discovered
    pub timestamp: u64,
}

impl DiscoveredAddressMessage {
    pub fn from_discovered(discovered: &DiscoveredAddress) -> Self {
        Self {
            address: format_address(&discovered.address),
            block_number: discovered.block.number,
            block_hash: format!("{:#x}", discovered.block.hash),
            timestamp: current_timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Get current timestamp in milliseconds
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Publishes discovered addresses to a Redis channel
pub struct RedisSink {
    connection: MultiplexedConnection,
    channel: String,
}

impl RedisSink {
    pub fn new(connection: MultiplexedConnection, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: channel.into(),
        }
    }

    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self, SinkError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(connection, channel))
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl AddressSink for RedisSink {
    async fn write_address(&mut self, discovered: &DiscoveredAddress) -> Result<(), SinkError> {
        let json = DiscoveredAddressMessage::from_discovered(discovered).to_json()?;
        let _subscribers: i64 = self.connection.publish(&self.channel, &json).await?;
        Ok(())
    }
}

/// The sink chosen at startup
pub enum OutputSink {
    Discard,
    Writer(WriterSink),
    Redis(RedisSink),
}

impl OutputSink {
    pub async fn open(target: &OutputTarget, redis_channel: &str) -> Result<Self, SinkError> {
        Ok(match target {
            OutputTarget::Discard => OutputSink::Discard,
            OutputTarget::Stdout => OutputSink::Writer(WriterSink::stdout()),
            OutputTarget::File(path) => OutputSink::Writer(WriterSink::create_file(path).await?),
            OutputTarget::Redis(url) => OutputSink::Redis(RedisSink::connect(url, redis_channel).await?),
        })
    }
}

#[async_trait]
impl AddressSink for OutputSink {
    async fn write_address(&mut self, discovered: &DiscoveredAddress) -> Result<(), SinkError> {
        match self {
            OutputSink::Discard => Ok(()),
            OutputSink::Writer(sink) => sink.write_address(discovered).await,
            OutputSink::Redis(sink) => sink.write_address(discovered).await,
        }
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        match self {
            OutputSink::Discard => Ok(()),
            OutputSink::Writer(sink) => sink.flush().await,
            OutputSink::Redis(sink) => sink.flush().await,
        }
    }
}
