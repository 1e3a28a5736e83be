//! TxnScope Streamer Library
//!
//! This crate streams blocks from a StreamingFast endpoint, scans the call
//! traces of tracked ERC-20 contracts, and emits every transfer counterparty
//! the first time it is seen. Sessions survive transport failures by resuming
//! from the last applied cursor.

pub mod auth;
pub mod client;
pub mod config;
pub mod decoder;
pub mod dedup;
pub mod filter;
pub mod model;
pub mod pb;
pub mod range;
pub mod scanner;
pub mod session;
pub mod sink;
pub mod stats;

// Re-export commonly used types
pub use auth::{AccessToken, ApiKeyTokenSource, TokenSource};
pub use client::{BlockSource, BlockStream, GrpcBlockSource, StreamMessage, SubscribeRequest};
pub use config::{Cli, ConfigError, StreamerConfig};
pub use decoder::{BlockDecoder, ProtoBlockDecoder};
pub use dedup::{DedupScope, SeenAddresses};
pub use filter::{extract_filter_literals, TrackedAddresses};
pub use range::BlockRange;
pub use scanner::{scan_block, scan_transaction};
pub use session::{Session, SessionError, SessionSettings};
pub use sink::{AddressSink, DiscoveredAddress, OutputSink, OutputTarget};
pub use stats::{SessionStats, SessionSummary};
