//! Streamer Configuration
//!
//! Command line flags and environment lookups, resolved once at startup into a
//! [`StreamerConfig`] that is handed to the session by value.

use std::fmt;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::auth::DEFAULT_AUTH_URL;
use crate::client::{ClientConfig, ForkSteps, DEFAULT_ENDPOINT};
use crate::dedup::DedupScope;
use crate::range::BlockRange;
use crate::session::SessionSettings;
use crate::sink::{OutputTarget, DEFAULT_CHANNEL};

/// Delay between a stream failure and the next connection attempt
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Interval between two status log lines
pub const STATUS_FREQUENCY: Duration = Duration::from_secs(15);

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "STREAMINGFAST_API_KEY";

/// Environment variable overriding the identity provider URL
pub const AUTH_URL_ENV: &str = "STREAMINGFAST_AUTH_URL";

/// Errors raised while building the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The environment variable {API_KEY_ENV} must be set to a valid API key")]
    MissingApiKey,

    #[error("Only one network flag can be used at a time")]
    ConflictingNetworks,
}

/// Hosted network presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Bsc,
    Polygon,
    Heco,
    Fantom,
}

impl Network {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Network::Bsc => "bsc.streamingfast.io:443",
            Network::Polygon => "polygon.streamingfast.io:443",
            Network::Heco => "heco.streamingfast.io:443",
            Network::Fantom => "fantom.streamingfast.io:443",
        }
    }
}

/// Discover addresses exchanging ERC-20 transfers with tracked contracts
#[derive(Parser, Debug, Clone)]
#[command(name = "txnscope-streamer", version, allow_negative_numbers = true)]
pub struct Cli {
    /// Filter expression sent to the service, e.g. "to in ['0xa0b8...']"
    pub filter: String,

    /// <start_block> [<end_block>]; a negative start is relative to the chain tip
    #[arg(value_name = "RANGE")]
    pub range: Vec<String>,

    /// Block stream endpoint
    #[arg(short, long, env = "STREAMINGFAST_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Stream BSC mainnet
    #[arg(long)]
    pub bsc: bool,

    /// Stream Polygon mainnet
    #[arg(long)]
    pub polygon: bool,

    /// Stream HECO mainnet
    #[arg(long)]
    pub heco: bool,

    /// Stream Fantom Opera mainnet
    #[arg(long)]
    pub fantom: bool,

    /// Request irreversibility and undo notifications as well
    #[arg(long)]
    pub handle_forks: bool,

    /// Resume from this cursor instead of the range start
    #[arg(long, default_value = "")]
    pub start_cursor: String,

    /// Connect without TLS
    #[arg(short, long)]
    pub plaintext: bool,

    /// "-" for stdout, empty to discard, a redis:// URL, or a file path ({range} is substituted)
    #[arg(short, long, default_value = "-")]
    pub output: String,

    /// Channel used with a redis:// output
    #[arg(long, default_value = DEFAULT_CHANNEL)]
    pub redis_channel: String,

    /// Lifetime of the set of already emitted addresses
    #[arg(long, value_enum, default_value_t = DedupScope::Connection)]
    pub dedup_scope: DedupScope,
}

impl Cli {
    /// The single network preset selected, if any
    pub fn network(&self) -> Result<Option<Network>, ConfigError> {
        let selected: Vec<Network> = [
            (self.bsc, Network::Bsc),
            (self.polygon, Network::Polygon),
            (self.heco, Network::Heco),
            (self.fantom, Network::Fantom),
        ]
        .into_iter()
        .filter_map(|(enabled, network)| enabled.then_some(network))
        .collect();

        match selected.as_slice() {
            [] => Ok(None),
            [network] => Ok(Some(*network)),
            _ => Err(ConfigError::ConflictingNetworks),
        }
    }
}

/// Fully resolved startup configuration
#[derive(Clone)]
pub struct StreamerConfig {
    pub client: ClientConfig,
    pub range: BlockRange,
    pub start_cursor: String,
    pub filter: String,
    pub fork_steps: ForkSteps,
    pub dedup_scope: DedupScope,
    pub output: OutputTarget,
    pub redis_channel: String,
    pub auth_url: String,
    pub api_key: String,
    pub retry_delay: Duration,
    pub status_frequency: Duration,
}

impl fmt::Debug for StreamerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamerConfig")
            .field("client", &self.client)
            .field("range", &self.range)
            .field("start_cursor", &self.start_cursor)
            .field("filter", &self.filter)
            .field("fork_steps", &self.fork_steps)
            .field("dedup_scope", &self.dedup_scope)
            .field("output", &self.output)
            .field("redis_channel", &self.redis_channel)
            .field("auth_url", &self.auth_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl StreamerConfig {
    /// Build the configuration from parsed flags and the process environment
    pub fn from_env(cli: Cli) -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_ENV).ok();
        let auth_url = std::env::var(AUTH_URL_ENV).ok();
        Self::from_cli(cli, api_key, auth_url)
    }

    /// Build the configuration from parsed flags and explicit environment values
    pub fn from_cli(
        cli: Cli,
        api_key: Option<String>,
        auth_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        if cli.start_cursor.is_empty() && cli.range.is_empty() {
            return Err(ConfigError::InvalidArgument(
                "expecting a <start_block> argument when no start cursor is given".to_string(),
            ));
        }
        let range = BlockRange::resolve(&cli.range)?;

        let endpoint = match cli.network()? {
            Some(network) => network.endpoint().to_string(),
            None => cli.endpoint.clone(),
        };

        Ok(Self {
            client: ClientConfig {
                endpoint,
                plaintext: cli.plaintext,
            },
            output: OutputTarget::parse(&cli.output, &range),
            range,
            start_cursor: cli.start_cursor,
            filter: cli.filter,
            fork_steps: ForkSteps::from_handle_forks(cli.handle_forks),
            dedup_scope: cli.dedup_scope,
            redis_channel: cli.redis_channel,
            auth_url: auth_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            api_key,
            retry_delay: RETRY_DELAY,
            status_frequency: STATUS_FREQUENCY,
        })
    }

    /// Settings consumed by the session controller
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            range: self.range,
            start_cursor: self.start_cursor.clone(),
            fork_steps: self.fork_steps,
            filter: self.filter.clone(),
            dedup_scope: self.dedup_scope,
            retry_delay: self.retry_delay,
            status_frequency: self.status_frequency,
        }
    }
}
