//! Block Stream Client
//!
//! Subscribes to the remote block stream over gRPC and yields one
//! [`StreamMessage`] per block notification. A clean end of stream is
//! `Ok(None)`; any other failure is a [`StreamError`] the session may retry.

use std::fmt;

use async_trait::async_trait;
use prost::Message;
use thiserror::Error;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::info;

use crate::auth::AccessToken;
use crate::pb;
use crate::range::BlockRange;

/// Default block stream endpoint
pub const DEFAULT_ENDPOINT: &str = "api.streamingfast.io:443";

/// Fully qualified path of the server-streaming blocks method
pub const BLOCKS_PATH: &str = "/dfuse.bstream.v1.BlockStreamV2/Blocks";

/// Errors that can occur while talking to the block stream service
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: tonic::transport::Error,
    },

    #[error("Access token is not a valid header value")]
    InvalidToken,

    #[error("Unable to start blocks stream: {0}")]
    Subscribe(Box<tonic::Status>),

    #[error("Stream receive failed: {0}")]
    Receive(Box<tonic::Status>),

    #[error("Stream closed by transport: {0}")]
    Transport(String),
}

/// Classification of a block notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForkStep {
    /// Newly produced block
    New,
    /// Block confirmed irreversible
    Irreversible,
    /// Block forked out
    Undo,
}

impl ForkStep {
    pub fn to_proto(self) -> pb::ForkStep {
        match self {
            ForkStep::New => pb::ForkStep::StepNew,
            ForkStep::Irreversible => pb::ForkStep::StepIrreversible,
            ForkStep::Undo => pb::ForkStep::StepUndo,
        }
    }

    pub fn from_proto(value: i32) -> Option<Self> {
        match pb::ForkStep::try_from(value).ok()? {
            pb::ForkStep::StepNew => Some(ForkStep::New),
            pb::ForkStep::StepIrreversible => Some(ForkStep::Irreversible),
            pb::ForkStep::StepUndo => Some(ForkStep::Undo),
            pb::ForkStep::StepUnknown | pb::ForkStep::StepStalled => None,
        }
    }
}

impl fmt::Display for ForkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkStep::New => f.write_str("new"),
            ForkStep::Irreversible => f.write_str("irreversible"),
            ForkStep::Undo => f.write_str("undo"),
        }
    }
}

/// Fork notifications requested for the whole process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForkSteps {
    /// New blocks only
    #[default]
    NewOnly,
    /// New blocks plus irreversibility and undo notifications
    WithForks,
}

impl ForkSteps {
    pub fn from_handle_forks(handle_forks: bool) -> Self {
        if handle_forks {
            ForkSteps::WithForks
        } else {
            ForkSteps::NewOnly
        }
    }

    pub fn steps(&self) -> &'static [ForkStep] {
        match self {
            ForkSteps::NewOnly => &[ForkStep::New],
            ForkSteps::WithForks => &[ForkStep::New, ForkStep::Irreversible, ForkStep::Undo],
        }
    }

    pub fn handles_forks(&self) -> bool {
        matches!(self, ForkSteps::WithForks)
    }
}

/// Where a subscription starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPosition {
    /// Resume right after the message that produced this cursor
    Cursor(String),
    /// Absolute block number, or negative offset from the chain tip
    Block(i64),
}

impl StartPosition {
    /// A non-empty cursor takes precedence over the range start
    pub fn resolve(cursor: &str, range: &BlockRange) -> Self {
        if cursor.is_empty() {
            StartPosition::Block(range.start)
        } else {
            StartPosition::Cursor(cursor.to_string())
        }
    }
}

/// Parameters of one subscription call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub start: StartPosition,
    pub stop_block_num: u64,
    pub fork_steps: ForkSteps,
    pub filter: String,
}

impl SubscribeRequest {
    pub fn to_proto(&self) -> pb::BlocksRequestV2 {
        let (start_block_num, start_cursor) = match &self.start {
            StartPosition::Cursor(cursor) => (0, cursor.clone()),
            StartPosition::Block(number) => (*number, String::new()),
        };

        pb::BlocksRequestV2 {
            start_block_num,
            start_cursor,
            stop_block_num: self.stop_block_num,
            fork_steps: self
                .fork_steps
                .steps()
                .iter()
                .map(|step| step.to_proto() as i32)
                .collect(),
            include_filter_expr: self.filter.clone(),
            exclude_filter_expr: String::new(),
            details: pb::BlockDetails::Full as i32,
        }
    }
}

/// One block notification received from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Encoded block payload
    pub payload: Vec<u8>,
    /// Resumption token for the position right after this message
    pub cursor: String,
    pub step: Option<ForkStep>,
    /// Encoded size of the whole response message
    pub wire_size: usize,
}

impl StreamMessage {
    pub fn from_proto(response: pb::BlockResponseV2) -> Self {
        let wire_size = response.encoded_len();
        Self {
            payload: response.block.map(|any| any.value).unwrap_or_default(),
            cursor: response.cursor,
            step: ForkStep::from_proto(response.step),
            wire_size,
        }
    }
}

/// An open subscription
#[async_trait]
pub trait BlockStream: Send {
    /// Next message, `Ok(None)` once the service ended the stream cleanly
    async fn recv(&mut self) -> Result<Option<StreamMessage>, StreamError>;
}

/// Opens subscriptions against the block stream service
#[async_trait]
pub trait BlockSource: Send {
    async fn subscribe(
        &mut self,
        request: &SubscribeRequest,
        token: &AccessToken,
    ) -> Result<Box<dyn BlockStream>, StreamError>;
}

/// Configuration for the gRPC connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `host:port` of the block stream service
    pub endpoint: String,
    /// Connect without TLS
    pub plaintext: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            plaintext: false,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Endpoint URI with its scheme
    pub fn uri(&self) -> String {
        let scheme = if self.plaintext { "http" } else { "https" };
        format!("{}://{}", scheme, self.endpoint)
    }

    /// Host part of the endpoint, used as the TLS server name
    pub fn host(&self) -> &str {
        self.endpoint.split(':').next().unwrap_or(&self.endpoint)
    }
}

/// gRPC block source over a lazily connected channel
pub struct GrpcBlockSource {
    channel: Channel,
}

impl GrpcBlockSource {
    /// Prepare the channel; the connection itself is made on first use
    pub fn connect_lazy(config: &ClientConfig) -> Result<Self, StreamError> {
        let invalid = |source| StreamError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            source,
        };

        let mut endpoint = Endpoint::from_shared(config.uri()).map_err(invalid)?;
        if !config.plaintext {
            let tls = ClientTlsConfig::new()
                .with_native_roots()
                .domain_name(config.host());
            endpoint = endpoint.tls_config(tls).map_err(invalid)?;
        }

        info!(endpoint = %config.endpoint, plaintext = config.plaintext, "Prepared block stream channel");
        Ok(Self {
            channel: endpoint.connect_lazy(),
        })
    }
}

#[async_trait]
impl BlockSource for GrpcBlockSource {
    async fn subscribe(
        &mut self,
        request: &SubscribeRequest,
        token: &AccessToken,
    ) -> Result<Box<dyn BlockStream>, StreamError> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await.map_err(|e| {
            StreamError::Subscribe(Box::new(tonic::Status::unknown(format!(
                "Service was not ready: {}",
                e
            ))))
        })?;

        let authorization: MetadataValue<Ascii> = token
            .bearer()
            .parse()
            .map_err(|_| StreamError::InvalidToken)?;
        let mut call = tonic::Request::new(request.to_proto());
        call.metadata_mut().insert("authorization", authorization);

        let codec: ProstCodec<pb::BlocksRequestV2, pb::BlockResponseV2> = ProstCodec::default();
        let response = grpc
            .server_streaming(call, PathAndQuery::from_static(BLOCKS_PATH), codec)
            .await
            .map_err(|status| StreamError::Subscribe(Box::new(status)))?;

        Ok(Box::new(GrpcBlockStream {
            inner: response.into_inner(),
        }))
    }
}

struct GrpcBlockStream {
    inner: tonic::Streaming<pb::BlockResponseV2>,
}

#[async_trait]
impl BlockStream for GrpcBlockStream {
    async fn recv(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        match self.inner.message().await {
            Ok(Some(response)) => Ok(Some(StreamMessage::from_proto(response))),
            Ok(None) => Ok(None),
            Err(status) => Err(StreamError::Receive(Box::new(status))),
        }
    }
}
