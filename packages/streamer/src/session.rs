//! Streaming Session Controller
//!
//! Drives one streaming session from the first connection attempt to the clean
//! end of stream:
//!
//! ```text
//! Connecting -> Streaming -> Completed
//!      ^            |
//!      |            v
//!      +------ Reconnecting
//! ```
//!
//! Every connection attempt acquires a fresh token and resumes from the last
//! applied cursor. Receive errors are retried forever after a fixed delay;
//! credential, subscription, decode and sink failures end the session.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthError, TokenSource};
use crate::client::{
    BlockSource, BlockStream, ForkSteps, StartPosition, StreamError, StreamMessage, SubscribeRequest,
};
use crate::config::{RETRY_DELAY, STATUS_FREQUENCY};
use crate::decoder::{BlockDecoder, DecodeError};
use crate::dedup::{DedupScope, SeenAddresses};
use crate::filter::TrackedAddresses;
use crate::model::BlockRef;
use crate::range::BlockRange;
use crate::scanner::scan_block;
use crate::sink::{AddressSink, DiscoveredAddress, SinkError};
use crate::stats::{SessionStats, SessionSummary};

/// Unrecoverable session failures
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unable to get token: {0}")]
    Auth(#[from] AuthError),

    #[error("Unable to subscribe: {0}")]
    Subscribe(StreamError),

    #[error("Unable to decode block: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unable to write discovered address: {0}")]
    Sink(#[from] SinkError),
}

/// Per-session parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub range: BlockRange,
    /// Cursor to resume from; empty starts at `range.start`
    pub start_cursor: String,
    pub fork_steps: ForkSteps,
    pub filter: String,
    pub dedup_scope: DedupScope,
    pub retry_delay: Duration,
    pub status_frequency: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            range: BlockRange::default(),
            start_cursor: String::new(),
            fork_steps: ForkSteps::default(),
            filter: String::new(),
            dedup_scope: DedupScope::default(),
            retry_delay: RETRY_DELAY,
            status_frequency: STATUS_FREQUENCY,
        }
    }
}

enum SessionState {
    Connecting,
    Streaming(Box<dyn BlockStream>),
    Reconnecting,
    Completed,
}

/// Streaming session over its collaborators
pub struct Session<T, S, D, W> {
    settings: SessionSettings,
    tokens: T,
    source: S,
    decoder: D,
    sink: W,
    tracked: TrackedAddresses,
    seen: SeenAddresses,
    cursor: String,
    last_block: Option<BlockRef>,
    stats: SessionStats,
    last_status: Instant,
}

impl<T, S, D, W> Session<T, S, D, W>
where
    T: TokenSource,
    S: BlockSource,
    D: BlockDecoder,
    W: AddressSink,
{
    pub fn new(settings: SessionSettings, tokens: T, source: S, decoder: D, sink: W) -> Self {
        let tracked = TrackedAddresses::from_filter(&settings.filter);
        if tracked.is_empty() {
            warn!(filter = %settings.filter, "Filter lists no tracked address, nothing will be discovered");
        }

        Self {
            seen: SeenAddresses::new(settings.dedup_scope),
            cursor: settings.start_cursor.clone(),
            settings,
            tokens,
            source,
            decoder,
            sink,
            tracked,
            last_block: None,
            stats: SessionStats::new(),
            last_status: Instant::now(),
        }
    }

    /// Last applied resumption cursor
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    /// Block of the last fully processed message, if any
    pub fn last_block(&self) -> Option<BlockRef> {
        self.last_block
    }

    /// Counters accumulated since the session was created
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Addresses whose call frames are scanned
    pub fn tracked(&self) -> &TrackedAddresses {
        &self.tracked
    }

    /// Request for the next connection attempt
    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest {
            start: StartPosition::resolve(&self.cursor, &self.settings.range),
            stop_block_num: self.settings.range.stop_block_num(),
            fork_steps: self.settings.fork_steps,
            filter: self.settings.filter.clone(),
        }
    }

    /// Stream until the service ends the stream cleanly
    ///
    /// The sink is flushed on every exit path; a flush failure only surfaces
    /// when the session itself succeeded.
    pub async fn run(&mut self) -> Result<SessionSummary, SessionError> {
        let result = self.drive().await;
        let flushed = self.sink.flush().await;

        match (result, flushed) {
            (Ok(()), Ok(())) => Ok(self.stats.summary()),
            (Ok(()), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(flush_err)) => {
                error!(error = %flush_err, "Unable to flush output after session failure");
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        let mut state = SessionState::Connecting;

        loop {
            state = match state {
                SessionState::Connecting => SessionState::Streaming(self.connect().await?),
                SessionState::Streaming(mut stream) => {
                    debug!("Waiting for message to reach us");
                    match stream.recv().await {
                        Ok(None) => SessionState::Completed,
                        Ok(Some(message)) => {
                            self.apply(message).await?;
                            SessionState::Streaming(stream)
                        }
                        Err(err) => {
                            error!(
                                error = %err,
                                cursor = %self.cursor,
                                last_block = %self.last_block_display(),
                                retry_delay = ?self.settings.retry_delay,
                                "Stream encountered a remote error, going to retry"
                            );
                            SessionState::Reconnecting
                        }
                    }
                }
                SessionState::Reconnecting => {
                    tokio::time::sleep(self.settings.retry_delay).await;
                    self.stats.record_reconnect();
                    SessionState::Connecting
                }
                SessionState::Completed => return Ok(()),
            };
        }
    }

    async fn connect(&mut self) -> Result<Box<dyn BlockStream>, SessionError> {
        let token = self.tokens.acquire_token().await?;
        let request = self.subscribe_request();

        info!(
            start = ?request.start,
            stop_block = request.stop_block_num,
            handle_forks = request.fork_steps.handles_forks(),
            "Starting stream"
        );

        let stream = self
            .source
            .subscribe(&request, &token)
            .await
            .map_err(SessionError::Subscribe)?;

        self.seen.begin_connection();
        Ok(stream)
    }

    async fn apply(&mut self, message: StreamMessage) -> Result<(), SessionError> {
        debug!(size = message.wire_size, "Decoding received message's block");
        let block = self.decoder.decode(&message.payload)?;
        let discovered = scan_block(&block, &self.tracked, &mut self.seen);

        let block_ref = block.block_ref();
        trace!(
            block = %block_ref,
            previous = %block.previous_ref(),
            cursor = %message.cursor,
            step = ?message.step,
            "Block received"
        );

        if !discovered.is_empty() {
            for address in discovered {
                self.sink
                    .write_address(&DiscoveredAddress {
                        address,
                        block: block_ref,
                    })
                    .await?;
            }
            self.sink.flush().await?;
        }

        // Only a fully delivered block moves the resumption point.
        self.cursor = message.cursor;
        self.last_block = Some(block_ref);

        self.stats.record_block(message.wire_size);
        self.report_status_if_due();
        Ok(())
    }

    fn report_status_if_due(&mut self) {
        if self.last_status.elapsed() < self.settings.status_frequency {
            return;
        }
        self.last_status = Instant::now();
        self.stats.record_status_report();

        let blocks = self.stats.blocks.status();
        let bytes = self.stats.bytes.status();
        let restarts = self.stats.reconnects.status();
        info!(%blocks, %bytes, %restarts, "Stream stats");
    }

    fn last_block_display(&self) -> String {
        self.last_block
            .map(|block| block.to_string())
            .unwrap_or_else(|| "None".to_string())
    }
}
