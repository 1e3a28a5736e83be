//! Mock Session Pipeline Tests
//!
//! Runs full sessions against scripted token, stream and sink mocks (no network).
//! Verifies connect → receive → decode → scan → emit, including reconnects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use prost::Message;

use txnscope_streamer::auth::{AccessToken, AuthError, TokenSource};
use txnscope_streamer::client::{
    BlockSource, BlockStream, ForkStep, ForkSteps, StartPosition, StreamError, StreamMessage,
    SubscribeRequest,
};
use txnscope_streamer::decoder::ProtoBlockDecoder;
use txnscope_streamer::dedup::DedupScope;
use txnscope_streamer::pb::codec;
use txnscope_streamer::range::BlockRange;
use txnscope_streamer::session::{Session, SessionError, SessionSettings};
use txnscope_streamer::sink::{AddressSink, DiscoveredAddress, OutputSink, OutputTarget, SinkError};

/// Token source counting how many tokens were issued
#[derive(Clone, Default)]
struct CountingTokenSource {
    issued: Arc<AtomicUsize>,
}

#[async_trait]
impl TokenSource for CountingTokenSource {
    async fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(AccessToken::new(format!("token-{n}")))
    }
}

type Script = VecDeque<Result<Option<StreamMessage>, StreamError>>;

/// Mock stream replaying a script, then ending cleanly
struct MockBlockStream {
    script: Script,
}

#[async_trait]
impl BlockStream for MockBlockStream {
    async fn recv(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

/// Mock block source handing out one script per connection
struct MockBlockSource {
    connections: VecDeque<Script>,
    requests: Arc<Mutex<Vec<SubscribeRequest>>>,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl MockBlockSource {
    fn new(connections: Vec<Script>) -> Self {
        Self {
            connections: connections.into(),
            requests: Arc::new(Mutex::new(Vec::new())),
            tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Arc<Mutex<Vec<SubscribeRequest>>> {
        self.requests.clone()
    }

    fn tokens(&self) -> Arc<Mutex<Vec<String>>> {
        self.tokens.clone()
    }
}

#[async_trait]
impl BlockSource for MockBlockSource {
    async fn subscribe(
        &mut self,
        request: &SubscribeRequest,
        token: &AccessToken,
    ) -> Result<Box<dyn BlockStream>, StreamError> {
        self.requests.lock().unwrap().push(request.clone());
        self.tokens.lock().unwrap().push(token.secret().to_string());

        let script = self
            .connections
            .pop_front()
            .ok_or_else(|| StreamError::Transport("connection refused".to_string()))?;
        Ok(Box::new(MockBlockStream { script }))
    }
}

/// Mock sink that captures written addresses
#[derive(Clone, Default)]
struct MockSink {
    written: Arc<Mutex<Vec<DiscoveredAddress>>>,
    fail_after: Option<usize>,
}

impl MockSink {
    fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Default::default()
        }
    }

    fn addresses(&self) -> Vec<Address> {
        self.written.lock().unwrap().iter().map(|d| d.address).collect()
    }

    fn blocks(&self) -> Vec<u64> {
        self.written.lock().unwrap().iter().map(|d| d.block.number).collect()
    }
}

#[async_trait]
impl AddressSink for MockSink {
    async fn write_address(&mut self, discovered: &DiscoveredAddress) -> Result<(), SinkError> {
        let mut written = self.written.lock().unwrap();
        if self.fail_after.is_some_and(|limit| written.len() >= limit) {
            return Err(SinkError::Flush(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        written.push(*discovered);
        Ok(())
    }
}

fn tracked_contract() -> Address {
    Address::repeat_byte(0x77)
}

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn settings() -> SessionSettings {
    SessionSettings {
        range: BlockRange {
            start: 1000,
            end: Some(1010),
        },
        filter: format!("to in ['{:#x}']", tracked_contract()),
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

/// Build a stream message for a block with one call to `target`
fn block_message(number: u64, target: Address, transfers: &[(Address, Address)]) -> StreamMessage {
    let block = codec::Block {
        ver: 1,
        hash: vec![number as u8; 32],
        number,
        header: Some(codec::BlockHeader {
            parent_hash: vec![number.wrapping_sub(1) as u8; 32],
        }),
        transaction_traces: vec![codec::TransactionTrace {
            hash: vec![0xee; 32],
            calls: vec![codec::Call {
                address: target.to_vec(),
                erc20_transfer_events: transfers
                    .iter()
                    .map(|(from, to)| codec::Erc20TransferEvent {
                        from: from.to_vec(),
                        to: to.to_vec(),
                        amount: vec![0x01, 0x00],
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    let payload = block.encode_to_vec();

    StreamMessage {
        wire_size: payload.len() + 16,
        payload,
        cursor: format!("cursor-{number}"),
        step: Some(ForkStep::New),
    }
}

fn tracked_block(number: u64, transfers: &[(Address, Address)]) -> StreamMessage {
    block_message(number, tracked_contract(), transfers)
}

fn transport_error() -> Result<Option<StreamMessage>, StreamError> {
    Err(StreamError::Transport("connection reset by peer".to_string()))
}

// ==================== End-to-end tests ====================

#[tokio::test]
async fn test_three_blocks_with_mid_stream_failure() {
    let source = MockBlockSource::new(vec![
        Script::from([
            Ok(Some(tracked_block(1000, &[(addr(0x01), addr(0x02))]))),
            Ok(Some(tracked_block(1001, &[(addr(0x03), addr(0x04))]))),
            transport_error(),
        ]),
        Script::from([Ok(Some(tracked_block(1002, &[(addr(0x05), addr(0x06))])))]),
    ]);
    let requests = source.requests();
    let sink = MockSink::default();
    let tokens = CountingTokenSource::default();

    let mut session = Session::new(settings(), tokens.clone(), source, ProtoBlockDecoder, sink.clone());
    let summary = session.run().await.unwrap();

    assert_eq!(summary.reconnect_count, 1);
    assert_eq!(summary.blocks_received, 3);
    assert!(summary.time_to_first_block.is_some());
    assert_eq!(
        sink.addresses(),
        vec![addr(0x01), addr(0x02), addr(0x03), addr(0x04), addr(0x05), addr(0x06)]
    );
    assert_eq!(sink.blocks(), vec![1000, 1000, 1001, 1001, 1002, 1002]);

    // A fresh token per connection attempt
    assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reconnect_resumes_from_last_applied_cursor() {
    let source = MockBlockSource::new(vec![
        Script::from([
            Ok(Some(tracked_block(1000, &[]))),
            Ok(Some(tracked_block(1001, &[]))),
            transport_error(),
        ]),
        Script::new(),
    ]);
    let requests = source.requests();
    let tokens_seen = source.tokens();

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        MockSink::default(),
    );
    session.run().await.unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].start, StartPosition::Block(1000));
    assert_eq!(requests[1].start, StartPosition::Cursor("cursor-1001".to_string()));
    assert_eq!(requests[1].stop_block_num, 1010);
    assert_eq!(requests[1].filter, requests[0].filter);

    assert_eq!(*tokens_seen.lock().unwrap(), vec!["token-0", "token-1"]);
}

#[tokio::test]
async fn test_failure_before_first_block_restarts_from_range() {
    let source = MockBlockSource::new(vec![
        Script::from([transport_error()]),
        Script::from([transport_error()]),
        Script::from([Ok(Some(tracked_block(1000, &[])))]),
    ]);
    let requests = source.requests();

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        MockSink::default(),
    );
    let summary = session.run().await.unwrap();

    assert_eq!(summary.reconnect_count, 2);
    assert_eq!(summary.blocks_received, 1);
    assert!(requests
        .lock()
        .unwrap()
        .iter()
        .all(|request| request.start == StartPosition::Block(1000)));
}

#[tokio::test]
async fn test_cursor_tracks_each_message() {
    let source = MockBlockSource::new(vec![Script::from([
        Ok(Some(tracked_block(1000, &[]))),
        Ok(Some(tracked_block(1001, &[]))),
        Ok(Some(tracked_block(1002, &[]))),
    ])]);

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        MockSink::default(),
    );
    assert_eq!(session.cursor(), "");

    let summary = session.run().await.unwrap();
    assert_eq!(session.cursor(), "cursor-1002");
    assert_eq!(session.last_block().map(|b| b.number), Some(1002));
    assert_eq!(summary.blocks_received, 3);
    assert_eq!(summary.reconnect_count, 0);
    assert!(!summary.to_string().contains("Restart count"));
}

// ==================== Discovery tests ====================

#[tokio::test]
async fn test_shared_counterparty_emitted_once_per_connection() {
    let source = MockBlockSource::new(vec![Script::from([
        Ok(Some(tracked_block(1000, &[(addr(0x0a), addr(0x0b)), (addr(0x0b), addr(0x0c))]))),
        Ok(Some(tracked_block(1001, &[(addr(0x0c), addr(0x0a))]))),
    ])]);
    let sink = MockSink::default();

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        sink.clone(),
    );
    session.run().await.unwrap();

    assert_eq!(sink.addresses(), vec![addr(0x0a), addr(0x0b), addr(0x0c)]);
}

#[tokio::test]
async fn test_untracked_calls_and_zero_address_are_ignored() {
    let source = MockBlockSource::new(vec![Script::from([
        Ok(Some(block_message(1000, addr(0x99), &[(addr(0x01), addr(0x02))]))),
        Ok(Some(tracked_block(1001, &[(Address::ZERO, addr(0x03)), (addr(0x03), Address::ZERO)]))),
    ])]);
    let sink = MockSink::default();

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        sink.clone(),
    );
    let summary = session.run().await.unwrap();

    assert_eq!(summary.blocks_received, 2);
    assert_eq!(sink.addresses(), vec![addr(0x03)]);
}

#[tokio::test]
async fn test_connection_scope_re_emits_after_reconnect() {
    let source = MockBlockSource::new(vec![
        Script::from([Ok(Some(tracked_block(1000, &[(addr(0x01), addr(0x02))]))), transport_error()]),
        Script::from([Ok(Some(tracked_block(1001, &[(addr(0x01), addr(0x02))])))]),
    ]);
    let sink = MockSink::default();

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        sink.clone(),
    );
    session.run().await.unwrap();

    assert_eq!(sink.addresses(), vec![addr(0x01), addr(0x02), addr(0x01), addr(0x02)]);
}

#[tokio::test]
async fn test_process_scope_never_re_emits() {
    let source = MockBlockSource::new(vec![
        Script::from([Ok(Some(tracked_block(1000, &[(addr(0x01), addr(0x02))]))), transport_error()]),
        Script::from([Ok(Some(tracked_block(1001, &[(addr(0x01), addr(0x02))])))]),
    ]);
    let sink = MockSink::default();
    let settings = SessionSettings {
        dedup_scope: DedupScope::Process,
        ..settings()
    };

    let mut session = Session::new(
        settings,
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        sink.clone(),
    );
    let summary = session.run().await.unwrap();

    assert_eq!(summary.reconnect_count, 1);
    assert_eq!(sink.addresses(), vec![addr(0x01), addr(0x02)]);
}

#[tokio::test]
async fn test_fork_aware_session_scans_every_step() {
    let mut undo = tracked_block(1001, &[(addr(0x05), addr(0x06))]);
    undo.step = Some(ForkStep::Undo);

    let source = MockBlockSource::new(vec![Script::from([Ok(Some(undo))])]);
    let requests = source.requests();
    let sink = MockSink::default();
    let settings = SessionSettings {
        fork_steps: ForkSteps::WithForks,
        ..settings()
    };

    let mut session = Session::new(
        settings,
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        sink.clone(),
    );
    session.run().await.unwrap();

    assert_eq!(requests.lock().unwrap()[0].fork_steps, ForkSteps::WithForks);
    assert_eq!(sink.addresses(), vec![addr(0x05), addr(0x06)]);
}

// ==================== Fatal error tests ====================

#[tokio::test]
async fn test_decode_error_aborts_session() {
    let mut corrupt = tracked_block(1001, &[]);
    corrupt.payload = vec![0x0a, 0xff];

    let source = MockBlockSource::new(vec![Script::from([
        Ok(Some(tracked_block(1000, &[(addr(0x01), addr(0x02))]))),
        Ok(Some(corrupt)),
        Ok(Some(tracked_block(1002, &[(addr(0x03), addr(0x04))]))),
    ])]);
    let sink = MockSink::default();

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        sink.clone(),
    );
    let result = session.run().await;

    assert!(matches!(result, Err(SessionError::Decode(_))));
    assert_eq!(sink.addresses(), vec![addr(0x01), addr(0x02)]);
    assert_eq!(session.cursor(), "cursor-1000");
}

#[tokio::test]
async fn test_sink_error_aborts_session() {
    let source = MockBlockSource::new(vec![Script::from([
        Ok(Some(tracked_block(1000, &[(addr(0x01), addr(0x02))]))),
        Ok(Some(tracked_block(1001, &[(addr(0x03), addr(0x04))]))),
    ])]);
    let sink = MockSink::failing_after(3);

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        sink.clone(),
    );
    let result = session.run().await;

    assert!(matches!(result, Err(SessionError::Sink(_))));
    assert_eq!(sink.addresses(), vec![addr(0x01), addr(0x02), addr(0x03)]);
    assert_eq!(session.stats().blocks.total(), 1);
    // The partially written block is not acknowledged.
    assert_eq!(session.cursor(), "cursor-1000");
    assert_eq!(session.last_block().map(|b| b.number), Some(1000));
}

#[tokio::test]
async fn test_subscription_failure_is_not_retried() {
    let source = MockBlockSource::new(vec![]);
    let requests = source.requests();

    let mut session = Session::new(
        settings(),
        CountingTokenSource::default(),
        source,
        ProtoBlockDecoder,
        MockSink::default(),
    );
    let result = session.run().await;

    assert!(matches!(result, Err(SessionError::Subscribe(_))));
    assert_eq!(requests.lock().unwrap().len(), 1);
}

// ==================== Output tests ====================

#[tokio::test]
async fn test_session_writes_addresses_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("{range}").join("addresses.txt");
    let range = settings().range;
    let target = OutputTarget::parse(&raw.to_string_lossy(), &range);

    let OutputTarget::File(path) = target.clone() else {
        panic!("expected a file target, got {target:?}");
    };
    assert!(path.to_string_lossy().contains("1000-1010"));

    let sink = OutputSink::open(&target, "unused").await.unwrap();
    let source = MockBlockSource::new(vec![Script::from([Ok(Some(tracked_block(
        1000,
        &[(addr(0xab), addr(0xcd))],
    )))])]);

    let mut session = Session::new(settings(), CountingTokenSource::default(), source, ProtoBlockDecoder, sink);
    session.run().await.unwrap();
    drop(session);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        contents,
        format!("{:#x}\n{:#x}\n", addr(0xab), addr(0xcd))
    );
}

/// Stream that snapshots the output file before handing out each message
struct FileObservingStream {
    script: Script,
    path: std::path::PathBuf,
    observed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl BlockStream for FileObservingStream {
    async fn recv(&mut self) -> Result<Option<StreamMessage>, StreamError> {
        let contents = std::fs::read_to_string(&self.path).unwrap_or_default();
        self.observed.lock().unwrap().push(contents);
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

struct FileObservingSource {
    stream: Option<FileObservingStream>,
}

#[async_trait]
impl BlockSource for FileObservingSource {
    async fn subscribe(
        &mut self,
        _request: &SubscribeRequest,
        _token: &AccessToken,
    ) -> Result<Box<dyn BlockStream>, StreamError> {
        match self.stream.take() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(StreamError::Transport("already subscribed".to_string())),
        }
    }
}

#[tokio::test]
async fn test_file_output_is_visible_while_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("addresses.txt");
    let sink = OutputSink::open(&OutputTarget::File(path.clone()), "unused")
        .await
        .unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let source = FileObservingSource {
        stream: Some(FileObservingStream {
            script: Script::from([
                Ok(Some(tracked_block(1000, &[(addr(0x01), addr(0x02))]))),
                Ok(Some(tracked_block(1001, &[]))),
                Ok(Some(tracked_block(1002, &[(addr(0x03), addr(0x04))]))),
            ]),
            path: path.clone(),
            observed: observed.clone(),
        }),
    };

    let mut session = Session::new(settings(), CountingTokenSource::default(), source, ProtoBlockDecoder, sink);
    session.run().await.unwrap();

    let first_block = format!("{:#x}\n{:#x}\n", addr(0x01), addr(0x02));
    let all_blocks = format!("{first_block}{:#x}\n{:#x}\n", addr(0x03), addr(0x04));

    // One snapshot per recv: before each of the three blocks, then before the end of stream.
    let observed = observed.lock().unwrap();
    assert_eq!(
        *observed,
        vec![String::new(), first_block.clone(), first_block, all_blocks]
    );
}
