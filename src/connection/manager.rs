//! Connection manager with automatic reconnection and a serial tick loop

use crate::config::NackPolicy;
use crate::error::FatalError;
use crate::source::ReadingSource;
use crate::transport::{AckOutcome, TransportConnector, TransportSession};
use std::time::Duration;
use telemetry_shared::codec;
use telemetry_shared::protocol;
use telemetry_shared::signing::PayloadSigner;
use telemetry_shared::state_machine::{
    is_valid_transition, ConnectionState, SessionEvent, SessionState, SessionStateMachine,
    TransitionResult,
};
use telemetry_shared::{Reading, SignedFrame};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Events emitted by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Successfully connected to the collector
    Connected { endpoint: String },
    /// Connect attempt failed; another follows after the backoff delay
    ConnectFailed { reason: String, attempt: u32 },
    /// Connection discarded
    Disconnected { reason: String },
    /// Collector acknowledged a reading
    FrameAccepted { reading: Reading },
    /// Collector rejected a reading
    FrameRejected { byte: u8 },
    /// Unrecoverable error; the loop has stopped
    Fatal { reason: String },
}

/// Configuration for the tick loop
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Delay between accepted ticks
    pub tick_interval: Duration,
    /// Delay before every reconnect attempt
    pub reconnect_delay: Duration,
    /// Acknowledgment wait limit (`None` waits indefinitely)
    pub ack_timeout: Option<Duration>,
    /// Reaction to a rejected frame
    pub nack_policy: NackPolicy,
    /// Stop after this many accepted frames
    pub max_ticks: Option<u64>,
    /// Payload bound checked before signing, never above the protocol maximum
    pub max_payload_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(protocol::TICK_INTERVAL_MS),
            reconnect_delay: Duration::from_millis(protocol::RECONNECT_DELAY_MS),
            ack_timeout: None,
            nack_policy: NackPolicy::Reconnect,
            max_ticks: None,
            max_payload_size: protocol::MAX_PAYLOAD_SIZE,
        }
    }
}

/// How a connected session ended
enum SessionEnd {
    /// Tick budget reached
    Finished,
    /// Connection must be discarded and re-established
    Lost { reason: String },
}

/// Owns the connection lifecycle and drives one frame at a time
pub struct ConnectionManager<C, R, S> {
    config: ConnectionConfig,
    connector: C,
    source: R,
    signer: S,
    fsm: SessionStateMachine,
    accepted: u64,
    event_tx: Option<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl<C, R, S> ConnectionManager<C, R, S>
where
    C: TransportConnector,
    R: ReadingSource,
    S: PayloadSigner,
{
    /// Create a new connection manager in the Disconnected state
    pub fn new(config: ConnectionConfig, connector: C, source: R, signer: S) -> Self {
        Self {
            config,
            connector,
            source,
            signer,
            fsm: SessionStateMachine::new(),
            accepted: 0,
            event_tx: None,
        }
    }

    /// Receive connection events from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.event_tx = Some(event_tx);
        event_rx
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.fsm.state()
    }

    /// Connection flag and failure counter
    pub fn session(&self) -> SessionState {
        self.fsm.session()
    }

    /// Number of frames the collector has accepted
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Run until the tick budget is spent or a fatal error occurs
    ///
    /// Without `max_ticks` this only returns on a fatal error.
    pub async fn run(&mut self) -> Result<(), FatalError> {
        loop {
            if self.budget_spent() {
                info!(accepted = self.accepted, "Tick budget reached, stopping");
                return Ok(());
            }

            let mut session = self.connect().await;

            match self.drive(&mut session).await {
                Ok(SessionEnd::Finished) => {
                    session.close().await;
                    info!(accepted = self.accepted, "Tick budget reached, stopping");
                    return Ok(());
                }
                Ok(SessionEnd::Lost { reason }) => {
                    session.close().await;
                    let failures = self.session().consecutive_failures;
                    warn!(failures, "Connection discarded: {}", reason);
                    self.emit(ConnectionEvent::Disconnected { reason });
                    sleep(self.config.reconnect_delay).await;
                }
                Err(e) => {
                    session.close().await;
                    return Err(e);
                }
            }
        }
    }

    /// Connect, retrying forever with a fixed delay
    async fn connect(&mut self) -> TransportSession<C::Stream> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.transition(SessionEvent::ConnectStarted);
            debug!(attempt, "Connecting to {}", self.connector.endpoint());

            match self.connector.connect().await {
                Ok(stream) => {
                    self.transition(SessionEvent::ConnectSucceeded);
                    let endpoint = self.connector.endpoint();
                    info!(attempt, "Connected to {}", endpoint);
                    self.emit(ConnectionEvent::Connected { endpoint });
                    return TransportSession::new(stream, self.config.ack_timeout);
                }
                Err(e) => {
                    self.transition(SessionEvent::ConnectFailed);
                    warn!(
                        attempt,
                        failures = self.session().consecutive_failures,
                        "Connect to {} failed: {}; retrying in {:?}",
                        self.connector.endpoint(),
                        e,
                        self.config.reconnect_delay
                    );
                    self.emit(ConnectionEvent::ConnectFailed {
                        reason: e.to_string(),
                        attempt,
                    });
                    sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    /// Tick on a live session until it has to be discarded
    async fn drive(
        &mut self,
        session: &mut TransportSession<C::Stream>,
    ) -> Result<SessionEnd, FatalError> {
        // Frame held back for a resend under NackPolicy::RetryInPlace
        let mut pending: Option<(Reading, SignedFrame)> = None;

        loop {
            let (reading, frame) = match pending.take() {
                Some(held) => held,
                None => self.prepare_frame()?,
            };

            self.transition(SessionEvent::FrameReady);
            let outcome = session.send_frame(&frame).await;

            if let AckOutcome::SendFailed { .. } = outcome {
                self.transition(SessionEvent::ConnectionLost);
                return Ok(SessionEnd::Lost {
                    reason: outcome.to_string(),
                });
            }
            self.transition(SessionEvent::FrameWritten);

            match outcome {
                AckOutcome::Accepted => {
                    self.transition(SessionEvent::FrameAccepted);
                    self.accepted += 1;
                    info!(
                        id = reading.id,
                        timestamp = reading.timestamp,
                        temperature = reading.temperature,
                        pressure = reading.pressure,
                        humidity = reading.humidity,
                        "Reading accepted"
                    );
                    self.emit(ConnectionEvent::FrameAccepted { reading });

                    if self.budget_spent() {
                        return Ok(SessionEnd::Finished);
                    }
                }
                AckOutcome::Rejected { byte } => {
                    self.emit(ConnectionEvent::FrameRejected { byte });
                    match self.config.nack_policy {
                        NackPolicy::Reconnect => {
                            self.transition(SessionEvent::ConnectionLost);
                            return Ok(SessionEnd::Lost {
                                reason: outcome.to_string(),
                            });
                        }
                        NackPolicy::RetryInPlace => {
                            self.transition(SessionEvent::FrameRejectedKept);
                            warn!(
                                failures = self.session().consecutive_failures,
                                "Reading {}; resending on the same connection",
                                outcome
                            );
                            pending = Some((reading, frame));
                        }
                    }
                }
                _ => {
                    debug_assert!(outcome.is_transient());
                    self.transition(SessionEvent::ConnectionLost);
                    return Ok(SessionEnd::Lost {
                        reason: outcome.to_string(),
                    });
                }
            }

            sleep(self.config.tick_interval).await;
        }
    }

    fn budget_spent(&self) -> bool {
        self.config.max_ticks.is_some_and(|max| self.accepted >= max)
    }

    /// Produce, serialize, size-check and sign one reading
    fn prepare_frame(&mut self) -> Result<(Reading, SignedFrame), FatalError> {
        let reading = self.source.next_reading();

        // Size is checked before any signing work
        let payload = codec::serialize_with_limit(&reading, self.config.max_payload_size)
            .map_err(|e| self.fail(e.into()))?;
        let signature = self.signer.sign(&payload).map_err(|e| self.fail(e.into()))?;

        Ok((reading, SignedFrame::new(signature, payload)))
    }

    /// Enter the terminal state
    fn fail(&mut self, err: FatalError) -> FatalError {
        let from = self.state();
        self.transition(SessionEvent::FatalError);
        debug_assert!(self.fsm.is_fatal());
        error!(?from, "Fatal: {}", err);
        self.emit(ConnectionEvent::Fatal {
            reason: err.to_string(),
        });
        err
    }

    fn transition(&mut self, event: SessionEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => {
                debug_assert!(from == to || is_valid_transition(from, to));
                debug!("State {:?} -> {:?}", from, to);
            }
            TransitionResult::Fatal { from } => {
                debug!("State {:?} -> {:?}", from, ConnectionState::Fatal);
            }
            TransitionResult::Invalid { from, event } => {
                error!("Invalid transition from {:?} on {:?}", from, event);
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportStream;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use telemetry_shared::codec::FrameDecoder;
    use telemetry_shared::SigningError;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::Instant;

    const SIG_LEN: usize = 8;

    /// Collector behaviour for one connection
    #[derive(Debug, Clone)]
    enum Script {
        /// Reply with these bytes in order, then ACK everything
        Replies(Vec<u8>),
        /// Read one frame and hang up without replying
        HangUp,
        /// Drop the stream before anything is written
        DropBeforeRead,
    }

    #[derive(Default)]
    struct Collected {
        payloads: Mutex<Vec<Bytes>>,
        bytes: AtomicUsize,
    }

    struct MockConnector {
        failures_left: Mutex<u32>,
        attempts: Mutex<Vec<Instant>>,
        scripts: Mutex<VecDeque<Script>>,
        collected: Arc<Collected>,
    }

    impl MockConnector {
        fn new(failures: u32, scripts: Vec<Script>) -> Self {
            Self {
                failures_left: Mutex::new(failures),
                attempts: Mutex::new(Vec::new()),
                scripts: Mutex::new(scripts.into()),
                collected: Arc::new(Collected::default()),
            }
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransportConnector for MockConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> Result<DuplexStream> {
            self.attempts.lock().unwrap().push(Instant::now());
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(anyhow!("connection refused"));
                }
            }

            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Replies(Vec::new()));
            let (client, collector) = duplex(4096);
            match script {
                Script::DropBeforeRead => drop(collector),
                script => {
                    tokio::spawn(mock_collector(collector, script, self.collected.clone()));
                }
            }
            Ok(client)
        }

        fn endpoint(&self) -> String {
            "mock://collector".into()
        }
    }

    async fn mock_collector(mut stream: DuplexStream, script: Script, collected: Arc<Collected>) {
        let mut decoder = FrameDecoder::new(SIG_LEN);
        let mut replies: VecDeque<u8> = match &script {
            Script::Replies(bytes) => bytes.iter().copied().collect(),
            Script::HangUp | Script::DropBeforeRead => VecDeque::new(),
        };
        let mut buf = [0u8; 1024];

        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            collected.bytes.fetch_add(n, Ordering::SeqCst);
            decoder.extend(&buf[..n]);

            while let Ok(Some(decoded)) = decoder.decode_next() {
                collected.payloads.lock().unwrap().push(decoded.frame.payload);
                if let Script::HangUp = script {
                    return;
                }
                let reply = replies.pop_front().unwrap_or(protocol::ACK);
                if stream.write_all(&[reply]).await.is_err() {
                    return;
                }
            }
        }
    }

    /// Fixed reading with an increasing id
    struct CountingSource {
        next_id: i16,
    }

    impl ReadingSource for CountingSource {
        fn next_reading(&mut self) -> Reading {
            self.next_id += 1;
            Reading {
                id: self.next_id,
                timestamp: 1_700_000_000,
                temperature: 25.5,
                pressure: 1013.0,
                humidity: 55.0,
            }
        }
    }

    /// Signature is the first SIG_LEN payload bytes, padded
    #[derive(Default)]
    struct FakeSigner {
        calls: Arc<AtomicUsize>,
        broken: bool,
    }

    impl PayloadSigner for FakeSigner {
        fn signature_len(&self) -> usize {
            SIG_LEN
        }

        fn sign_into(&self, payload: &[u8], out: &mut [u8]) -> Result<usize, SigningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(SigningError::Primitive("context init failed".into()));
            }
            for (i, slot) in out[..SIG_LEN].iter_mut().enumerate() {
                *slot = payload.get(i).copied().unwrap_or(0);
            }
            Ok(SIG_LEN)
        }
    }

    fn test_config(max_ticks: u64) -> ConnectionConfig {
        ConnectionConfig {
            max_ticks: Some(max_ticks),
            ..Default::default()
        }
    }

    fn manager(
        config: ConnectionConfig,
        connector: MockConnector,
        signer: FakeSigner,
    ) -> ConnectionManager<MockConnector, CountingSource, FakeSigner> {
        ConnectionManager::new(config, connector, CountingSource { next_id: 0 }, signer)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_two_failed_connects() {
        let mut mgr = manager(test_config(1), MockConnector::new(2, vec![]), FakeSigner::default());
        let mut events = mgr.subscribe();

        mgr.run().await.expect("run failed");

        let attempts = mgr.connector.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], Duration::from_secs(5));
        assert_eq!(attempts[2] - attempts[1], Duration::from_secs(5));

        let events = drain(&mut events);
        assert!(matches!(events[0], ConnectionEvent::ConnectFailed { attempt: 1, .. }));
        assert!(matches!(events[1], ConnectionEvent::ConnectFailed { attempt: 2, .. }));
        assert!(matches!(events[2], ConnectionEvent::Connected { .. }));
        assert!(matches!(events[3], ConnectionEvent::FrameAccepted { .. }));
        assert_eq!(mgr.session().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_spaced_by_interval() {
        let mut mgr = manager(test_config(3), MockConnector::new(0, vec![]), FakeSigner::default());
        let mut events = mgr.subscribe();

        let start = Instant::now();
        mgr.run().await.expect("run failed");

        // Two sleeps between three accepted ticks, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(mgr.accepted(), 3);
        assert_eq!(mgr.connector.attempts().len(), 1);

        let accepted: Vec<i16> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ConnectionEvent::FrameAccepted { reading } => Some(reading.id),
                _ => None,
            })
            .collect();
        assert_eq!(accepted, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_forces_reconnect() {
        let connector = MockConnector::new(0, vec![Script::Replies(vec![0x00])]);
        let mut mgr = manager(test_config(1), connector, FakeSigner::default());
        let mut events = mgr.subscribe();

        mgr.run().await.expect("run failed");

        assert_eq!(mgr.connector.attempts().len(), 2);
        let events = drain(&mut events);
        assert!(matches!(events[0], ConnectionEvent::Connected { .. }));
        assert_eq!(events[1], ConnectionEvent::FrameRejected { byte: 0x00 });
        assert!(matches!(events[2], ConnectionEvent::Disconnected { .. }));
        assert!(matches!(events[3], ConnectionEvent::Connected { .. }));
        assert!(matches!(events[4], ConnectionEvent::FrameAccepted { .. }));

        // A fresh reading is produced after reconnecting
        let payloads = mgr.connector.collected.payloads.lock().unwrap().clone();
        assert_eq!(payloads.len(), 2);
        assert_ne!(payloads[0], payloads[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_retry_in_place_resends_same_frame() {
        let connector = MockConnector::new(0, vec![Script::Replies(vec![0xFF])]);
        let config = ConnectionConfig {
            nack_policy: NackPolicy::RetryInPlace,
            ..test_config(1)
        };
        let signer = FakeSigner::default();
        let calls = signer.calls.clone();
        let mut mgr = manager(config, connector, signer);

        mgr.run().await.expect("run failed");

        assert_eq!(mgr.connector.attempts().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let payloads = mgr.connector.collected.payloads.lock().unwrap().clone();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0], payloads[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_closed_reconnects_after_backoff() {
        let connector = MockConnector::new(0, vec![Script::HangUp]);
        let mut mgr = manager(test_config(1), connector, FakeSigner::default());
        let mut events = mgr.subscribe();

        mgr.run().await.expect("run failed");

        let attempts = mgr.connector.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1] - attempts[0], Duration::from_secs(5));

        let disconnected = drain(&mut events)
            .into_iter()
            .find_map(|e| match e {
                ConnectionEvent::Disconnected { reason } => Some(reason),
                _ => None,
            })
            .expect("no disconnect event");
        assert!(disconnected.contains("peer closed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_reconnects_after_backoff() {
        let connector = MockConnector::new(0, vec![Script::DropBeforeRead]);
        let mut mgr = manager(test_config(1), connector, FakeSigner::default());
        let mut events = mgr.subscribe();

        mgr.run().await.expect("run failed");

        let attempts = mgr.connector.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1] - attempts[0], Duration::from_secs(5));
        assert_eq!(mgr.accepted(), 1);

        let events = drain(&mut events);
        assert!(matches!(events[0], ConnectionEvent::Connected { .. }));
        assert!(
            matches!(events[1], ConnectionEvent::Disconnected { ref reason } if reason.contains("send failed"))
        );
        assert!(matches!(events[2], ConnectionEvent::Connected { .. }));
        assert!(matches!(events[3], ConnectionEvent::FrameAccepted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_counts_as_transient_loss() {
        let mut mgr = manager(test_config(1), MockConnector::new(0, vec![]), FakeSigner::default());

        let (client, collector) = duplex(4096);
        drop(collector);
        let mut session = TransportSession::new(client, None);
        mgr.transition(SessionEvent::ConnectStarted);
        mgr.transition(SessionEvent::ConnectSucceeded);

        let end = mgr.drive(&mut session).await.expect("drive failed");

        assert!(matches!(end, SessionEnd::Lost { ref reason } if reason.contains("send failed")));
        // Sending -> Disconnected went through; a rejected transition would leave Sending
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(mgr.session().consecutive_failures, 1);
        assert!(!mgr.session().connected);
        assert_eq!(mgr.accepted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_tick_budget_never_connects() {
        let signer = FakeSigner::default();
        let calls = signer.calls.clone();
        let mut mgr = manager(test_config(0), MockConnector::new(0, vec![]), signer);

        mgr.run().await.expect("run failed");

        assert_eq!(mgr.accepted(), 0);
        assert!(mgr.connector.attempts().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_payload_is_fatal_and_unsigned() {
        let config = ConnectionConfig {
            max_payload_size: 16,
            ..test_config(1)
        };
        let signer = FakeSigner::default();
        let calls = signer.calls.clone();
        let mut mgr = manager(config, MockConnector::new(0, vec![]), signer);
        let mut events = mgr.subscribe();

        let result = mgr.run().await;

        assert!(matches!(
            result,
            Err(FatalError::Codec(telemetry_shared::CodecError::PayloadTooLarge { .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mgr.state(), ConnectionState::Fatal);
        assert!(!mgr.session().connected);

        // Give the collector task a chance to observe anything that was sent
        tokio::task::yield_now().await;
        assert_eq!(mgr.connector.collected.bytes.load(Ordering::SeqCst), 0);

        let events = drain(&mut events);
        assert!(matches!(events.last(), Some(ConnectionEvent::Fatal { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signing_failure_is_fatal() {
        let signer = FakeSigner {
            broken: true,
            ..Default::default()
        };
        let mut mgr = manager(test_config(1), MockConnector::new(0, vec![]), signer);

        let result = mgr.run().await;

        assert!(matches!(result, Err(FatalError::Signing(_))));
        assert_eq!(mgr.state(), ConnectionState::Fatal);
        assert_eq!(mgr.accepted(), 0);
        assert_eq!(mgr.connector.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_timeout_discards_connection() {
        let config = ConnectionConfig {
            ack_timeout: Some(Duration::from_secs(2)),
            ..test_config(1)
        };
        let mut mgr = manager(config, MockConnector::new(0, vec![]), FakeSigner::default());

        // A collector that reads everything and never answers
        let (client, mut collector) = duplex(4096);
        let silent = tokio::spawn(async move {
            let mut total = 0;
            let mut buf = [0u8; 1024];
            while let Ok(n) = collector.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                total += n;
            }
            total
        });

        let mut session = TransportSession::new(client, mgr.config.ack_timeout);
        mgr.transition(SessionEvent::ConnectStarted);
        mgr.transition(SessionEvent::ConnectSucceeded);

        let started = Instant::now();
        let end = mgr.drive(&mut session).await.expect("drive failed");
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(matches!(end, SessionEnd::Lost { ref reason } if reason.contains("no acknowledgment")));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(mgr.session().consecutive_failures, 1);

        session.close().await;
        assert!(silent.await.unwrap() > SIG_LEN);

        // The regular loop reconnects and is acknowledged
        mgr.run().await.expect("run failed");
        assert_eq!(mgr.accepted(), 1);
    }

    #[tokio::test]
    async fn test_duplex_stream_shutdown() {
        let (mut client, mut collector) = duplex(64);
        TransportStream::shutdown(&mut client).await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(collector.read(&mut buf).await.unwrap(), 0);
    }
}
