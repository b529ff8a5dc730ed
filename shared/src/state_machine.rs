//! Producer Connection State Machine
//!
//! Defines valid connection-state transitions and the session counters the
//! reconnect loop relies on.

/// Connection states of the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; a connect attempt is due after backoff
    Disconnected,
    /// Opening a stream to the collector
    Connecting,
    /// Idle between ticks on a live connection
    Connected,
    /// Writing a frame
    Sending,
    /// Frame written, waiting for the acknowledgment byte
    AwaitingAck,
    /// Unrecoverable local error; no further ticks
    Fatal,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connect attempt started
    ConnectStarted,
    /// Stream established
    ConnectSucceeded,
    /// Stream could not be established
    ConnectFailed,
    /// A signed frame is ready to write
    FrameReady,
    /// Frame fully written
    FrameWritten,
    /// Collector accepted the frame
    FrameAccepted,
    /// Collector rejected the frame and the connection is kept
    FrameRejectedKept,
    /// Connection is discarded (send failure, peer closed, read error, NACK)
    ConnectionLost,
    /// Oversized payload or signing failure
    FatalError,
}

/// Result of a state transition attempt
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(ConnectionState),
    /// Transition was invalid from current state
    Invalid {
        from: ConnectionState,
        event: SessionEvent,
    },
    /// Transition entered the terminal state
    Fatal { from: ConnectionState },
}

/// Counters owned by the connection manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    pub consecutive_failures: u32,
}

/// The connection state machine for one producer
#[derive(Debug)]
pub struct SessionStateMachine {
    current_state: ConnectionState,
    session: SessionState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            session: SessionState::default(),
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// Get the session counters
    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn is_fatal(&self) -> bool {
        self.current_state == ConnectionState::Fatal
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        // Fatal is reachable from anywhere and never left
        if event == SessionEvent::FatalError {
            let from = self.current_state;
            self.current_state = ConnectionState::Fatal;
            self.session.connected = false;
            return TransitionResult::Fatal { from };
        }

        match self.get_next_state(&event) {
            Some(state) => {
                self.apply_counters(&event);
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &SessionEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use SessionEvent::*;

        match (self.current_state, event) {
            (Disconnected, ConnectStarted) => Some(Connecting),

            (Connecting, ConnectSucceeded) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Disconnected),

            (Connected, FrameReady) => Some(Sending),
            (Sending, FrameWritten) => Some(AwaitingAck),

            (AwaitingAck, FrameAccepted) => Some(Connected),
            (AwaitingAck, FrameRejectedKept) => Some(Connected),

            // Any live state can lose its connection
            (Connected | Sending | AwaitingAck, ConnectionLost) => Some(Disconnected),

            _ => None,
        }
    }

    fn apply_counters(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::ConnectSucceeded => self.session.connected = true,
            SessionEvent::ConnectFailed | SessionEvent::FrameRejectedKept => {
                self.session.consecutive_failures += 1;
            }
            SessionEvent::ConnectionLost => {
                self.session.connected = false;
                self.session.consecutive_failures += 1;
            }
            SessionEvent::FrameAccepted => self.session.consecutive_failures = 0,
            _ => {}
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;

    match (from, to) {
        (Fatal, _) => false,
        (_, Fatal) => true,

        (Disconnected, Connecting) => true,
        (Connecting, Connected | Disconnected) => true,
        (Connected, Sending) => true,
        (Sending, AwaitingAck) => true,
        (AwaitingAck, Connected) => true,
        (Connected | Sending | AwaitingAck, Disconnected) => true,

        _ => false,
    }
}
