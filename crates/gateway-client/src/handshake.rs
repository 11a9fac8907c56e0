//! Per-socket handshake state.
//!
//! After every socket open the client waits for a `connect.challenge` event
//! or for the debounce timer, whichever comes first, and sends exactly one
//! `connect` request. The single `connect_sent` flag makes that race safe.

/// Phase of the handshake on the current socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandshakePhase {
    Idle,
    AwaitingChallenge,
    SendingConnect,
    Established,
}

#[derive(Debug)]
pub(crate) struct Handshake {
    phase: HandshakePhase,
    nonce: Option<String>,
    connect_sent: bool,
}

impl Handshake {
    pub(crate) fn new() -> Self {
        Self {
            phase: HandshakePhase::Idle,
            nonce: None,
            connect_sent: false,
        }
    }

    /// Resets for a freshly opened socket.
    pub(crate) fn on_open(&mut self) {
        *self = Self::new();
        self.phase = HandshakePhase::AwaitingChallenge;
    }

    /// Records the challenge nonce. Returns `true` if `connect` should be sent now.
    pub(crate) fn on_challenge(&mut self, nonce: String) -> bool {
        self.nonce = Some(nonce);
        self.claim_connect()
    }

    /// Returns `true` if `connect` should be sent now.
    pub(crate) fn on_debounce_elapsed(&mut self) -> bool {
        self.claim_connect()
    }

    pub(crate) fn on_connect_ok(&mut self) {
        self.phase = HandshakePhase::Established;
    }

    pub(crate) fn on_connect_failed(&mut self) {
        self.phase = HandshakePhase::Idle;
    }

    pub(crate) fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub(crate) fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    fn claim_connect(&mut self) -> bool {
        if self.connect_sent || self.phase != HandshakePhase::AwaitingChallenge {
            return false;
        }
        self.connect_sent = true;
        self.phase = HandshakePhase::SendingConnect;
        true
    }
}
