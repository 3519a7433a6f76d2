//! Stanza Sequencer (C2, §4.2): per-conversation monotonic counters. Client
//! stanzas count up from 1; server stanzas count down from -1. Mirrors the
//! `client_stanza_high`/`server_stanza_low` columns the Store persists.

/// Result of observing an inbound client stanza id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientObservation {
    /// Already seen (id <= last high watermark) — idempotent ACK, no
    /// reprocessing (P5).
    Duplicate,
    /// More than one past the expected next id — the server should request
    /// a `SyncRequest` from the client.
    Gap { expected: i32 },
    /// Exactly the expected next id.
    InOrder,
}

/// Per-conversation sequencing state, kept in memory and mirrored to the
/// Store on every mutation (I1: `client_stanza_high` never decreases,
/// `server_stanza_low` never increases).
#[derive(Debug, Clone)]
pub struct StanzaSequencer {
    /// Highest client stanza id durably acknowledged so far.
    client_stanza_high: i32,
    /// Lowest (most negative) server stanza id emitted so far.
    server_stanza_low: i32,
}

impl StanzaSequencer {
    /// A fresh conversation: no client stanza seen yet, no server stanza
    /// emitted yet. `next_server()` starts at -1 (§4.2).
    pub fn new() -> Self {
        Self {
            client_stanza_high: 0,
            server_stanza_low: 0,
        }
    }

    /// Restore sequencing state from persisted watermarks (on process
    /// restart or resume).
    pub fn from_watermarks(client_stanza_high: i32, server_stanza_low: i32) -> Self {
        Self {
            client_stanza_high,
            server_stanza_low,
        }
    }

    pub fn client_stanza_high(&self) -> i32 {
        self.client_stanza_high
    }

    pub fn server_stanza_low(&self) -> i32 {
        self.server_stanza_low
    }

    /// Observe an inbound client stanza id without yet committing it; the
    /// caller commits via `ack_client` once the write is durable.
    pub fn observe_client(&self, stanza_id: i32) -> ClientObservation {
        if stanza_id <= self.client_stanza_high {
            ClientObservation::Duplicate
        } else if stanza_id > self.client_stanza_high + 1 {
            ClientObservation::Gap {
                expected: self.client_stanza_high + 1,
            }
        } else {
            ClientObservation::InOrder
        }
    }

    /// Commit a durably-recorded client stanza id. Never decreases (I1).
    pub fn ack_client(&mut self, stanza_id: i32) {
        if stanza_id > self.client_stanza_high {
            self.client_stanza_high = stanza_id;
        }
    }

    /// Atomically allocate the next server stanza id (strictly negative,
    /// strictly decreasing, §6). Never increases (I1).
    pub fn next_server(&mut self) -> i32 {
        self.server_stanza_low -= 1;
        self.server_stanza_low
    }
}

impl Default for StanzaSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_stanza_high_never_decreases() {
        let mut seq = StanzaSequencer::new();
        seq.ack_client(5);
        seq.ack_client(3);
        assert_eq!(seq.client_stanza_high(), 5);
    }

    #[test]
    fn server_stanza_low_strictly_decreases() {
        let mut seq = StanzaSequencer::new();
        assert_eq!(seq.next_server(), -1);
        assert_eq!(seq.next_server(), -2);
        assert_eq!(seq.next_server(), -3);
    }

    #[test]
    fn duplicate_and_gap_detection() {
        let mut seq = StanzaSequencer::new();
        seq.ack_client(1);
        assert_eq!(seq.observe_client(1), ClientObservation::Duplicate);
        assert_eq!(seq.observe_client(0), ClientObservation::Duplicate);
        assert_eq!(seq.observe_client(2), ClientObservation::InOrder);
        assert_eq!(
            seq.observe_client(5),
            ClientObservation::Gap { expected: 2 }
        );
    }

    #[test]
    fn idempotent_ack_is_a_single_state_change() {
        let mut seq = StanzaSequencer::new();
        seq.ack_client(3);
        let before = seq.client_stanza_high();
        seq.ack_client(3);
        assert_eq!(seq.client_stanza_high(), before);
    }
}
