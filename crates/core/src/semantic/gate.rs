use std::time::{Duration, Instant};

/// Sequence number of one utterance. Later utterances get larger tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtteranceToken(u64);

impl UtteranceToken {
    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Dispatch,
    /// A call for this utterance is still running.
    InFlight,
    /// The minimum interval since the last dispatch has not elapsed.
    Debounced,
    /// A newer utterance has started.
    Stale,
}

/// Debounces semantic calls and rejects results from superseded utterances.
///
/// Owned by a single task; not shared.
#[derive(Clone, Debug)]
pub struct SemanticGate {
    min_interval: Duration,
    current: UtteranceToken,
    in_flight: Option<UtteranceToken>,
    last_dispatch: Option<Instant>,
}

impl SemanticGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            current: UtteranceToken(0),
            in_flight: None,
            last_dispatch: None,
        }
    }

    pub fn current(&self) -> UtteranceToken {
        self.current
    }

    /// Starts a new utterance; every earlier token becomes stale.
    pub fn begin_utterance(&mut self) -> UtteranceToken {
        self.current = UtteranceToken(self.current.0 + 1);
        self.current
    }

    /// Moves to `id` when it is newer than the current utterance.
    pub fn observe(&mut self, id: u64) -> UtteranceToken {
        if id > self.current.0 {
            self.current = UtteranceToken(id);
        }
        self.current
    }

    pub fn try_dispatch(&mut self, token: UtteranceToken) -> GateDecision {
        self.try_dispatch_at(token, Instant::now())
    }

    pub fn try_dispatch_at(&mut self, token: UtteranceToken, now: Instant) -> GateDecision {
        if token != self.current {
            return GateDecision::Stale;
        }
        if self.in_flight == Some(token) {
            return GateDecision::InFlight;
        }
        if let Some(last) = self.last_dispatch {
            if now.saturating_duration_since(last) < self.min_interval {
                return GateDecision::Debounced;
            }
        }
        self.in_flight = Some(token);
        self.last_dispatch = Some(now);
        GateDecision::Dispatch
    }

    /// Marks the call for `token` finished. Returns whether its result is
    /// still current and may be published.
    pub fn complete(&mut self, token: UtteranceToken) -> bool {
        if self.in_flight == Some(token) {
            self.in_flight = None;
        }
        token == self.current
    }
}
