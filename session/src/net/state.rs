//! The connection state machine. `transition` is the single place that
//! decides whether a (state, request, response) triple is legal; everywhere
//! else just calls it and propagates the `Err`.

use std::fmt;

/// Where a connection sits in the Bolt lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SessionState {
    Negotiation,
    Authentication,
    Ready,
    Streaming,
    TxReady,
    TxStreaming,
    Failed,
    Interrupted,
    /// Terminal: the connection is being torn down. No further transitions
    /// are legal out of this state.
    Defunct,
}

/// The kind of message a client sent, independent of its field contents.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RequestKind {
    Hello,
    Logon,
    Logoff,
    Run,
    Pull,
    Discard,
    Begin,
    Commit,
    Rollback,
    Route,
    Reset,
    Goodbye,
}

/// The kind of message the server sent back, independent of its field
/// contents. `Record` never drives a transition: it can be emitted any
/// number of times while streaming without changing `SessionState`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResponseKind {
    Success,
    Failure,
    Ignored,
    Record,
}

/// A (state, request, response) triple that the transition table has no
/// entry for. A real peer cannot provoke this without already having
/// violated the protocol in some other way (the caller validates requests
/// against the current state before running them), but a malformed or
/// malicious peer can, so this is a typed `Err`, not a process-ending
/// assertion: a single connection going defunct must not take the host down
/// with it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProtocolViolation {
    pub state: SessionState,
    pub request: RequestKind,
    pub response: ResponseKind,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} is not a legal response to {:?} in state {:?}",
            self.response, self.request, self.state
        )
    }
}

impl std::error::Error for ProtocolViolation {}

/// Computes the next state for a request/response pair, or `Err` if the
/// table has no entry for it.
///
/// `Record` responses are a fixed point: whatever state a `Record` is
/// legal in, it leaves that state unchanged, since a result stream can
/// interleave arbitrarily many of them before its terminating `Success`.
pub fn transition(
    state: SessionState,
    request: RequestKind,
    response: ResponseKind,
) -> Result<SessionState, ProtocolViolation> {
    use RequestKind::*;
    use ResponseKind::*;
    use SessionState::*;

    let violation = || ProtocolViolation { state, request, response };

    let next = match (state, request, response) {
        (Negotiation, Hello, Success) => Authentication,
        (Negotiation, Hello, Failure) => Defunct,

        (Authentication, Logon, Success) => Ready,
        (Authentication, Logon, Failure) => Defunct,

        (Ready, Run, Success) => Streaming,
        (Ready, Run, Failure) => Failed,
        (Ready, Begin, Success) => TxReady,
        (Ready, Begin, Failure) => Failed,
        (Ready, Route, Success) => Ready,
        (Ready, Logoff, Success) => Authentication,
        (Ready, Logoff, Failure) => Failed,
        (Ready, Goodbye, _) => Defunct,
        (Ready, Reset, _) => Ready,

        (Streaming, Pull, Success) => Ready,
        (Streaming, Discard, Success) => Ready,
        (Streaming, Pull, Failure) => Failed,
        (Streaming, Discard, Failure) => Failed,
        (Streaming, Reset, _) => Ready,
        (Streaming, Goodbye, _) => Defunct,

        (TxReady, Run, Success) => TxStreaming,
        (TxReady, Run, Failure) => Failed,
        (TxReady, Commit, Success) => Ready,
        (TxReady, Commit, Failure) => Failed,
        (TxReady, Rollback, Success) => Ready,
        (TxReady, Rollback, Failure) => Failed,
        (TxReady, Reset, _) => Ready,
        (TxReady, Goodbye, _) => Defunct,

        (TxStreaming, Run, Success) => TxStreaming,
        (TxStreaming, Run, Failure) => Failed,
        (TxStreaming, Pull, Success) => TxStreaming,
        (TxStreaming, Pull, Failure) => Failed,
        (TxStreaming, Discard, Success) => TxReady,
        (TxStreaming, Discard, Failure) => Failed,
        (TxStreaming, Commit, Success) => Ready,
        (TxStreaming, Commit, Failure) => Failed,
        (TxStreaming, Reset, _) => Ready,
        (TxStreaming, Goodbye, _) => Defunct,

        (Failed, _, Ignored) => Failed,
        (Failed, Reset, _) => Ready,
        (Failed, Goodbye, _) => Defunct,

        (Interrupted, _, Ignored) => Failed,
        (Interrupted, Reset, Success) => Ready,
        (Interrupted, Reset, Failure) => Defunct,
        (Interrupted, Goodbye, _) => Defunct,

        // RECORD never drives a transition, in any state a request can be
        // pending in: a result stream can interleave arbitrarily many of
        // them before its terminating SUCCESS, so this has to hold
        // regardless of which request kind is open.
        (s, _, Record) => s,

        _ => return Err(violation()),
    };

    Ok(next)
}

/// A `RESET` arriving while a result stream is mid-flight has to jump the
/// queue: the client wants to abandon whatever is running, not wait behind
/// it. `Pending` replaces a pair of ad-hoc booleans (`reset`, plus whether
/// the message being reset was itself ignored) with a sum type that states
/// directly which of the three shapes the fast-path reply takes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Pending {
    /// No reset in flight; reply normally to whatever was just processed.
    Normal,
    /// A `RESET` was requested; reply with a bare `SUCCESS {}`.
    ResetAck,
    /// A `RESET` was requested while the connection was already `Failed` or
    /// `Interrupted`; the in-flight request gets `IGNORED` first, then the
    /// reset gets its own `SUCCESS {}`.
    ResetAckAfterIgnored,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestKind::*;
    use ResponseKind::*;
    use SessionState::*;

    #[test]
    fn negotiation_to_ready_happy_path() {
        let s = transition(Negotiation, Hello, Success).unwrap();
        assert_eq!(s, Authentication);
        let s = transition(s, Logon, Success).unwrap();
        assert_eq!(s, Ready);
    }

    #[test]
    fn record_is_a_fixed_point_while_streaming() {
        let s = transition(Streaming, Pull, Record).unwrap();
        assert_eq!(s, Streaming);
        let s = transition(s, Discard, Record).unwrap();
        assert_eq!(s, Streaming);
    }

    #[test]
    fn run_failure_goes_to_failed_not_defunct() {
        assert_eq!(transition(Ready, Run, Failure).unwrap(), Failed);
    }

    #[test]
    fn logoff_failure_goes_to_failed_not_defunct() {
        assert_eq!(transition(Ready, Logoff, Failure).unwrap(), Failed);
    }

    #[test]
    fn route_failure_is_a_protocol_violation() {
        // ROUTE only ever answers with SUCCESS; a peer that fails it has
        // broken the protocol rather than failed a query.
        assert!(transition(Ready, Route, Failure).is_err());
    }

    #[test]
    fn record_is_a_fixed_point_in_any_state_that_can_see_one() {
        assert_eq!(transition(Ready, Run, Record).unwrap(), Ready);
        assert_eq!(transition(Negotiation, Hello, Record).unwrap(), Negotiation);
        assert_eq!(transition(TxReady, Commit, Record).unwrap(), TxReady);
        assert_eq!(transition(Failed, Goodbye, Record).unwrap(), Failed);
    }

    #[test]
    fn failed_state_ignores_everything_but_reset_and_goodbye() {
        assert_eq!(transition(Failed, Run, Ignored).unwrap(), Failed);
        assert_eq!(transition(Failed, Reset, Success).unwrap(), Ready);
        assert_eq!(transition(Failed, Goodbye, Success).unwrap(), Defunct);
    }

    #[test]
    fn goodbye_is_terminal_from_any_live_state() {
        for &state in &[Ready, Failed, Interrupted] {
            assert_eq!(transition(state, Goodbye, Success).unwrap(), Defunct);
        }
    }

    #[test]
    fn illegal_triple_is_a_protocol_violation_not_a_panic() {
        let err = transition(Ready, Pull, Success).unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation {
                state: Ready,
                request: Pull,
                response: Success,
            }
        );
    }

    #[test]
    fn defunct_accepts_no_further_transitions() {
        assert!(transition(Defunct, Reset, Success).is_err());
        assert!(transition(Defunct, Goodbye, Success).is_err());
    }

    #[test]
    fn tx_streaming_round_trip() {
        let s = transition(TxReady, Run, Success).unwrap();
        assert_eq!(s, TxStreaming);
        let s = transition(s, Pull, Record).unwrap();
        assert_eq!(s, TxStreaming);
        // A PULL can complete without exhausting the transaction's work;
        // the session stays in TxStreaming until explicitly discarded or
        // committed.
        let s = transition(s, Pull, Success).unwrap();
        assert_eq!(s, TxStreaming);
        let s = transition(s, Commit, Success).unwrap();
        assert_eq!(s, Ready);
    }

    #[test]
    fn tx_streaming_discard_returns_to_tx_ready() {
        let s = transition(TxReady, Run, Success).unwrap();
        assert_eq!(s, TxStreaming);
        let s = transition(s, Discard, Success).unwrap();
        assert_eq!(s, TxReady);
    }

    #[test]
    fn reset_succeeds_from_every_live_state_regardless_of_its_own_response() {
        for &state in &[Ready, Streaming, TxReady, TxStreaming, Failed] {
            assert_eq!(transition(state, Reset, Success).unwrap(), Ready);
            assert_eq!(transition(state, Reset, Failure).unwrap(), Ready);
        }
    }

    #[test]
    fn interrupted_reset_failure_is_fatal_unlike_every_other_state() {
        assert_eq!(transition(Interrupted, Reset, Success).unwrap(), Ready);
        assert_eq!(transition(Interrupted, Reset, Failure).unwrap(), Defunct);
    }

    #[test]
    fn interrupted_ignored_responses_settle_into_failed() {
        assert_eq!(transition(Interrupted, Run, Ignored).unwrap(), Failed);
        assert_eq!(transition(Interrupted, Pull, Ignored).unwrap(), Failed);
    }
}
