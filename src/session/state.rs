//! Session state machine: the states a bound SMPP connection passes
//! through and the capability predicates the runtime consults before
//! issuing an outbound PDU.

pub use crate::client::types::BindType;

/// States a session can occupy over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connected, not yet bound.
    Open,
    /// Bound as a transmitter: may send `submit_*`/`data_sm`/etc, may not
    /// receive `deliver_sm`.
    BoundTx,
    /// Bound as a receiver: may receive `deliver_sm`, may not transmit.
    BoundRx,
    /// Bound as a transceiver: both capabilities.
    BoundTrx,
    /// Unbound after a clean `unbind` handshake; the transport may still be
    /// open briefly before it closes.
    Unbound,
    /// Terminal: the transport is gone.
    Closed,
}

/// Events the runtime feeds into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connect,
    Bind(BindType),
    Unbind,
    Close,
}

impl SessionState {
    /// Apply `event`, returning the resulting state.
    ///
    /// Transitions not named in the specification (e.g. a second bind
    /// while already bound, or `unbind` while still `Open`) are a no-op:
    /// the state is returned unchanged and a warning is logged. Real SMPP
    /// peers occasionally misbehave this way and the session must not
    /// crash over it.
    pub fn apply(self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (_, Close) => Closed,
            (Open, Bind(BindType::Transmitter)) => BoundTx,
            (Open, Bind(BindType::Receiver)) => BoundRx,
            (Open, Bind(BindType::Transceiver)) => BoundTrx,
            (BoundTx | BoundRx | BoundTrx, Unbind) => Unbound,
            (state, event) => {
                tracing::warn!(
                    ?state,
                    ?event,
                    "ignoring illegal session state transition"
                );
                state
            }
        }
    }

    /// `true` if this state may originate `submit_sm`, `data_sm`,
    /// `query_sm`, `cancel_sm`, `replace_sm`, `submit_multi`.
    pub fn can_transmit(self) -> bool {
        matches!(self, SessionState::BoundTx | SessionState::BoundTrx)
    }

    /// `true` if this state may receive `deliver_sm`/`alert_notification`.
    pub fn can_receive(self) -> bool {
        matches!(self, SessionState::BoundRx | SessionState::BoundTrx)
    }

    pub fn is_bound(self) -> bool {
        self.can_transmit() || self.can_receive()
    }

    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_transitions_open_to_the_matching_bound_state() {
        assert_eq!(
            SessionState::Open.apply(SessionEvent::Bind(BindType::Transmitter)),
            SessionState::BoundTx
        );
        assert_eq!(
            SessionState::Open.apply(SessionEvent::Bind(BindType::Receiver)),
            SessionState::BoundRx
        );
        assert_eq!(
            SessionState::Open.apply(SessionEvent::Bind(BindType::Transceiver)),
            SessionState::BoundTrx
        );
    }

    #[test]
    fn unbind_from_any_bound_state_goes_to_unbound() {
        for bound in [
            SessionState::BoundTx,
            SessionState::BoundRx,
            SessionState::BoundTrx,
        ] {
            assert_eq!(bound.apply(SessionEvent::Unbind), SessionState::Unbound);
        }
    }

    #[test]
    fn close_always_wins_regardless_of_current_state() {
        for state in [
            SessionState::Open,
            SessionState::BoundTx,
            SessionState::BoundRx,
            SessionState::BoundTrx,
            SessionState::Unbound,
        ] {
            assert_eq!(state.apply(SessionEvent::Close), SessionState::Closed);
        }
    }

    #[test]
    fn illegal_transitions_are_a_no_op() {
        assert_eq!(
            SessionState::Open.apply(SessionEvent::Unbind),
            SessionState::Open
        );
        assert_eq!(
            SessionState::BoundTx
                .apply(SessionEvent::Bind(BindType::Receiver)),
            SessionState::BoundTx
        );
        assert_eq!(
            SessionState::Closed.apply(SessionEvent::Bind(BindType::Transmitter)),
            SessionState::Closed
        );
    }

    #[test]
    fn capability_predicates_match_the_specification_table() {
        assert!(SessionState::BoundTx.can_transmit());
        assert!(!SessionState::BoundTx.can_receive());

        assert!(SessionState::BoundRx.can_receive());
        assert!(!SessionState::BoundRx.can_transmit());

        assert!(SessionState::BoundTrx.can_transmit());
        assert!(SessionState::BoundTrx.can_receive());

        assert!(!SessionState::Open.can_transmit());
        assert!(!SessionState::Open.can_receive());
        assert!(!SessionState::Unbound.can_transmit());
        assert!(!SessionState::Closed.can_receive());
    }
}
