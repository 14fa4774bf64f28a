use crate::peer_connection::configuration::UNSPECIFIED_STR;
use crate::peer_connection::transport::ice::state::RTCIceTransportState;
use std::fmt;

/// RTCIceConnectionState indicates signaling state of the ICE Connection.
///
/// It is collated from the state of every ICE transport in use. See
/// [RTCIceConnectionState](https://www.w3.org/TR/webrtc/#dom-rtciceconnectionstate).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceConnectionState {
    #[default]
    Unspecified,

    /// Every transport is new, or there are none yet.
    New,

    /// At least one transport is checking and none failed or disconnected.
    Checking,

    /// Every transport is connected, completed or closed and one is connected.
    Connected,

    /// Every transport is completed or closed and one is completed.
    Completed,

    /// At least one transport is disconnected and none failed.
    Disconnected,

    /// At least one transport failed.
    Failed,

    /// The peer connection was closed.
    Closed,
}

const ICE_CONNECTION_STATE_NEW_STR: &str = "new";
const ICE_CONNECTION_STATE_CHECKING_STR: &str = "checking";
const ICE_CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const ICE_CONNECTION_STATE_COMPLETED_STR: &str = "completed";
const ICE_CONNECTION_STATE_DISCONNECTED_STR: &str = "disconnected";
const ICE_CONNECTION_STATE_FAILED_STR: &str = "failed";
const ICE_CONNECTION_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCIceConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_CONNECTION_STATE_NEW_STR => RTCIceConnectionState::New,
            ICE_CONNECTION_STATE_CHECKING_STR => RTCIceConnectionState::Checking,
            ICE_CONNECTION_STATE_CONNECTED_STR => RTCIceConnectionState::Connected,
            ICE_CONNECTION_STATE_COMPLETED_STR => RTCIceConnectionState::Completed,
            ICE_CONNECTION_STATE_DISCONNECTED_STR => RTCIceConnectionState::Disconnected,
            ICE_CONNECTION_STATE_FAILED_STR => RTCIceConnectionState::Failed,
            ICE_CONNECTION_STATE_CLOSED_STR => RTCIceConnectionState::Closed,
            _ => RTCIceConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCIceConnectionState::New => ICE_CONNECTION_STATE_NEW_STR,
            RTCIceConnectionState::Checking => ICE_CONNECTION_STATE_CHECKING_STR,
            RTCIceConnectionState::Connected => ICE_CONNECTION_STATE_CONNECTED_STR,
            RTCIceConnectionState::Completed => ICE_CONNECTION_STATE_COMPLETED_STR,
            RTCIceConnectionState::Disconnected => ICE_CONNECTION_STATE_DISCONNECTED_STR,
            RTCIceConnectionState::Failed => ICE_CONNECTION_STATE_FAILED_STR,
            RTCIceConnectionState::Closed => ICE_CONNECTION_STATE_CLOSED_STR,
            RTCIceConnectionState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCIceConnectionState {
    /// collate folds the states of every ICE transport in use into the
    /// connection-wide state.
    pub(crate) fn collate<I>(states: I, is_closed: bool) -> Self
    where
        I: IntoIterator<Item = RTCIceTransportState>,
    {
        if is_closed {
            return RTCIceConnectionState::Closed;
        }

        let (mut failed, mut disconnected, mut checking, mut new) = (false, false, false, false);
        let (mut connected, mut completed, mut all_closed) = (false, false, true);
        for state in states {
            match state {
                RTCIceTransportState::Failed => failed = true,
                RTCIceTransportState::Disconnected => disconnected = true,
                RTCIceTransportState::Checking => checking = true,
                RTCIceTransportState::New | RTCIceTransportState::Unspecified => new = true,
                RTCIceTransportState::Connected => connected = true,
                RTCIceTransportState::Completed => completed = true,
                RTCIceTransportState::Closed => {}
            }
            if state != RTCIceTransportState::Closed {
                all_closed = false;
            }
        }

        if failed {
            RTCIceConnectionState::Failed
        } else if disconnected {
            RTCIceConnectionState::Disconnected
        } else if checking {
            RTCIceConnectionState::Checking
        } else if new || all_closed {
            RTCIceConnectionState::New
        } else if connected {
            RTCIceConnectionState::Connected
        } else if completed {
            RTCIceConnectionState::Completed
        } else {
            RTCIceConnectionState::New
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_ice_connection_state() {
        let tests = vec![
            (UNSPECIFIED_STR, RTCIceConnectionState::Unspecified),
            ("new", RTCIceConnectionState::New),
            ("checking", RTCIceConnectionState::Checking),
            ("connected", RTCIceConnectionState::Connected),
            ("completed", RTCIceConnectionState::Completed),
            ("disconnected", RTCIceConnectionState::Disconnected),
            ("failed", RTCIceConnectionState::Failed),
            ("closed", RTCIceConnectionState::Closed),
        ];

        for (state_string, expected_state) in tests {
            assert_eq!(RTCIceConnectionState::from(state_string), expected_state);
            assert_eq!(expected_state.to_string(), state_string);
        }
    }

    #[test]
    fn test_ice_connection_state_collate() {
        use RTCIceTransportState::*;

        let tests = vec![
            (vec![], RTCIceConnectionState::New),
            (vec![Closed, Closed], RTCIceConnectionState::New),
            (vec![New, Connected], RTCIceConnectionState::New),
            (vec![New, Checking], RTCIceConnectionState::Checking),
            (vec![Checking, Connected], RTCIceConnectionState::Checking),
            (vec![Connected, Completed], RTCIceConnectionState::Connected),
            (vec![Connected, Closed], RTCIceConnectionState::Connected),
            (vec![Completed, Closed], RTCIceConnectionState::Completed),
            (vec![Disconnected, Checking], RTCIceConnectionState::Disconnected),
            (vec![Disconnected, Failed], RTCIceConnectionState::Failed),
        ];

        for (states, expected) in tests {
            assert_eq!(
                RTCIceConnectionState::collate(states.clone(), false),
                expected,
                "{states:?}"
            );
        }

        assert_eq!(
            RTCIceConnectionState::collate(vec![Connected], true),
            RTCIceConnectionState::Closed
        );
    }
}
