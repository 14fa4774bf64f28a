use crate::peer_connection::configuration::UNSPECIFIED_STR;
use crate::peer_connection::transport::dtls::state::RTCDtlsTransportState;
use crate::peer_connection::transport::ice::state::RTCIceTransportState;
use std::fmt;

/// Indicates the overall state of the peer connection.
///
/// `RTCPeerConnectionState` is an aggregate state that combines the states of
/// both the ICE transport layer and the DTLS transport layer. The peer
/// connection is only "connected" when both ICE and DTLS are established.
///
/// ```text
/// New → Connecting → Connected
/// Connected → Disconnected → (may recover to Connected)
/// Connected → Failed
/// Any state → Closed
/// ```
///
/// ```
/// use rtc::peer_connection::state::RTCPeerConnectionState;
///
/// let parsed: RTCPeerConnectionState = "connecting".into();
/// assert_eq!(parsed, RTCPeerConnectionState::Connecting);
/// assert_eq!(RTCPeerConnectionState::Connected.to_string(), "connected");
/// ```
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCPeerConnectionState {
    #[default]
    Unspecified,

    /// Any transport is new and none is connecting, failed or disconnected,
    /// or every transport is closed, or there are no transports.
    New,

    /// An ICE transport is checking or a DTLS transport is connecting.
    Connecting,

    /// Every transport is connected, completed or closed.
    Connected,

    /// An ICE transport is disconnected and none failed or is connecting.
    Disconnected,

    /// An ICE or DTLS transport failed.
    Failed,

    /// The peer connection was closed.
    Closed,
}

const PEER_CONNECTION_STATE_NEW_STR: &str = "new";
const PEER_CONNECTION_STATE_CONNECTING_STR: &str = "connecting";
const PEER_CONNECTION_STATE_CONNECTED_STR: &str = "connected";
const PEER_CONNECTION_STATE_DISCONNECTED_STR: &str = "disconnected";
const PEER_CONNECTION_STATE_FAILED_STR: &str = "failed";
const PEER_CONNECTION_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCPeerConnectionState {
    fn from(raw: &str) -> Self {
        match raw {
            PEER_CONNECTION_STATE_NEW_STR => RTCPeerConnectionState::New,
            PEER_CONNECTION_STATE_CONNECTING_STR => RTCPeerConnectionState::Connecting,
            PEER_CONNECTION_STATE_CONNECTED_STR => RTCPeerConnectionState::Connected,
            PEER_CONNECTION_STATE_DISCONNECTED_STR => RTCPeerConnectionState::Disconnected,
            PEER_CONNECTION_STATE_FAILED_STR => RTCPeerConnectionState::Failed,
            PEER_CONNECTION_STATE_CLOSED_STR => RTCPeerConnectionState::Closed,
            _ => RTCPeerConnectionState::Unspecified,
        }
    }
}

impl fmt::Display for RTCPeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCPeerConnectionState::New => PEER_CONNECTION_STATE_NEW_STR,
            RTCPeerConnectionState::Connecting => PEER_CONNECTION_STATE_CONNECTING_STR,
            RTCPeerConnectionState::Connected => PEER_CONNECTION_STATE_CONNECTED_STR,
            RTCPeerConnectionState::Disconnected => PEER_CONNECTION_STATE_DISCONNECTED_STR,
            RTCPeerConnectionState::Failed => PEER_CONNECTION_STATE_FAILED_STR,
            RTCPeerConnectionState::Closed => PEER_CONNECTION_STATE_CLOSED_STR,
            RTCPeerConnectionState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCPeerConnectionState {
    /// collate folds every ICE and DTLS transport state into the
    /// connection-wide state.
    pub(crate) fn collate(
        ice_states: &[RTCIceTransportState],
        dtls_states: &[RTCDtlsTransportState],
        is_closed: bool,
    ) -> Self {
        if is_closed {
            return RTCPeerConnectionState::Closed;
        }

        let ice_any = |s: RTCIceTransportState| ice_states.contains(&s);
        let dtls_any = |s: RTCDtlsTransportState| dtls_states.contains(&s);

        if ice_any(RTCIceTransportState::Failed) || dtls_any(RTCDtlsTransportState::Failed) {
            return RTCPeerConnectionState::Failed;
        }
        if ice_any(RTCIceTransportState::Checking) || dtls_any(RTCDtlsTransportState::Connecting)
        {
            return RTCPeerConnectionState::Connecting;
        }
        if ice_any(RTCIceTransportState::Disconnected) {
            return RTCPeerConnectionState::Disconnected;
        }

        let ice_done = ice_states.iter().all(|s| {
            matches!(
                s,
                RTCIceTransportState::Connected
                    | RTCIceTransportState::Completed
                    | RTCIceTransportState::Closed
            )
        });
        let dtls_done = dtls_states.iter().all(|s| {
            matches!(
                s,
                RTCDtlsTransportState::Connected | RTCDtlsTransportState::Closed
            )
        });
        let any_up = ice_any(RTCIceTransportState::Connected)
            || ice_any(RTCIceTransportState::Completed)
            || dtls_any(RTCDtlsTransportState::Connected);
        if ice_done && dtls_done && any_up {
            return RTCPeerConnectionState::Connected;
        }

        RTCPeerConnectionState::New
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_peer_connection_state() {
        let tests = vec![
            (UNSPECIFIED_STR, RTCPeerConnectionState::Unspecified),
            ("new", RTCPeerConnectionState::New),
            ("connecting", RTCPeerConnectionState::Connecting),
            ("connected", RTCPeerConnectionState::Connected),
            ("disconnected", RTCPeerConnectionState::Disconnected),
            ("failed", RTCPeerConnectionState::Failed),
            ("closed", RTCPeerConnectionState::Closed),
        ];

        for (state_string, expected_state) in tests {
            assert_eq!(
                RTCPeerConnectionState::from(state_string),
                expected_state,
                "testCase: {expected_state}",
            );
        }
    }

    #[test]
    fn test_peer_connection_state_string() {
        let tests = vec![
            (RTCPeerConnectionState::Unspecified, UNSPECIFIED_STR),
            (RTCPeerConnectionState::New, "new"),
            (RTCPeerConnectionState::Connecting, "connecting"),
            (RTCPeerConnectionState::Connected, "connected"),
            (RTCPeerConnectionState::Disconnected, "disconnected"),
            (RTCPeerConnectionState::Failed, "failed"),
            (RTCPeerConnectionState::Closed, "closed"),
        ];

        for (state, expected_string) in tests {
            assert_eq!(state.to_string(), expected_string)
        }
    }

    #[test]
    fn test_peer_connection_state_collate() {
        use RTCDtlsTransportState as D;
        use RTCIceTransportState as I;

        let tests = vec![
            (vec![], vec![], RTCPeerConnectionState::New),
            (vec![I::New], vec![D::New], RTCPeerConnectionState::New),
            (vec![I::Checking], vec![D::New], RTCPeerConnectionState::Connecting),
            (vec![I::Connected], vec![D::Connecting], RTCPeerConnectionState::Connecting),
            (vec![I::Connected], vec![D::New], RTCPeerConnectionState::New),
            (vec![I::Connected, I::Completed], vec![D::Connected], RTCPeerConnectionState::Connected),
            (vec![I::Disconnected], vec![D::Connected], RTCPeerConnectionState::Disconnected),
            (vec![I::Connected], vec![D::Failed], RTCPeerConnectionState::Failed),
            (vec![I::Closed], vec![D::Closed], RTCPeerConnectionState::New),
        ];

        for (ice, dtls, expected) in tests {
            assert_eq!(
                RTCPeerConnectionState::collate(&ice, &dtls, false),
                expected,
                "{ice:?} {dtls:?}"
            );
        }

        assert_eq!(
            RTCPeerConnectionState::collate(&[I::Connected], &[D::Connected], true),
            RTCPeerConnectionState::Closed
        );
    }
}
