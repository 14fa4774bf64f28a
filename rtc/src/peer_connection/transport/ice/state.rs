use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer_connection::configuration::UNSPECIFIED_STR;

/// RTCIceTransportState represents the current state of one ICE transport,
/// as reported by the ICE agent.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCIceTransportState {
    #[default]
    Unspecified,

    /// Gathering candidates and/or waiting for remote candidates.
    #[serde(rename = "new")]
    New,

    /// At least one remote candidate is known and pairs are being checked.
    #[serde(rename = "checking")]
    Checking,

    /// A usable pair was found; checks may still be running.
    #[serde(rename = "connected")]
    Connected,

    /// Checks finished and a pair was selected.
    #[serde(rename = "completed")]
    Completed,

    /// Liveness checks failed for this transport.
    #[serde(rename = "disconnected")]
    Disconnected,

    /// Every pair failed.
    #[serde(rename = "failed")]
    Failed,

    /// The transport was shut down.
    #[serde(rename = "closed")]
    Closed,
}

const ICE_TRANSPORT_STATE_NEW_STR: &str = "new";
const ICE_TRANSPORT_STATE_CHECKING_STR: &str = "checking";
const ICE_TRANSPORT_STATE_CONNECTED_STR: &str = "connected";
const ICE_TRANSPORT_STATE_COMPLETED_STR: &str = "completed";
const ICE_TRANSPORT_STATE_DISCONNECTED_STR: &str = "disconnected";
const ICE_TRANSPORT_STATE_FAILED_STR: &str = "failed";
const ICE_TRANSPORT_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCIceTransportState {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_TRANSPORT_STATE_NEW_STR => RTCIceTransportState::New,
            ICE_TRANSPORT_STATE_CHECKING_STR => RTCIceTransportState::Checking,
            ICE_TRANSPORT_STATE_CONNECTED_STR => RTCIceTransportState::Connected,
            ICE_TRANSPORT_STATE_COMPLETED_STR => RTCIceTransportState::Completed,
            ICE_TRANSPORT_STATE_DISCONNECTED_STR => RTCIceTransportState::Disconnected,
            ICE_TRANSPORT_STATE_FAILED_STR => RTCIceTransportState::Failed,
            ICE_TRANSPORT_STATE_CLOSED_STR => RTCIceTransportState::Closed,
            _ => RTCIceTransportState::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCIceTransportState::New => ICE_TRANSPORT_STATE_NEW_STR,
            RTCIceTransportState::Checking => ICE_TRANSPORT_STATE_CHECKING_STR,
            RTCIceTransportState::Connected => ICE_TRANSPORT_STATE_CONNECTED_STR,
            RTCIceTransportState::Completed => ICE_TRANSPORT_STATE_COMPLETED_STR,
            RTCIceTransportState::Disconnected => ICE_TRANSPORT_STATE_DISCONNECTED_STR,
            RTCIceTransportState::Failed => ICE_TRANSPORT_STATE_FAILED_STR,
            RTCIceTransportState::Closed => ICE_TRANSPORT_STATE_CLOSED_STR,
            RTCIceTransportState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCIceTransportState {
    /// is_connected is true once media can flow over the transport
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            RTCIceTransportState::Connected | RTCIceTransportState::Completed
        )
    }
}
