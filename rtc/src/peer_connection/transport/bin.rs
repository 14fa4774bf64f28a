use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

/// RTCReceiveState decides what the receive side does with decrypted packets.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RTCReceiveState {
    /// Hold packets until the transceiver direction is known.
    #[default]
    Block,
    /// Discard packets, the transceiver does not receive.
    Drop,
    /// Hand packets to the media layer.
    Pass,
}

impl fmt::Display for RTCReceiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCReceiveState::Block => "block",
            RTCReceiveState::Drop => "drop",
            RTCReceiveState::Pass => "pass",
        };
        write!(f, "{s}")
    }
}

/// Readiness inputs shared by both bins of a transport stream.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct TransportReadiness {
    pub(crate) ice_connected: bool,
    pub(crate) rtp_key_set: bool,
    /// key of the RTCP transport, or the RTP one under rtcp-mux
    pub(crate) rtcp_key_set: bool,
}

impl TransportReadiness {
    fn rtp_ready(&self) -> bool {
        self.ice_connected && self.rtp_key_set
    }

    fn rtcp_ready(&self) -> bool {
        self.ice_connected && self.rtcp_key_set
    }
}

/// RTCTransportSendBin holds outgoing RTP and RTCP until ICE is connected
/// and SRTP keys are derived for the matching DTLS transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTCTransportSendBin {
    session_id: u32,
    rtp_blocked: bool,
    rtcp_blocked: bool,
}

impl RTCTransportSendBin {
    pub(crate) fn new(session_id: u32) -> Self {
        Self {
            session_id,
            rtp_blocked: true,
            rtcp_blocked: true,
        }
    }

    pub fn rtp_blocked(&self) -> bool {
        self.rtp_blocked
    }

    pub fn rtcp_blocked(&self) -> bool {
        self.rtcp_blocked
    }

    /// update re-evaluates both pads and reports whether any got unblocked
    pub(crate) fn update(&mut self, readiness: TransportReadiness) -> bool {
        let mut unblocked = false;
        if self.rtp_blocked && readiness.rtp_ready() {
            debug!("send bin {}: unblocking rtp", self.session_id);
            self.rtp_blocked = false;
            unblocked = true;
        }
        if self.rtcp_blocked && readiness.rtcp_ready() {
            debug!("send bin {}: unblocking rtcp", self.session_id);
            self.rtcp_blocked = false;
            unblocked = true;
        }
        unblocked
    }

    pub(crate) fn block(&mut self) {
        self.rtp_blocked = true;
        self.rtcp_blocked = true;
    }
}

/// RTCTransportReceiveBin holds incoming packets until the keys are known,
/// then passes or drops them depending on the negotiated direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTCTransportReceiveBin {
    session_id: u32,
    receive_state: RTCReceiveState,
    key_set: bool,
}

impl RTCTransportReceiveBin {
    pub(crate) fn new(session_id: u32) -> Self {
        Self {
            session_id,
            receive_state: RTCReceiveState::Block,
            key_set: false,
        }
    }

    pub fn receive_state(&self) -> RTCReceiveState {
        self.receive_state
    }

    pub(crate) fn set_receive_state(&mut self, state: RTCReceiveState) {
        if self.receive_state != state {
            debug!(
                "receive bin {}: {} -> {}",
                self.session_id, self.receive_state, state
            );
            self.receive_state = state;
        }
    }

    pub(crate) fn set_key(&mut self) {
        self.key_set = true;
    }

    /// effective_state is what happens to a packet arriving now
    pub fn effective_state(&self) -> RTCReceiveState {
        if self.key_set {
            self.receive_state
        } else {
            RTCReceiveState::Block
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_send_bin_unblocks_when_ready() {
        let tests = vec![
            (TransportReadiness::default(), true, true),
            (
                TransportReadiness {
                    ice_connected: true,
                    ..Default::default()
                },
                true,
                true,
            ),
            (
                TransportReadiness {
                    ice_connected: false,
                    rtp_key_set: true,
                    rtcp_key_set: true,
                },
                true,
                true,
            ),
            (
                TransportReadiness {
                    ice_connected: true,
                    rtp_key_set: true,
                    rtcp_key_set: false,
                },
                false,
                true,
            ),
            (
                TransportReadiness {
                    ice_connected: true,
                    rtp_key_set: true,
                    rtcp_key_set: true,
                },
                false,
                false,
            ),
        ];

        for (readiness, rtp_blocked, rtcp_blocked) in tests {
            let mut bin = RTCTransportSendBin::new(0);
            let unblocked = bin.update(readiness);
            assert_eq!(bin.rtp_blocked(), rtp_blocked, "{readiness:?}");
            assert_eq!(bin.rtcp_blocked(), rtcp_blocked, "{readiness:?}");
            assert_eq!(unblocked, !rtp_blocked || !rtcp_blocked);
        }
    }

    #[test]
    fn test_receive_bin_blocks_until_key() {
        let mut bin = RTCTransportReceiveBin::new(1);
        assert_eq!(bin.effective_state(), RTCReceiveState::Block);

        bin.set_receive_state(RTCReceiveState::Pass);
        assert_eq!(bin.receive_state(), RTCReceiveState::Pass);
        assert_eq!(bin.effective_state(), RTCReceiveState::Block);

        bin.set_key();
        assert_eq!(bin.effective_state(), RTCReceiveState::Pass);

        bin.set_receive_state(RTCReceiveState::Drop);
        assert_eq!(bin.effective_state(), RTCReceiveState::Drop);
    }
}
