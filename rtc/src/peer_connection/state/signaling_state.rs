use std::fmt;

use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use shared::error::{Error, Result};

/// Which side a description is being applied for.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StateChangeOp {
    #[default]
    SetLocal,
    SetRemote,
}

impl fmt::Display for StateChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StateChangeOp::SetLocal => write!(f, "SetLocal"),
            StateChangeOp::SetRemote => write!(f, "SetRemote"),
        }
    }
}

/// RTCSignalingState indicates the signaling state of the offer/answer process.
///
/// See [RTCSignalingState](https://www.w3.org/TR/webrtc/#dom-rtcsignalingstate).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCSignalingState {
    Unspecified = 0,

    /// No offer/answer exchange in progress. This is also the initial state,
    /// in which case the local and remote descriptions are empty.
    #[default]
    Stable,

    /// A local description of type "offer" has been successfully applied.
    HaveLocalOffer,

    /// A remote description of type "offer" has been successfully applied.
    HaveRemoteOffer,

    /// A remote offer has been applied and a local "pranswer" has been applied.
    HaveLocalPranswer,

    /// A local offer has been applied and a remote "pranswer" has been applied.
    HaveRemotePranswer,

    /// The connection is closed.
    Closed,
}

const SIGNALING_STATE_STABLE_STR: &str = "stable";
const SIGNALING_STATE_HAVE_LOCAL_OFFER_STR: &str = "have-local-offer";
const SIGNALING_STATE_HAVE_REMOTE_OFFER_STR: &str = "have-remote-offer";
const SIGNALING_STATE_HAVE_LOCAL_PRANSWER_STR: &str = "have-local-pranswer";
const SIGNALING_STATE_HAVE_REMOTE_PRANSWER_STR: &str = "have-remote-pranswer";
const SIGNALING_STATE_CLOSED_STR: &str = "closed";

impl From<&str> for RTCSignalingState {
    fn from(raw: &str) -> Self {
        match raw {
            SIGNALING_STATE_STABLE_STR => RTCSignalingState::Stable,
            SIGNALING_STATE_HAVE_LOCAL_OFFER_STR => RTCSignalingState::HaveLocalOffer,
            SIGNALING_STATE_HAVE_REMOTE_OFFER_STR => RTCSignalingState::HaveRemoteOffer,
            SIGNALING_STATE_HAVE_LOCAL_PRANSWER_STR => RTCSignalingState::HaveLocalPranswer,
            SIGNALING_STATE_HAVE_REMOTE_PRANSWER_STR => RTCSignalingState::HaveRemotePranswer,
            SIGNALING_STATE_CLOSED_STR => RTCSignalingState::Closed,
            _ => RTCSignalingState::Unspecified,
        }
    }
}

impl fmt::Display for RTCSignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCSignalingState::Stable => SIGNALING_STATE_STABLE_STR,
            RTCSignalingState::HaveLocalOffer => SIGNALING_STATE_HAVE_LOCAL_OFFER_STR,
            RTCSignalingState::HaveRemoteOffer => SIGNALING_STATE_HAVE_REMOTE_OFFER_STR,
            RTCSignalingState::HaveLocalPranswer => SIGNALING_STATE_HAVE_LOCAL_PRANSWER_STR,
            RTCSignalingState::HaveRemotePranswer => SIGNALING_STATE_HAVE_REMOTE_PRANSWER_STR,
            RTCSignalingState::Closed => SIGNALING_STATE_CLOSED_STR,
            RTCSignalingState::Unspecified => {
                crate::peer_connection::configuration::UNSPECIFIED_STR
            }
        };
        write!(f, "{s}")
    }
}

/// Resolves the state reached by applying a description of `sdp_type` for
/// `op` while in `cur`.
///
/// A rollback always lands in stable, including from stable itself. Every
/// triple outside the JSEP transition table is rejected and the caller must
/// leave its state untouched.
pub(crate) fn next_signaling_state(
    cur: RTCSignalingState,
    op: StateChangeOp,
    sdp_type: RTCSdpType,
) -> Result<RTCSignalingState> {
    use RTCSignalingState::*;
    use StateChangeOp::*;

    let next = match (cur, op, sdp_type) {
        (Closed, _, _) | (Unspecified, _, _) => None,
        (_, _, RTCSdpType::Rollback) => Some(Stable),

        // stable->SetLocal(offer)->have-local-offer
        (Stable, SetLocal, RTCSdpType::Offer) => Some(HaveLocalOffer),
        // stable->SetRemote(offer)->have-remote-offer
        (Stable, SetRemote, RTCSdpType::Offer) => Some(HaveRemoteOffer),

        // have-remote-offer->SetLocal(answer)->stable
        (HaveRemoteOffer, SetLocal, RTCSdpType::Answer) => Some(Stable),
        // have-remote-offer->SetLocal(pranswer)->have-local-pranswer
        (HaveRemoteOffer, SetLocal, RTCSdpType::Pranswer) => Some(HaveLocalPranswer),

        // have-local-offer->SetRemote(answer)->stable
        (HaveLocalOffer, SetRemote, RTCSdpType::Answer) => Some(Stable),
        // have-local-offer->SetRemote(pranswer)->have-remote-pranswer
        (HaveLocalOffer, SetRemote, RTCSdpType::Pranswer) => Some(HaveRemotePranswer),

        (HaveLocalPranswer, SetLocal, RTCSdpType::Pranswer) => Some(HaveLocalPranswer),
        (HaveLocalPranswer, SetLocal, RTCSdpType::Answer) => Some(Stable),
        (HaveRemotePranswer, SetRemote, RTCSdpType::Pranswer) => Some(HaveRemotePranswer),
        (HaveRemotePranswer, SetRemote, RTCSdpType::Answer) => Some(Stable),

        _ => None,
    };

    next.ok_or_else(|| {
        Error::ErrSignalingStateProposedTransitionInvalid(format!(
            "from {cur} applying {op} {sdp_type}"
        ))
    })
}
