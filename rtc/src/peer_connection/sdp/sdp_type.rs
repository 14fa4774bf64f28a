use std::fmt;

use crate::peer_connection::configuration::UNSPECIFIED_STR;
use serde::{Deserialize, Serialize};

/// RTCSdpType describes the role a session description plays in offer/answer.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Hash, Serialize, Deserialize)]
pub enum RTCSdpType {
    #[default]
    Unspecified = 0,

    /// An offer starts a negotiation round.
    #[serde(rename = "offer")]
    Offer,

    /// A provisional answer; may be followed by further pranswers or a final answer.
    #[serde(rename = "pranswer")]
    Pranswer,

    /// A final answer which completes the round.
    #[serde(rename = "answer")]
    Answer,

    /// Cancels the round and returns the signaling state to stable.
    /// A rollback carries no SDP.
    #[serde(rename = "rollback")]
    Rollback,
}

const SDP_TYPE_OFFER_STR: &str = "offer";
const SDP_TYPE_PRANSWER_STR: &str = "pranswer";
const SDP_TYPE_ANSWER_STR: &str = "answer";
const SDP_TYPE_ROLLBACK_STR: &str = "rollback";

impl From<&str> for RTCSdpType {
    fn from(raw: &str) -> Self {
        match raw {
            SDP_TYPE_OFFER_STR => RTCSdpType::Offer,
            SDP_TYPE_PRANSWER_STR => RTCSdpType::Pranswer,
            SDP_TYPE_ANSWER_STR => RTCSdpType::Answer,
            SDP_TYPE_ROLLBACK_STR => RTCSdpType::Rollback,
            _ => RTCSdpType::Unspecified,
        }
    }
}

impl fmt::Display for RTCSdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCSdpType::Offer => SDP_TYPE_OFFER_STR,
            RTCSdpType::Pranswer => SDP_TYPE_PRANSWER_STR,
            RTCSdpType::Answer => SDP_TYPE_ANSWER_STR,
            RTCSdpType::Rollback => SDP_TYPE_ROLLBACK_STR,
            _ => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RTCSdpType {
    /// answer or pranswer
    pub fn is_answer(&self) -> bool {
        matches!(self, RTCSdpType::Answer | RTCSdpType::Pranswer)
    }
}
