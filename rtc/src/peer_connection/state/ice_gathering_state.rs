use std::fmt;

/// ICEGatheringState describes the state of the candidate gathering process.
///
/// The same values describe one transport and, collated, the whole connection.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceGatheringState {
    #[default]
    Unspecified,

    /// Nothing gathered yet, or no transports.
    New,

    /// At least one transport is gathering.
    Gathering,

    /// Every transport finished gathering.
    Complete,
}

const ICE_GATHERING_STATE_NEW_STR: &str = "new";
const ICE_GATHERING_STATE_GATHERING_STR: &str = "gathering";
const ICE_GATHERING_STATE_COMPLETE_STR: &str = "complete";

impl From<&str> for RTCIceGatheringState {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_GATHERING_STATE_NEW_STR => RTCIceGatheringState::New,
            ICE_GATHERING_STATE_GATHERING_STR => RTCIceGatheringState::Gathering,
            ICE_GATHERING_STATE_COMPLETE_STR => RTCIceGatheringState::Complete,
            _ => RTCIceGatheringState::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceGatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCIceGatheringState::New => write!(f, "{ICE_GATHERING_STATE_NEW_STR}"),
            RTCIceGatheringState::Gathering => write!(f, "{ICE_GATHERING_STATE_GATHERING_STR}"),
            RTCIceGatheringState::Complete => {
                write!(f, "{ICE_GATHERING_STATE_COMPLETE_STR}")
            }
            _ => write!(
                f,
                "{}",
                crate::peer_connection::configuration::UNSPECIFIED_STR
            ),
        }
    }
}

impl RTCIceGatheringState {
    pub(crate) fn collate<I>(states: I) -> Self
    where
        I: IntoIterator<Item = RTCIceGatheringState>,
    {
        let mut any = false;
        let mut gathering = false;
        let mut all_complete = true;
        for state in states {
            any = true;
            match state {
                RTCIceGatheringState::Gathering => {
                    gathering = true;
                    all_complete = false;
                }
                RTCIceGatheringState::Complete => {}
                _ => all_complete = false,
            }
        }

        if gathering {
            RTCIceGatheringState::Gathering
        } else if any && all_complete {
            RTCIceGatheringState::Complete
        } else {
            RTCIceGatheringState::New
        }
    }
}
