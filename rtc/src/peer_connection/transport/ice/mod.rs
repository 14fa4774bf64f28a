//! ICE collaborator interface.
//!
//! The engine never runs connectivity checks itself. It drives an
//! [`IceAgent`] through stream and candidate primitives and learns about
//! candidates and transport states through
//! [`RTCTransportEvent`](crate::peer_connection::event::RTCTransportEvent)s
//! posted back onto its operation queue.

pub mod candidate;
pub mod state;

use std::fmt;

use shared::error::Result;

/// Handle of one ICE stream inside the agent
pub type IceStreamId = u32;

/// RTCIceComponent is the component of an ICE stream a transport serves.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RTCIceComponent {
    #[default]
    Rtp = 1,
    Rtcp = 2,
}

impl fmt::Display for RTCIceComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCIceComponent::Rtp => "rtp",
            RTCIceComponent::Rtcp => "rtcp",
        };
        write!(f, "{s}")
    }
}

/// IceAgent is the ICE implementation a peer connection drives.
///
/// Every method is called from the operation thread while the engine state
/// is locked, so implementations must not call back into the peer
/// connection synchronously. Notifications go through
/// [`RTCTransportEventSender`](crate::peer_connection::RTCTransportEventSender).
pub trait IceAgent: Send {
    /// add_stream creates the ICE stream carrying the transport stream
    /// `session_id`.
    fn add_stream(&mut self, session_id: u32) -> Result<IceStreamId>;

    /// find_transport makes sure the transport of `component` exists so the
    /// agent starts reporting its states.
    fn find_transport(&mut self, stream: IceStreamId, component: RTCIceComponent) -> Result<()>;

    fn gather_candidates(&mut self, stream: IceStreamId) -> Result<()>;

    fn set_local_credentials(&mut self, stream: IceStreamId, ufrag: &str, pwd: &str)
    -> Result<()>;

    fn set_remote_credentials(
        &mut self,
        stream: IceStreamId,
        ufrag: &str,
        pwd: &str,
    ) -> Result<()>;

    /// add_candidate hands over one remote candidate in `candidate:` form.
    fn add_candidate(&mut self, stream: IceStreamId, candidate: &str) -> Result<()>;

    fn set_is_controller(&mut self, controller: bool);

    fn set_stun_server(&mut self, uri: &str) -> Result<()>;

    fn set_turn_server(&mut self, uri: &str) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// IceStreamItem binds a transport stream to its ICE stream. It is created
/// once and never reassigned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct IceStreamItem {
    pub(crate) session_id: u32,
    pub(crate) stream_id: IceStreamId,
}

/// ICE credentials of one side of a transport stream
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct IceCredentials {
    pub(crate) ufrag: String,
    pub(crate) pwd: String,
}

impl IceCredentials {
    /// generate draws a fresh ufrag/pwd pair, 4 and 22 ice-chars long
    pub(crate) fn generate() -> Self {
        IceCredentials {
            ufrag: shared::util::rand_ice_chars(ICE_UFRAG_LEN),
            pwd: shared::util::rand_ice_chars(ICE_PWD_LEN),
        }
    }
}

const ICE_UFRAG_LEN: usize = 4;
const ICE_PWD_LEN: usize = 22;
