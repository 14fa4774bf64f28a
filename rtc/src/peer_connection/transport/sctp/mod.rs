use std::fmt;

use datachannel::data_channel::DataChannelMessage;
use log::debug;
use shared::error::Result;

use crate::peer_connection::configuration::UNSPECIFIED_STR;

/// SctpTransport is the SCTP association data channels run over.
///
/// Like [`IceAgent`](crate::peer_connection::transport::ice::IceAgent), it
/// is driven from the operation thread with the engine state locked.
/// Association changes, inbound messages, stream resets and send
/// completions come back as
/// [`RTCTransportEvent`](crate::peer_connection::event::RTCTransportEvent)s.
pub trait SctpTransport: Send {
    /// start brings the association up over the data channel's DTLS
    /// transport once both descriptions carry an application section.
    fn start(&mut self, local_port: u16, remote_port: u16, max_message_size: usize)
    -> Result<()>;

    /// send queues one message on its stream. An error means the message
    /// was not accepted.
    fn send(&mut self, msg: &DataChannelMessage) -> Result<()>;

    /// reset_stream resets the outgoing side of a stream.
    fn reset_stream(&mut self, stream_id: u16) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// RTCSctpTransportState indicates the state of the SCTP association.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCSctpTransportState {
    #[default]
    Unspecified,

    /// The association is being set up.
    Connecting,

    /// The association is established and channels can open.
    Connected,

    /// The association is gone.
    Closed,
}

impl fmt::Display for RTCSctpTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCSctpTransportState::Connecting => "connecting",
            RTCSctpTransportState::Connected => "connected",
            RTCSctpTransportState::Closed => "closed",
            RTCSctpTransportState::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// SctpAssociation tracks what the engine knows about the association.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct SctpAssociation {
    pub(crate) state: RTCSctpTransportState,
    /// transport stream session the association rides on
    pub(crate) session_id: Option<u32>,
    pub(crate) local_port: u16,
    pub(crate) remote_port: u16,
    pub(crate) max_message_size: usize,
}

impl SctpAssociation {
    pub(crate) fn is_started(&self) -> bool {
        self.state != RTCSctpTransportState::Unspecified
    }

    pub(crate) fn is_established(&self) -> bool {
        self.state == RTCSctpTransportState::Connected
    }

    pub(crate) fn set_state(&mut self, state: RTCSctpTransportState) {
        if self.state != state {
            debug!("sctp association {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

/// effective_max_message_size folds the local limit with the one the peer
/// advertised through `a=max-message-size`, where 0 means no limit.
pub(crate) fn effective_max_message_size(local: usize, remote: Option<usize>) -> usize {
    match remote {
        Some(0) | None => local,
        Some(remote) if local == 0 => remote,
        Some(remote) => local.min(remote),
    }
}
