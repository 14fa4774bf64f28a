use crate::data_channel::RTCDataChannelId;

/// DataChannelConfig can be used to configure properties of the underlying
/// channel such as data reliability.
///
/// ## Specifications
///
/// * [W3C]
///
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-rtcdatachannelinit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTCDataChannelInit {
    /// ordered indicates if data is allowed to be delivered out of order. The
    /// default value of true, guarantees that data will be delivered in order.
    pub ordered: bool,

    /// max_packet_life_time limits the time (in milliseconds) during which the
    /// channel will transmit or retransmit data if not acknowledged.
    pub max_packet_life_time: Option<u16>,

    /// max_retransmits limits the number of times a channel will retransmit data
    /// if not successfully delivered. At most one of max_retransmits and
    /// max_packet_life_time may be set.
    pub max_retransmits: Option<u16>,

    /// protocol describes the subprotocol name used for this channel.
    pub protocol: String,

    /// negotiated describes if the data channel is created by the local peer or
    /// the remote peer. The default value of false tells the engine to
    /// announce the channel in-band and instruct the other peer to dispatch a
    /// corresponding DataChannel. If set to true, it is up to the application
    /// to negotiate the channel and create a DataChannel with the same id
    /// at the other peer.
    pub negotiated: bool,

    /// id sets the channel ID. Required when negotiated is true, otherwise an
    /// id matching the DTLS role is allocated.
    pub id: Option<RTCDataChannelId>,
}

impl Default for RTCDataChannelInit {
    fn default() -> Self {
        Self {
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
            protocol: String::new(),
            negotiated: false,
            id: None,
        }
    }
}
