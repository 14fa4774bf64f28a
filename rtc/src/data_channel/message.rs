use bytes::Bytes;
use datachannel::data_channel::DataChannelMessage;

/// RTCDataChannelMessage is one user message received on a data channel.
///
/// `is_string` follows the payload protocol identifier the peer used, so
/// an empty string and an empty binary message stay distinguishable.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCDataChannelMessage {
    pub is_string: bool,
    pub data: Bytes,
}

impl RTCDataChannelMessage {
    /// text returns the payload of a string message
    pub fn text(&self) -> Option<&str> {
        if self.is_string {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }
}

impl From<DataChannelMessage> for RTCDataChannelMessage {
    fn from(msg: DataChannelMessage) -> Self {
        Self {
            is_string: msg.ppi.is_string(),
            data: msg.payload.freeze(),
        }
    }
}
