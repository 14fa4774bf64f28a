use crate::data_channel::RTCDataChannelHandle;
use crate::data_channel::message::RTCDataChannelMessage;

/// RTCDataChannelEvent reports a change on one data channel, identified by
/// the handle `RTCPeerConnection::data_channel` resolves.
///
/// A channel opened by the peer is announced with its first `OnOpen`.
#[allow(clippy::enum_variant_names)]
#[derive(Debug, Clone, PartialEq)]
pub enum RTCDataChannelEvent {
    OnOpen(RTCDataChannelHandle),
    OnBufferedAmountLow(RTCDataChannelHandle),
    OnError(RTCDataChannelHandle, String),
    OnClose(RTCDataChannelHandle),
    OnMessage(RTCDataChannelHandle, RTCDataChannelMessage),
}

impl Default for RTCDataChannelEvent {
    fn default() -> Self {
        Self::OnOpen(Default::default())
    }
}

impl RTCDataChannelEvent {
    pub fn handle(&self) -> RTCDataChannelHandle {
        match self {
            RTCDataChannelEvent::OnOpen(h)
            | RTCDataChannelEvent::OnBufferedAmountLow(h)
            | RTCDataChannelEvent::OnError(h, _)
            | RTCDataChannelEvent::OnClose(h)
            | RTCDataChannelEvent::OnMessage(h, _) => *h,
        }
    }
}
