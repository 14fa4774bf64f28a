use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use datachannel::data_channel::DataChannel;
use shared::error::{Error, Result};

use crate::data_channel::internal::RTCDataChannelInternal;
use crate::data_channel::state::RTCDataChannelState;
use crate::peer_connection::PeerConnectionShared;
use crate::peer_connection::promise::Promise;

pub mod init;
pub(crate) mod internal;
pub mod message;
pub mod state;

/// Identifier for a data channel within a particular peer connection. It is
/// the SCTP stream the channel runs on.
pub type RTCDataChannelId = u16;

/// Handle of a data channel inside its peer connection. Unlike the id, it is
/// known from creation on.
pub type RTCDataChannelHandle = usize;

/// DataChannel represents a WebRTC DataChannel
/// The DataChannel interface represents a network channel
/// which can be used for bidirectional peer-to-peer transfers of arbitrary data
///
/// Getters read the channel under the connection lock. `send` and `close`
/// are queued on the connection like every other mutation and return a
/// [`Promise`].
///
/// ## Specifications
///
/// * [MDN]
/// * [W3C]
///
/// [MDN]: https://developer.mozilla.org/en-US/docs/Web/API/RTCDataChannel
/// [W3C]: https://w3c.github.io/webrtc-pc/#dom-rtcdatachannel
#[derive(Clone)]
pub struct RTCDataChannel {
    pub(crate) handle: RTCDataChannelHandle,
    pub(crate) shared: Arc<PeerConnectionShared>,
}

impl fmt::Debug for RTCDataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTCDataChannel")
            .field("handle", &self.handle)
            .finish()
    }
}

impl RTCDataChannel {
    fn read<T>(&self, f: impl FnOnce(&RTCDataChannelInternal) -> T) -> Result<T> {
        let internal = self.shared.lock();
        internal
            .data_channels
            .get(&self.handle)
            .map(f)
            .ok_or(Error::ErrDataChannelNotExisted)
    }

    pub fn handle(&self) -> RTCDataChannelHandle {
        self.handle
    }

    /// label represents a label that can be used to distinguish this
    /// DataChannel object from other DataChannel objects. Scripts are
    /// allowed to create multiple DataChannel objects with the same label.
    pub fn label(&self) -> Result<String> {
        self.read(|dc| dc.label.clone())
    }

    /// Ordered returns true if the DataChannel is ordered, and false if
    /// out-of-order delivery is allowed.
    pub fn ordered(&self) -> Result<bool> {
        self.read(|dc| dc.ordered)
    }

    /// max_packet_lifetime represents the length of the time window (msec) during
    /// which transmissions and retransmissions may occur in unreliable mode.
    pub fn max_packet_life_time(&self) -> Result<Option<u16>> {
        self.read(|dc| dc.max_packet_life_time)
    }

    /// max_retransmits represents the maximum number of retransmissions that are
    /// attempted in unreliable mode.
    pub fn max_retransmits(&self) -> Result<Option<u16>> {
        self.read(|dc| dc.max_retransmits)
    }

    pub fn protocol(&self) -> Result<String> {
        self.read(|dc| dc.protocol.clone())
    }

    pub fn negotiated(&self) -> Result<bool> {
        self.read(|dc| dc.negotiated)
    }

    /// id is None until the DTLS role is known, unless it was given at
    /// creation. Once set it never changes.
    pub fn id(&self) -> Result<Option<RTCDataChannelId>> {
        self.read(|dc| dc.id)
    }

    pub fn ready_state(&self) -> Result<RTCDataChannelState> {
        self.read(|dc| dc.ready_state())
    }

    /// buffered_amount is the number of bytes queued with `send` that the
    /// SCTP transport has not reported as sent yet.
    pub fn buffered_amount(&self) -> Result<usize> {
        self.read(|dc| dc.buffered_amount())
    }

    pub fn buffered_amount_low_threshold(&self) -> Result<usize> {
        self.read(|dc| dc.buffered_amount_low_threshold)
    }

    /// set_buffered_amount_low_threshold sets the level `buffered_amount`
    /// has to fall to, from above, for `OnBufferedAmountLow` to fire.
    pub fn set_buffered_amount_low_threshold(&self, threshold: usize) -> Promise<()> {
        let handle = self.handle;
        self.shared
            .run("set_buffered_amount_low_threshold", move |pc| {
                pc.set_buffered_amount_low_threshold(handle, threshold)
            })
    }

    /// send sends the binary message to the DataChannel peer
    pub fn send(&self, data: BytesMut) -> Promise<()> {
        let handle = self.handle;
        self.shared.run("data_channel_send", move |pc| {
            pc.send_data_channel(handle, DataChannel::get_data_channel_message(false, data))
        })
    }

    /// send_text sends the text message to the DataChannel peer
    pub fn send_text(&self, s: impl Into<String>) -> Promise<()> {
        let handle = self.handle;
        let data = BytesMut::from(s.into().as_str());
        self.shared.run("data_channel_send", move |pc| {
            pc.send_data_channel(handle, DataChannel::get_data_channel_message(true, data))
        })
    }

    /// close moves the channel to closing; it is closed once everything
    /// buffered was sent. Closing a closed channel does nothing.
    pub fn close(&self) -> Promise<()> {
        let handle = self.handle;
        self.shared
            .run("data_channel_close", move |pc| pc.close_data_channel(handle))
    }
}
