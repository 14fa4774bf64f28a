use datachannel::data_channel::{DataChannel, DataChannelConfig};
use datachannel::message::message_channel_open::CHANNEL_PRIORITY_NORMAL;
use datachannel::payload::{PayloadProtocolIdentifier, ReliabilityType};
use log::debug;
use sansio::Protocol;
use shared::error::{Error, Result};

use crate::data_channel::init::RTCDataChannelInit;
use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{RTCDataChannelHandle, RTCDataChannelId};

/// RTCDataChannelInternal is the engine side of one data channel.
///
/// Until the SCTP association is up, a channel only exists as its
/// parameters. It is dialed once an id is known and the association is
/// established; from then on the sans-I/O [`DataChannel`] owns its state.
#[derive(Debug, Clone)]
pub(crate) struct RTCDataChannelInternal {
    pub(crate) handle: RTCDataChannelHandle,
    pub(crate) id: Option<RTCDataChannelId>,
    pub(crate) label: String,
    pub(crate) protocol: String,
    pub(crate) ordered: bool,
    pub(crate) max_packet_life_time: Option<u16>,
    pub(crate) max_retransmits: Option<u16>,
    pub(crate) negotiated: bool,
    pub(crate) buffered_amount_low_threshold: usize,
    /// set when the channel was closed before it was ever dialed
    pub(crate) closed_early: bool,

    pub(crate) data_channel: Option<DataChannel>,
}

impl RTCDataChannelInternal {
    /// create the DataChannel object before the networking is set up.
    pub(crate) fn new(
        handle: RTCDataChannelHandle,
        label: String,
        init: RTCDataChannelInit,
    ) -> Result<Self> {
        if init.max_packet_life_time.is_some() && init.max_retransmits.is_some() {
            return Err(Error::ErrRetransmitsOrPacketLifeTime);
        }
        if init.negotiated && init.id.is_none() {
            return Err(Error::ErrDataChannelNegotiatedWithoutId);
        }

        Ok(Self {
            handle,
            id: init.id,
            label,
            protocol: init.protocol,
            ordered: init.ordered,
            max_packet_life_time: init.max_packet_life_time,
            max_retransmits: init.max_retransmits,
            negotiated: init.negotiated,
            buffered_amount_low_threshold: 0,
            closed_early: false,
            data_channel: None,
        })
    }

    pub(crate) fn ready_state(&self) -> RTCDataChannelState {
        match &self.data_channel {
            Some(data_channel) => data_channel.state().into(),
            None if self.closed_early => RTCDataChannelState::Closed,
            None => RTCDataChannelState::Connecting,
        }
    }

    pub(crate) fn buffered_amount(&self) -> usize {
        self.data_channel
            .as_ref()
            .map(|data_channel| data_channel.buffered_amount())
            .unwrap_or(0)
    }

    /// is_dialable is true for a channel that still waits for the
    /// association to come up
    pub(crate) fn is_dialable(&self) -> bool {
        self.data_channel.is_none() && !self.closed_early && self.id.is_some()
    }

    pub(crate) fn set_buffered_amount_low_threshold(&mut self, threshold: usize) {
        self.buffered_amount_low_threshold = threshold;
        if let Some(data_channel) = &mut self.data_channel {
            data_channel.set_buffered_amount_low_threshold(threshold);
        }
    }

    /// dial opens the channel on its SCTP stream. A non-negotiated channel
    /// queues its OPEN message.
    pub(crate) fn dial(&mut self, max_message_size: usize) -> Result<()> {
        let stream_id = self.id.ok_or(Error::ErrDataChannelNotExisted)?;
        let (channel_type, reliability_parameter) =
            DataChannel::get_channel_type_and_reliability_parameter(
                self.ordered,
                self.max_retransmits,
                self.max_packet_life_time,
            );

        let config = DataChannelConfig {
            channel_type,
            negotiated: self.negotiated,
            priority: CHANNEL_PRIORITY_NORMAL,
            reliability_parameter,
            label: self.label.clone(),
            protocol: self.protocol.clone(),
            max_message_size,
            buffered_amount_low_threshold: self.buffered_amount_low_threshold,
        };

        debug!("dialing data channel {} on stream {}", self.label, stream_id);
        self.data_channel = Some(DataChannel::dial(config, stream_id)?);
        Ok(())
    }

    /// accept creates the channel the peer opened with `buf`, an OPEN
    /// message received on `stream_id`.
    pub(crate) fn accept(
        handle: RTCDataChannelHandle,
        stream_id: RTCDataChannelId,
        ppi: PayloadProtocolIdentifier,
        buf: &[u8],
        max_message_size: usize,
    ) -> Result<Self> {
        let data_channel = DataChannel::accept(
            DataChannelConfig {
                max_message_size,
                ..Default::default()
            },
            stream_id,
            ppi,
            buf,
        )?;

        let config = data_channel.config();
        let (unordered, reliability_type) =
            DataChannel::get_reliability_params(config.channel_type);
        let reliability_parameter = u16::try_from(config.reliability_parameter).unwrap_or(u16::MAX);
        let (max_retransmits, max_packet_life_time) = match reliability_type {
            ReliabilityType::Reliable => (None, None),
            ReliabilityType::Rexmit => (Some(reliability_parameter), None),
            ReliabilityType::Timed => (None, Some(reliability_parameter)),
        };

        debug!(
            "accepted data channel {} on stream {}",
            config.label, stream_id
        );
        Ok(Self {
            handle,
            id: Some(stream_id),
            label: config.label.clone(),
            protocol: config.protocol.clone(),
            ordered: !unordered,
            max_packet_life_time,
            max_retransmits,
            negotiated: false,
            buffered_amount_low_threshold: 0,
            closed_early: false,
            data_channel: Some(data_channel),
        })
    }

    /// close starts the closing procedure. It returns true when the channel
    /// was never dialed and is closed right away.
    pub(crate) fn close(&mut self) -> Result<bool> {
        match &mut self.data_channel {
            Some(data_channel) => {
                data_channel.close()?;
                Ok(false)
            }
            None if self.closed_early => Ok(false),
            None => {
                debug!("data channel {} closed before opening", self.label);
                self.closed_early = true;
                Ok(true)
            }
        }
    }
}

/// allocate_data_channel_id picks the lowest free id of the parity owned by
/// the local DTLS role: even for the client, odd for the server.
pub(crate) fn allocate_data_channel_id<F>(
    is_client: bool,
    max_data_channels: u16,
    in_use: F,
) -> Result<RTCDataChannelId>
where
    F: Fn(RTCDataChannelId) -> bool,
{
    let mut id: u32 = if is_client { 0 } else { 1 };
    while id < max_data_channels as u32 {
        let candidate = id as RTCDataChannelId;
        if !in_use(candidate) {
            return Ok(candidate);
        }
        id += 2;
    }
    Err(Error::ErrMaxDataChannelID)
}
