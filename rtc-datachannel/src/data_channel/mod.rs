#[cfg(test)]
mod data_channel_test;

use std::collections::VecDeque;
use std::fmt;

use bytes::{Buf, BytesMut};
use log::{debug, warn};

use crate::message::{message_channel_ack::*, message_channel_open::*, message_type::*, *};
use crate::payload::{PayloadProtocolIdentifier, ReliabilityType};
use shared::error::{Error, Result};
use shared::marshal::*;

/// DataChannelConfig is used to configure the data channel.
#[derive(Eq, PartialEq, Default, Clone, Debug)]
pub struct DataChannelConfig {
    pub channel_type: ChannelType,
    pub negotiated: bool,
    pub priority: u16,
    pub reliability_parameter: u32,
    pub label: String,
    pub protocol: String,
    /// largest outbound message accepted by `handle_write`, 0 disables the check
    pub max_message_size: usize,
    pub buffered_amount_low_threshold: usize,
}

/// DataChannelMessage is used to data sent over SCTP
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataChannelMessage {
    pub stream_id: u16,
    pub ppi: PayloadProtocolIdentifier,
    pub unordered: bool,
    pub reliability_type: ReliabilityType,
    pub reliability_parameter: u32,
    pub payload: BytesMut,
}

/// DataChannelState is the ready state of one channel
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataChannelState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for DataChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            DataChannelState::Connecting => "connecting",
            DataChannelState::Open => "open",
            DataChannelState::Closing => "closing",
            DataChannelState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Notifications fed into a channel by the SCTP side of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChannelTransportEvent {
    /// A message returned by `poll_write` was accepted by the SCTP transport.
    Transmitted(PayloadProtocolIdentifier),
    /// The transport failed to accept a message returned by `poll_write`.
    SendFailed(String),
    /// Bytes left the SCTP send buffer.
    SendComplete(usize),
    /// The peer reset the incoming stream.
    StreamReset,
    /// The SCTP association is gone; nothing buffered will be sent.
    AssociationClosed,
}

/// Notifications produced by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChannelEvent {
    Open,
    BufferedAmountLow,
    Error(String),
    /// The engine must reset the outgoing SCTP stream of this channel.
    ResetStream,
    Close,
}

/// DataChannel represents a data channel
#[derive(Debug, Default, Clone)]
pub struct DataChannel {
    config: DataChannelConfig,
    stream_id: u16,
    state: DataChannelState,
    open_pending: bool,
    buffered_amount: usize,
    error: Option<String>,

    read_outs: VecDeque<DataChannelMessage>,
    write_outs: VecDeque<DataChannelMessage>,
    event_outs: VecDeque<DataChannelEvent>,

    // stats
    messages_sent: usize,
    messages_received: usize,
    bytes_sent: usize,
    bytes_received: usize,
}

impl DataChannel {
    fn new(config: DataChannelConfig, stream_id: u16) -> Self {
        Self {
            config,
            stream_id,
            ..Default::default()
        }
    }

    /// Dial opens a data channels over SCTP.
    ///
    /// A negotiated channel is open right away. Otherwise an OPEN message is
    /// queued and the channel becomes open once the transport reports it as
    /// transmitted.
    pub fn dial(config: DataChannelConfig, stream_id: u16) -> Result<Self> {
        let mut data_channel = DataChannel::new(config.clone(), stream_id);

        if !config.negotiated {
            let msg = Message::DataChannelOpen(DataChannelOpen {
                channel_type: config.channel_type,
                priority: config.priority,
                reliability_parameter: config.reliability_parameter,
                label: config.label.bytes().collect(),
                protocol: config.protocol.bytes().collect(),
            })
            .marshal()?;

            data_channel.open_pending = true;
            data_channel.write_outs.push_back(DataChannelMessage {
                stream_id,
                ppi: PayloadProtocolIdentifier::Dcep,
                payload: msg,
                ..Default::default()
            });
        } else {
            data_channel.set_open();
        }

        Ok(data_channel)
    }

    /// Accept is used to accept incoming data channels over SCTP
    pub fn accept(
        mut config: DataChannelConfig,
        stream_id: u16,
        ppi: PayloadProtocolIdentifier,
        buf: &[u8],
    ) -> Result<Self> {
        if ppi != PayloadProtocolIdentifier::Dcep {
            return Err(Error::InvalidPayloadProtocolIdentifier(ppi as u8));
        }

        let mut read_buf = buf;
        let msg = Message::unmarshal(&mut read_buf)?;

        if let Message::DataChannelOpen(dco) = msg {
            config.channel_type = dco.channel_type;
            config.priority = dco.priority;
            config.reliability_parameter = dco.reliability_parameter;
            config.label = String::from_utf8(dco.label)?;
            config.protocol = String::from_utf8(dco.protocol)?;
            config.negotiated = false;
        } else {
            return Err(Error::InvalidMessageType(MESSAGE_TYPE_ACK));
        };

        let mut data_channel = DataChannel::new(config, stream_id);

        data_channel.write_data_channel_ack()?;
        data_channel.set_open();

        Ok(data_channel)
    }

    /// MessagesSent returns the number of messages sent
    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    /// MessagesReceived returns the number of messages received
    pub fn messages_received(&self) -> usize {
        self.messages_received
    }

    /// BytesSent returns the number of bytes sent
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// BytesReceived returns the number of bytes received
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    /// StreamIdentifier returns the Stream identifier associated to the stream.
    pub fn stream_identifier(&self) -> u16 {
        self.stream_id
    }

    pub fn config(&self) -> &DataChannelConfig {
        &self.config
    }

    pub fn state(&self) -> DataChannelState {
        self.state
    }

    /// error returns the last error that forced this channel to close
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// BufferedAmount returns the number of bytes of data currently queued to be
    /// sent over this stream.
    pub fn buffered_amount(&self) -> usize {
        self.buffered_amount
    }

    /// BufferedAmountLowThreshold returns the number of bytes of buffered outgoing
    /// data that is considered "low." Defaults to 0.
    pub fn buffered_amount_low_threshold(&self) -> usize {
        self.config.buffered_amount_low_threshold
    }

    /// SetBufferedAmountLowThreshold is used to update the threshold.
    /// See BufferedAmountLowThreshold().
    pub fn set_buffered_amount_low_threshold(&mut self, threshold: usize) {
        self.config.buffered_amount_low_threshold = threshold;
    }

    fn set_open(&mut self) {
        if self.state == DataChannelState::Connecting {
            debug!("data channel {} open", self.stream_id);
            self.state = DataChannelState::Open;
            self.open_pending = false;
            self.event_outs.push_back(DataChannelEvent::Open);
        }
    }

    fn handle_dcep<B>(&mut self, data: &mut B) -> Result<()>
    where
        B: Buf,
    {
        let msg = Message::unmarshal(data)?;

        match msg {
            Message::DataChannelOpen(_) => {
                // An OPEN can only start a channel. Seeing one on a live stream
                // means both sides picked the same id.
                Err(Error::ErrDataChannelIdInUse(self.stream_id))
            }
            Message::DataChannelAck(_) => {
                debug!("Received DATA_CHANNEL_ACK on {}", self.stream_id);
                self.set_open();
                Ok(())
            }
        }
    }

    fn write_data_channel_ack(&mut self) -> Result<()> {
        let ack = Message::DataChannelAck(DataChannelAck {}).marshal()?;
        self.write_outs.push_back(DataChannelMessage {
            stream_id: self.stream_id,
            ppi: PayloadProtocolIdentifier::Dcep,
            payload: ack,
            ..Default::default()
        });
        Ok(())
    }

    /// fail records the error, surfaces it, and runs the close procedure
    fn fail(&mut self, err: &Error) {
        warn!("data channel {} error: {}", self.stream_id, err);
        self.error = Some(err.to_string());
        self.event_outs
            .push_back(DataChannelEvent::Error(err.to_string()));
        // nothing queued will reach the peer any more
        self.write_outs.clear();
        self.buffered_amount = 0;
        self.start_close();
    }

    fn start_close(&mut self) {
        match self.state {
            DataChannelState::Closing | DataChannelState::Closed => {}
            _ => {
                debug!("data channel {} closing", self.stream_id);
                self.state = DataChannelState::Closing;
                self.maybe_finish_close();
            }
        }
    }

    fn maybe_finish_close(&mut self) {
        if self.state == DataChannelState::Closing && self.buffered_amount == 0 {
            debug!("data channel {} closed", self.stream_id);
            self.event_outs.push_back(DataChannelEvent::ResetStream);
            self.state = DataChannelState::Closed;
            self.event_outs.push_back(DataChannelEvent::Close);
        }
    }

    fn on_send_complete(&mut self, n: usize) {
        let prev = self.buffered_amount;
        self.buffered_amount = prev.saturating_sub(n);

        let threshold = self.config.buffered_amount_low_threshold;
        if prev > threshold && self.buffered_amount <= threshold {
            self.event_outs.push_back(DataChannelEvent::BufferedAmountLow);
        }

        self.maybe_finish_close();
    }

    fn read_message(&mut self, mut msg: DataChannelMessage) -> Result<()> {
        match msg.ppi {
            PayloadProtocolIdentifier::Dcep => {
                let mut data_buf = &msg.payload[..];
                self.handle_dcep(&mut data_buf)
            }
            PayloadProtocolIdentifier::Unknown => Err(Error::InvalidPayloadProtocolIdentifier(
                PayloadProtocolIdentifier::Unknown as u8,
            )),
            _ => {
                // the first user message stands in for a lost ACK
                self.set_open();
                if msg.ppi.is_empty() {
                    msg.payload.clear();
                }
                self.messages_received += 1;
                self.bytes_received += msg.payload.len();
                self.read_outs.push_back(msg);
                Ok(())
            }
        }
    }

    pub fn get_reliability_params(channel_type: ChannelType) -> (bool, ReliabilityType) {
        match channel_type {
            ChannelType::Reliable => (false, ReliabilityType::Reliable),
            ChannelType::ReliableUnordered => (true, ReliabilityType::Reliable),
            ChannelType::PartialReliableRexmit => (false, ReliabilityType::Rexmit),
            ChannelType::PartialReliableRexmitUnordered => (true, ReliabilityType::Rexmit),
            ChannelType::PartialReliableTimed => (false, ReliabilityType::Timed),
            ChannelType::PartialReliableTimedUnordered => (true, ReliabilityType::Timed),
        }
    }

    pub fn get_channel_type_and_reliability_parameter(
        ordered: bool,
        max_retransmits: Option<u16>,
        max_packet_life_time: Option<u16>,
    ) -> (ChannelType, u32) {
        let channel_type;
        let reliability_parameter;

        match (max_retransmits, max_packet_life_time) {
            (None, None) => {
                reliability_parameter = 0u32;
                if ordered {
                    channel_type = ChannelType::Reliable;
                } else {
                    channel_type = ChannelType::ReliableUnordered;
                }
            }

            (Some(max_retransmits), _) => {
                reliability_parameter = max_retransmits as u32;
                if ordered {
                    channel_type = ChannelType::PartialReliableRexmit;
                } else {
                    channel_type = ChannelType::PartialReliableRexmitUnordered;
                }
            }

            (None, Some(max_packet_lifetime)) => {
                reliability_parameter = max_packet_lifetime as u32;
                if ordered {
                    channel_type = ChannelType::PartialReliableTimed;
                } else {
                    channel_type = ChannelType::PartialReliableTimedUnordered;
                }
            }
        }

        (channel_type, reliability_parameter)
    }

    pub fn get_data_channel_message(is_string: bool, data: BytesMut) -> DataChannelMessage {
        // https://tools.ietf.org/html/draft-ietf-rtcweb-data-channel-12#section-6.6
        // SCTP does not support the sending of empty user messages.  Therefore,
        // if an empty message has to be sent, the appropriate PPID (WebRTC
        // String Empty or WebRTC Binary Empty) is used and the SCTP user
        // message of one zero byte is sent.  When receiving an SCTP user
        // message with one of these PPIDs, the receiver MUST ignore the SCTP
        // user message and process it as an empty message.
        let ppi = match (is_string, data.len()) {
            (false, 0) => PayloadProtocolIdentifier::BinaryEmpty,
            (false, _) => PayloadProtocolIdentifier::Binary,
            (true, 0) => PayloadProtocolIdentifier::StringEmpty,
            (true, _) => PayloadProtocolIdentifier::String,
        };

        if data.is_empty() {
            DataChannelMessage {
                ppi,
                payload: BytesMut::from(&[0][..]),
                ..Default::default()
            }
        } else {
            DataChannelMessage {
                ppi,
                payload: data,
                ..Default::default()
            }
        }
    }
}

impl sansio::Protocol<DataChannelMessage, DataChannelMessage, DataChannelTransportEvent>
    for DataChannel
{
    type Rout = DataChannelMessage;
    type Wout = DataChannelMessage;
    type Eout = DataChannelEvent;
    type Error = Error;
    type Time = ();

    /// handle_read consumes one inbound SCTP message. Protocol violations
    /// are stored on the channel, surfaced as an error event, and close it.
    fn handle_read(&mut self, msg: DataChannelMessage) -> Result<()> {
        if self.state == DataChannelState::Closed {
            return Err(Error::ErrDataChannelClosed);
        }

        if let Err(err) = self.read_message(msg) {
            self.fail(&err);
            return Err(err);
        }
        Ok(())
    }

    fn poll_read(&mut self) -> Option<DataChannelMessage> {
        self.read_outs.pop_front()
    }

    /// handle_write queues one user message built by `get_data_channel_message`
    fn handle_write(&mut self, mut msg: DataChannelMessage) -> Result<()> {
        match self.state {
            DataChannelState::Open => {}
            DataChannelState::Connecting => return Err(Error::ErrDataChannelNotOpen),
            _ => return Err(Error::ErrDataChannelClosed),
        }

        let len = if msg.ppi.is_empty() {
            0
        } else {
            msg.payload.len()
        };
        if self.config.max_message_size > 0 && len > self.config.max_message_size {
            return Err(Error::ErrOutboundPacketTooLarge);
        }

        self.messages_sent += 1;
        self.bytes_sent += len;
        self.buffered_amount += len;

        let (unordered, reliability_type) = Self::get_reliability_params(self.config.channel_type);
        msg.stream_id = self.stream_id;
        msg.unordered = unordered;
        msg.reliability_type = reliability_type;
        msg.reliability_parameter = self.config.reliability_parameter;
        self.write_outs.push_back(msg);

        Ok(())
    }

    /// Returns packets to transmit
    fn poll_write(&mut self) -> Option<DataChannelMessage> {
        self.write_outs.pop_front()
    }

    fn handle_event(&mut self, evt: DataChannelTransportEvent) -> Result<()> {
        match evt {
            DataChannelTransportEvent::Transmitted(ppi) => {
                if ppi == PayloadProtocolIdentifier::Dcep && self.open_pending {
                    self.set_open();
                }
            }
            DataChannelTransportEvent::SendFailed(reason) => {
                self.fail(&Error::Other(reason));
            }
            DataChannelTransportEvent::SendComplete(n) => self.on_send_complete(n),
            DataChannelTransportEvent::StreamReset => {
                debug!("data channel {} reset by peer", self.stream_id);
                self.start_close();
            }
            DataChannelTransportEvent::AssociationClosed => {
                debug!("data channel {} lost its association", self.stream_id);
                self.write_outs.clear();
                self.buffered_amount = 0;
                self.start_close();
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<DataChannelEvent> {
        self.event_outs.pop_front()
    }

    fn handle_timeout(&mut self, _now: ()) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<()> {
        None
    }

    /// Close starts the closing procedure: the channel stays in `closing`
    /// until every buffered byte has been sent, then asks for its outgoing
    /// stream to be reset and moves to `closed`.
    fn close(&mut self) -> Result<()> {
        // https://tools.ietf.org/html/draft-ietf-rtcweb-data-channel-13#section-6.7
        // Closing of a data channel MUST be signaled by resetting the
        // corresponding outgoing streams [RFC6525].
        self.start_close();
        Ok(())
    }
}
