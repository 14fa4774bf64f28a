use super::*;
use sansio::Protocol;
use shared::error::Result;

fn init_log() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn drain_events(dc: &mut DataChannel) -> Vec<DataChannelEvent> {
    let mut events = vec![];
    while let Some(evt) = dc.poll_event() {
        events.push(evt);
    }
    events
}

fn open_channel(config: DataChannelConfig) -> Result<DataChannel> {
    init_log();
    let mut dc = DataChannel::dial(config, 0)?;
    while let Some(msg) = dc.poll_write() {
        dc.handle_event(DataChannelTransportEvent::Transmitted(msg.ppi))?;
    }
    drain_events(&mut dc);
    Ok(dc)
}

fn text(data: &str) -> DataChannelMessage {
    DataChannel::get_data_channel_message(true, BytesMut::from(data.as_bytes()))
}

#[test]
fn test_data_channel_dial_opens_after_transmit() -> Result<()> {
    let config = DataChannelConfig {
        channel_type: ChannelType::Reliable,
        label: "data".to_owned(),
        protocol: "chat".to_owned(),
        ..Default::default()
    };

    let mut dc = DataChannel::dial(config, 2)?;
    assert_eq!(dc.state(), DataChannelState::Connecting);
    assert!(dc.poll_event().is_none());

    let open = dc.poll_write().expect("OPEN message");
    assert_eq!(open.ppi, PayloadProtocolIdentifier::Dcep);
    assert_eq!(open.stream_id, 2);
    assert!(!open.unordered);

    let mut buf = &open.payload[..];
    match Message::unmarshal(&mut buf)? {
        Message::DataChannelOpen(dco) => {
            assert_eq!(dco.label, b"data");
            assert_eq!(dco.protocol, b"chat");
        }
        msg => panic!("unexpected message {msg:?}"),
    }

    dc.handle_event(DataChannelTransportEvent::Transmitted(open.ppi))?;
    assert_eq!(dc.state(), DataChannelState::Open);
    assert_eq!(drain_events(&mut dc), vec![DataChannelEvent::Open]);

    // a late ACK does not re-open
    dc.handle_read(DataChannelMessage {
        stream_id: 2,
        ppi: PayloadProtocolIdentifier::Dcep,
        payload: BytesMut::from(&[0x02][..]),
        ..Default::default()
    })?;
    assert!(dc.poll_event().is_none());

    Ok(())
}

#[test]
fn test_data_channel_dial_negotiated() -> Result<()> {
    let config = DataChannelConfig {
        negotiated: true,
        label: "pre".to_owned(),
        ..Default::default()
    };

    let mut dc = DataChannel::dial(config, 5)?;
    assert_eq!(dc.state(), DataChannelState::Open);
    assert!(dc.poll_write().is_none());
    assert_eq!(drain_events(&mut dc), vec![DataChannelEvent::Open]);

    Ok(())
}

#[test]
fn test_data_channel_accept() -> Result<()> {
    let open = Message::DataChannelOpen(DataChannelOpen {
        channel_type: ChannelType::PartialReliableRexmitUnordered,
        priority: CHANNEL_PRIORITY_NORMAL,
        reliability_parameter: 3,
        label: b"remote".to_vec(),
        protocol: vec![],
    })
    .marshal()?;

    let mut dc = DataChannel::accept(
        DataChannelConfig::default(),
        1,
        PayloadProtocolIdentifier::Dcep,
        &open,
    )?;

    assert_eq!(dc.state(), DataChannelState::Open);
    assert_eq!(dc.config().label, "remote");
    assert_eq!(
        dc.config().channel_type,
        ChannelType::PartialReliableRexmitUnordered
    );
    assert_eq!(dc.config().reliability_parameter, 3);

    let ack = dc.poll_write().expect("ACK message");
    assert_eq!(ack.ppi, PayloadProtocolIdentifier::Dcep);
    assert_eq!(&ack.payload[..], &[0x02]);
    assert_eq!(drain_events(&mut dc), vec![DataChannelEvent::Open]);

    Ok(())
}

#[test]
fn test_data_channel_received_counters_skip_control_messages() -> Result<()> {
    let open = Message::DataChannelOpen(DataChannelOpen {
        channel_type: ChannelType::Reliable,
        priority: CHANNEL_PRIORITY_NORMAL,
        reliability_parameter: 0,
        label: b"remote".to_vec(),
        protocol: vec![],
    })
    .marshal()?;
    let mut dc = DataChannel::accept(
        DataChannelConfig::default(),
        1,
        PayloadProtocolIdentifier::Dcep,
        &open,
    )?;
    assert_eq!(dc.messages_received(), 0);
    assert_eq!(dc.bytes_received(), 0);

    dc.handle_read(DataChannelMessage {
        stream_id: 1,
        ppi: PayloadProtocolIdentifier::String,
        payload: BytesMut::from(&b"hello"[..]),
        ..Default::default()
    })?;
    // a repeated ACK is a control message
    dc.handle_read(DataChannelMessage {
        stream_id: 1,
        ppi: PayloadProtocolIdentifier::Dcep,
        payload: BytesMut::from(&[0x02u8][..]),
        ..Default::default()
    })?;
    assert_eq!(dc.messages_received(), 1);
    assert_eq!(dc.bytes_received(), 5);

    Ok(())
}

#[test]
fn test_data_channel_accept_invalid() {
    let tests = vec![
        (
            "wrong ppi",
            PayloadProtocolIdentifier::Binary,
            vec![0x03u8],
            Error::InvalidPayloadProtocolIdentifier(PayloadProtocolIdentifier::Binary as u8),
        ),
        (
            "ack instead of open",
            PayloadProtocolIdentifier::Dcep,
            vec![0x02],
            Error::InvalidMessageType(MESSAGE_TYPE_ACK),
        ),
        (
            "unknown control byte",
            PayloadProtocolIdentifier::Dcep,
            vec![0x07],
            Error::InvalidMessageType(0x07),
        ),
        (
            "empty",
            PayloadProtocolIdentifier::Dcep,
            vec![],
            Error::UnexpectedEndOfBuffer {
                expected: 1,
                actual: 0,
            },
        ),
    ];

    for (name, ppi, raw, expected) in tests {
        let result = DataChannel::accept(DataChannelConfig::default(), 1, ppi, &raw);
        assert_eq!(result.err(), Some(expected), "{name} failed");
    }
}

#[test]
fn test_data_channel_buffered_amount() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig {
        buffered_amount_low_threshold: 10,
        ..Default::default()
    })?;

    let sizes = vec![4usize, 8, 16, 1];
    for size in &sizes {
        dc.handle_write(DataChannel::get_data_channel_message(
            false,
            BytesMut::from(&vec![0xAAu8; *size][..]),
        ))?;
    }
    assert_eq!(dc.buffered_amount(), sizes.iter().sum::<usize>());
    assert!(dc.poll_event().is_none());

    // 29 -> 20, still above the threshold
    dc.handle_event(DataChannelTransportEvent::SendComplete(9))?;
    assert_eq!(dc.buffered_amount(), 20);
    assert!(dc.poll_event().is_none());

    // 20 -> 10 crosses the threshold
    dc.handle_event(DataChannelTransportEvent::SendComplete(10))?;
    assert_eq!(dc.buffered_amount(), 10);
    assert_eq!(
        drain_events(&mut dc),
        vec![DataChannelEvent::BufferedAmountLow]
    );

    // 10 -> 2 stays below, no second notification
    dc.handle_event(DataChannelTransportEvent::SendComplete(8))?;
    assert!(dc.poll_event().is_none());

    // never negative
    dc.handle_event(DataChannelTransportEvent::SendComplete(100))?;
    assert_eq!(dc.buffered_amount(), 0);

    assert_eq!(dc.messages_sent(), 4);
    assert_eq!(dc.bytes_sent(), 29);

    Ok(())
}

#[test]
fn test_data_channel_write_errors() -> Result<()> {
    let mut connecting = DataChannel::dial(DataChannelConfig::default(), 0)?;
    assert_eq!(
        connecting.handle_write(text("early")),
        Err(Error::ErrDataChannelNotOpen)
    );

    let mut dc = open_channel(DataChannelConfig {
        max_message_size: 4,
        ..Default::default()
    })?;
    assert_eq!(
        dc.handle_write(text("too long")),
        Err(Error::ErrOutboundPacketTooLarge)
    );
    assert_eq!(dc.buffered_amount(), 0);
    dc.handle_write(text("fits"))?;

    dc.close()?;
    assert_eq!(dc.handle_write(text("late")), Err(Error::ErrDataChannelClosed));

    Ok(())
}

#[test]
fn test_data_channel_empty_messages() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig::default())?;

    let msg = DataChannel::get_data_channel_message(true, BytesMut::new());
    assert_eq!(msg.ppi, PayloadProtocolIdentifier::StringEmpty);
    assert_eq!(&msg.payload[..], &[0]);
    dc.handle_write(msg)?;
    assert_eq!(dc.buffered_amount(), 0);

    dc.handle_read(DataChannelMessage {
        ppi: PayloadProtocolIdentifier::BinaryEmpty,
        payload: BytesMut::from(&[0][..]),
        ..Default::default()
    })?;
    let read = dc.poll_read().expect("empty message");
    assert_eq!(read.ppi, PayloadProtocolIdentifier::BinaryEmpty);
    assert!(read.payload.is_empty());

    Ok(())
}

#[test]
fn test_data_channel_close_waits_for_drain() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig::default())?;
    dc.handle_write(text("hello"))?;

    dc.close()?;
    assert_eq!(dc.state(), DataChannelState::Closing);
    assert!(dc.poll_event().is_none());
    // queued data still goes out while closing
    assert!(dc.poll_write().is_some());

    dc.handle_event(DataChannelTransportEvent::SendComplete(5))?;
    assert_eq!(dc.state(), DataChannelState::Closed);
    // draining to the default threshold of zero crosses it first
    assert_eq!(
        drain_events(&mut dc),
        vec![
            DataChannelEvent::BufferedAmountLow,
            DataChannelEvent::ResetStream,
            DataChannelEvent::Close
        ]
    );

    // idempotent
    dc.close()?;
    assert!(dc.poll_event().is_none());
    assert_eq!(dc.state(), DataChannelState::Closed);

    Ok(())
}

#[test]
fn test_data_channel_peer_reset() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig::default())?;

    dc.handle_event(DataChannelTransportEvent::StreamReset)?;
    assert_eq!(dc.state(), DataChannelState::Closed);
    assert_eq!(
        drain_events(&mut dc),
        vec![DataChannelEvent::ResetStream, DataChannelEvent::Close]
    );

    Ok(())
}

#[test]
fn test_data_channel_association_closed() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig::default())?;
    dc.handle_write(text("never sent"))?;
    assert_eq!(dc.buffered_amount(), 10);

    dc.handle_event(DataChannelTransportEvent::AssociationClosed)?;
    assert_eq!(dc.state(), DataChannelState::Closed);
    assert_eq!(dc.buffered_amount(), 0);
    assert!(dc.poll_write().is_none());
    assert!(dc.error().is_none());
    assert_eq!(
        drain_events(&mut dc),
        vec![DataChannelEvent::ResetStream, DataChannelEvent::Close]
    );

    Ok(())
}

#[test]
fn test_data_channel_protocol_error_closes() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig::default())?;
    dc.handle_write(text("pending"))?;

    let result = dc.handle_read(DataChannelMessage {
        ppi: PayloadProtocolIdentifier::Dcep,
        payload: BytesMut::from(&[0x09][..]),
        ..Default::default()
    });
    assert_eq!(result, Err(Error::InvalidMessageType(0x09)));
    assert_eq!(dc.state(), DataChannelState::Closed);
    assert_eq!(dc.buffered_amount(), 0);
    assert!(dc.poll_write().is_none());
    assert!(dc.error().is_some());

    let events = drain_events(&mut dc);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], DataChannelEvent::Error(_)));
    assert_eq!(events[1], DataChannelEvent::ResetStream);
    assert_eq!(events[2], DataChannelEvent::Close);

    assert_eq!(
        dc.handle_read(text("after close")),
        Err(Error::ErrDataChannelClosed)
    );

    Ok(())
}

#[test]
fn test_data_channel_duplicate_open_is_an_error() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig::default())?;
    let open = Message::DataChannelOpen(DataChannelOpen {
        channel_type: ChannelType::Reliable,
        priority: 0,
        reliability_parameter: 0,
        label: vec![],
        protocol: vec![],
    })
    .marshal()?;

    let result = dc.handle_read(DataChannelMessage {
        ppi: PayloadProtocolIdentifier::Dcep,
        payload: open,
        ..Default::default()
    });
    assert_eq!(result, Err(Error::ErrDataChannelIdInUse(0)));
    assert_eq!(dc.state(), DataChannelState::Closed);

    Ok(())
}

#[test]
fn test_data_channel_send_failure_closes() -> Result<()> {
    let mut dc = open_channel(DataChannelConfig::default())?;
    dc.handle_write(text("lost"))?;
    let _ = dc.poll_write();

    dc.handle_event(DataChannelTransportEvent::SendFailed("no association".to_owned()))?;
    assert_eq!(dc.state(), DataChannelState::Closed);
    assert_eq!(dc.error(), Some("no association"));

    Ok(())
}

#[test]
fn test_first_message_opens_channel() -> Result<()> {
    let mut dc = DataChannel::dial(DataChannelConfig::default(), 4)?;
    let _ = dc.poll_write();

    dc.handle_read(text("hi"))?;
    assert_eq!(dc.state(), DataChannelState::Open);
    assert_eq!(drain_events(&mut dc), vec![DataChannelEvent::Open]);
    assert_eq!(dc.poll_read().map(|m| m.payload), Some(BytesMut::from("hi")));

    Ok(())
}

#[test]
fn test_get_channel_type_and_reliability_parameter() {
    let tests = vec![
        (true, None, None, ChannelType::Reliable, 0u32),
        (false, None, None, ChannelType::ReliableUnordered, 0),
        (true, Some(3u16), None, ChannelType::PartialReliableRexmit, 3),
        (false, Some(3), None, ChannelType::PartialReliableRexmitUnordered, 3),
        (true, None, Some(500u16), ChannelType::PartialReliableTimed, 500),
        (false, None, Some(500), ChannelType::PartialReliableTimedUnordered, 500),
    ];

    for (ordered, max_retransmits, max_packet_life_time, channel_type, param) in tests {
        assert_eq!(
            DataChannel::get_channel_type_and_reliability_parameter(
                ordered,
                max_retransmits,
                max_packet_life_time
            ),
            (channel_type, param)
        );
        assert_eq!(
            DataChannel::get_reliability_params(channel_type).0,
            !ordered
        );
    }
}
