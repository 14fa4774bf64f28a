#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use datachannel::data_channel::DataChannelMessage;
use datachannel::payload::PayloadProtocolIdentifier;
use shared::error::{Error, Result as RtcResult};

use rtc::peer_connection::configuration::RTCConfigurationBuilder;
use rtc::peer_connection::event::{RTCPeerConnectionEvent, RTCTransportEvent};
use rtc::peer_connection::sdp::session_description::RTCSessionDescription;
use rtc::peer_connection::state::RTCIceGatheringState;
use rtc::peer_connection::transport::{IceAgent, IceStreamId, RTCIceComponent, SctpTransport};
use rtc::peer_connection::{RTCPeerConnection, RTCPeerConnectionBuilder, RTCTransportEventSender};

pub const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
pub const HOST_CANDIDATE: &str = "candidate:1 1 udp 2130706431 192.0.2.1 50000 typ host";

pub fn init_log() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// MockIceAgent records every call and gathers one host candidate per stream
pub struct MockIceAgent {
    events: RTCTransportEventSender,
    calls: Arc<Mutex<Vec<String>>>,
    refuse_streams: Arc<AtomicBool>,
}

impl MockIceAgent {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl IceAgent for MockIceAgent {
    fn add_stream(&mut self, session_id: u32) -> RtcResult<IceStreamId> {
        self.record(format!("add_stream {session_id}"));
        if self.refuse_streams.load(Ordering::SeqCst) {
            return Err(Error::Other(format!("no stream for session {session_id}")));
        }
        Ok(session_id)
    }

    fn find_transport(&mut self, stream: IceStreamId, component: RTCIceComponent) -> RtcResult<()> {
        self.record(format!("find_transport {stream} {component}"));
        Ok(())
    }

    fn gather_candidates(&mut self, stream: IceStreamId) -> RtcResult<()> {
        self.record(format!("gather {stream}"));
        self.events.send(RTCTransportEvent::OnGatheringStateChange {
            session_id: stream,
            component: RTCIceComponent::Rtp,
            state: RTCIceGatheringState::Gathering,
        });
        self.events.send(RTCTransportEvent::OnCandidate {
            session_id: stream,
            candidate: HOST_CANDIDATE.to_owned(),
        });
        self.events.send(RTCTransportEvent::OnGatheringStateChange {
            session_id: stream,
            component: RTCIceComponent::Rtp,
            state: RTCIceGatheringState::Complete,
        });
        Ok(())
    }

    fn set_local_credentials(&mut self, stream: IceStreamId, _: &str, _: &str) -> RtcResult<()> {
        self.record(format!("local_credentials {stream}"));
        Ok(())
    }

    fn set_remote_credentials(&mut self, stream: IceStreamId, _: &str, _: &str) -> RtcResult<()> {
        self.record(format!("remote_credentials {stream}"));
        Ok(())
    }

    fn add_candidate(&mut self, stream: IceStreamId, candidate: &str) -> RtcResult<()> {
        self.record(format!("candidate {stream} {candidate}"));
        Ok(())
    }

    fn set_is_controller(&mut self, controller: bool) {
        self.record(format!("controller {controller}"));
    }

    fn set_stun_server(&mut self, uri: &str) -> RtcResult<()> {
        self.record(format!("stun {uri}"));
        Ok(())
    }

    fn set_turn_server(&mut self, uri: &str) -> RtcResult<()> {
        self.record(format!("turn {uri}"));
        Ok(())
    }

    fn close(&mut self) -> RtcResult<()> {
        self.record("close".to_owned());
        Ok(())
    }
}

/// LoopbackSctp hands every message straight to the other peer. Send
/// completions for user messages are reported at once unless
/// `auto_complete` is cleared.
pub struct LoopbackSctp {
    local: RTCTransportEventSender,
    remote: RTCTransportEventSender,
    auto_complete: Arc<AtomicBool>,
}

impl SctpTransport for LoopbackSctp {
    fn start(&mut self, _: u16, _: u16, _: usize) -> RtcResult<()> {
        self.local.send(RTCTransportEvent::OnAssociationEstablished);
        Ok(())
    }

    fn send(&mut self, msg: &DataChannelMessage) -> RtcResult<()> {
        self.remote.send(RTCTransportEvent::OnMessage {
            stream_id: msg.stream_id,
            ppi: msg.ppi,
            payload: msg.payload.clone(),
        });
        if msg.ppi != PayloadProtocolIdentifier::Dcep && self.auto_complete.load(Ordering::SeqCst)
        {
            let bytes = if msg.ppi.is_empty() {
                0
            } else {
                msg.payload.len()
            };
            self.local.send(RTCTransportEvent::OnSendComplete {
                stream_id: msg.stream_id,
                bytes,
            });
        }
        Ok(())
    }

    fn reset_stream(&mut self, stream_id: u16) -> RtcResult<()> {
        self.remote
            .send(RTCTransportEvent::OnStreamReset { stream_id });
        Ok(())
    }

    fn close(&mut self) -> RtcResult<()> {
        self.remote.send(RTCTransportEvent::OnAssociationClosed);
        Ok(())
    }
}

pub struct Peer {
    pub pc: RTCPeerConnection,
    pub ice_calls: Arc<Mutex<Vec<String>>>,
    pub auto_complete: Arc<AtomicBool>,
    pub refuse_streams: Arc<AtomicBool>,
    seen: Vec<RTCPeerConnectionEvent>,
}

impl Peer {
    fn build(
        name: &str,
        builder: RTCPeerConnectionBuilder,
        sctp: Option<LoopbackSctp>,
        auto_complete: Arc<AtomicBool>,
    ) -> Result<Self> {
        let ice_calls = Arc::new(Mutex::new(vec![]));
        let refuse_streams = Arc::new(AtomicBool::new(false));
        let ice_agent = MockIceAgent {
            events: builder.event_sender(),
            calls: Arc::clone(&ice_calls),
            refuse_streams: Arc::clone(&refuse_streams),
        };
        let mut builder = builder
            .with_configuration(
                RTCConfigurationBuilder::new()
                    .with_name(name.to_owned())
                    .build(),
            )
            .with_ice_agent(Box::new(ice_agent));
        if let Some(sctp) = sctp {
            builder = builder.with_sctp_transport(Box::new(sctp));
        }
        Ok(Self {
            pc: builder.build()?,
            ice_calls,
            auto_complete,
            refuse_streams,
            seen: vec![],
        })
    }

    /// events drains what the connection reported so far
    pub fn events(&mut self) -> &[RTCPeerConnectionEvent] {
        while let Some(event) = self.pc.poll_event() {
            self.seen.push(event);
        }
        &self.seen
    }

    pub fn clear_events(&mut self) {
        self.events();
        self.seen.clear();
    }

    /// wait_for blocks until an event matching `f` was reported
    pub fn wait_for<F>(&mut self, f: F) -> Option<RTCPeerConnectionEvent>
    where
        F: Fn(&RTCPeerConnectionEvent) -> bool,
    {
        let deadline = Instant::now() + DEFAULT_TIMEOUT_DURATION;
        loop {
            if let Some(event) = self.events().iter().find(|e| f(e)) {
                return Some(event.clone());
            }
            if Instant::now() > deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn ice_calls(&self) -> Vec<String> {
        self.ice_calls.lock().unwrap().clone()
    }
}

/// pair builds two connections whose SCTP transports are looped into each
/// other
pub fn pair() -> Result<(Peer, Peer)> {
    let offerer = RTCPeerConnectionBuilder::new();
    let answerer = RTCPeerConnectionBuilder::new();
    let (offerer_events, answerer_events) = (offerer.event_sender(), answerer.event_sender());

    let offerer_complete = Arc::new(AtomicBool::new(true));
    let answerer_complete = Arc::new(AtomicBool::new(true));
    let offerer_sctp = LoopbackSctp {
        local: offerer_events.clone(),
        remote: answerer_events.clone(),
        auto_complete: Arc::clone(&offerer_complete),
    };
    let answerer_sctp = LoopbackSctp {
        local: answerer_events,
        remote: offerer_events,
        auto_complete: Arc::clone(&answerer_complete),
    };

    Ok((
        Peer::build("offerer", offerer, Some(offerer_sctp), offerer_complete)?,
        Peer::build("answerer", answerer, Some(answerer_sctp), answerer_complete)?,
    ))
}

/// signal carries a description through JSON like a signaling channel would
pub fn signal(desc: &RTCSessionDescription) -> Result<RTCSessionDescription> {
    Ok(serde_json::from_str(&serde_json::to_string(desc)?)?)
}

/// negotiate runs one full offer/answer exchange
pub fn negotiate(offerer: &Peer, answerer: &Peer) -> Result<()> {
    let offer = offerer.pc.create_offer(None).wait()?;
    offerer.pc.set_local_description(offer.clone()).wait()?;
    answerer.pc.set_remote_description(signal(&offer)?).wait()?;

    let answer = answerer.pc.create_answer().wait()?;
    answerer.pc.set_local_description(answer.clone()).wait()?;
    offerer.pc.set_remote_description(signal(&answer)?).wait()?;
    Ok(())
}
