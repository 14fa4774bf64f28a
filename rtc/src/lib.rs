//! # RTC - WebRTC Peer Connection Negotiation in Rust
//!
//! This crate implements the negotiation and transport state machine of a
//! WebRTC peer connection: the JSEP offer/answer exchange, transceivers,
//! trickle ICE, DTLS roles, and data channels over SCTP.
//!
//! The protocol engines it depends on are not part of it. An ICE agent and
//! an SCTP association are plugged in through the
//! [`IceAgent`](peer_connection::transport::IceAgent) and
//! [`SctpTransport`](peer_connection::transport::SctpTransport) traits, and
//! report back through an
//! [`RTCTransportEventSender`](peer_connection::RTCTransportEventSender).
//!
//! ## Threading
//!
//! Each peer connection runs a dedicated operation thread. Every mutating
//! call is queued there and returns a
//! [`Promise`](peer_connection::promise::Promise) that can be waited on or
//! awaited. Events are delivered on the same thread, after the task that
//! raised them released the connection state, so a handler may call back
//! into the connection. Waiting on a promise from inside the handler
//! deadlocks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rtc::peer_connection::RTCPeerConnectionBuilder;
//! use rtc::peer_connection::configuration::RTCConfigurationBuilder;
//! use rtc::peer_connection::event::RTCPeerConnectionEvent;
//! use rtc::peer_connection::transport::IceAgent;
//! use rtc::peer_connection::RTCTransportEventSender;
//!
//! # fn my_ice_agent(_: RTCTransportEventSender) -> Box<dyn IceAgent> { unimplemented!() }
//! # fn send_to_remote_peer(_: &str) {}
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let builder = RTCPeerConnectionBuilder::new()
//!     .with_configuration(RTCConfigurationBuilder::new().build());
//! let ice_agent = my_ice_agent(builder.event_sender());
//! let pc = builder.with_ice_agent(ice_agent).build()?;
//!
//! pc.on_event(Some(Box::new(|event| match event {
//!     RTCPeerConnectionEvent::OnIceCandidateEvent(evt) => {
//!         send_to_remote_peer(&evt.candidate);
//!     }
//!     RTCPeerConnectionEvent::OnConnectionStateChangeEvent(state) => {
//!         log::info!("connection state: {state}");
//!     }
//!     _ => {}
//! })));
//!
//! let dc = pc.create_data_channel("chat", None).wait()?;
//! let offer = pc.create_offer(None).wait()?;
//! pc.set_local_description(offer.clone()).wait()?;
//! send_to_remote_peer(&serde_json::to_string(&offer)?);
//!
//! // once the remote answer arrives:
//! // pc.set_remote_description(answer).wait()?;
//!
//! dc.send_text("hello").wait()?;
//! pc.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Further Reading
//!
//! - [JSEP (RFC 8829)](https://www.rfc-editor.org/rfc/rfc8829) - offer/answer rules for WebRTC
//! - [WebRTC 1.0](https://w3c.github.io/webrtc-pc/) - the API this crate follows
//! - [RFC 8832](https://www.rfc-editor.org/rfc/rfc8832) - data channel establishment protocol

#![doc(
    html_logo_url = "https://raw.githubusercontent.com/webrtc-rs/webrtc-rs.github.io/master/res/rtc.png"
)]
#![warn(rust_2018_idioms)]

pub use {datachannel, sansio, sdp, shared};

pub mod data_channel;
pub mod peer_connection;
pub mod rtp_transceiver;
pub mod stats;
