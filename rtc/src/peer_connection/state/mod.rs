//! WebRTC connection state types.
//!
//! A peer connection tracks four states:
//!
//! - **[`RTCSignalingState`]** follows the offer/answer exchange
//! - **[`RTCIceGatheringState`]** collates candidate gathering over all ICE transports
//! - **[`RTCIceConnectionState`]** collates connectivity over all ICE transports
//! - **[`RTCPeerConnectionState`]** combines ICE and DTLS into the overall state
//!
//! Every change is reported with the matching `On*StateChangeEvent` of
//! [`RTCPeerConnectionEvent`](crate::peer_connection::event::RTCPeerConnectionEvent).
//!
//! ```text
//! Stable → HaveLocalOffer → Stable
//!   or
//! Stable → HaveRemoteOffer → Stable
//! ```
//!
//! With provisional answers:
//!
//! ```text
//! Stable → HaveLocalOffer → HaveRemotePranswer → Stable
//!   or
//! Stable → HaveRemoteOffer → HaveLocalPranswer → Stable
//! ```
//!
//! [W3C WebRTC Specification](https://w3c.github.io/webrtc-pc/)

pub(crate) mod ice_connection_state;
pub(crate) mod ice_gathering_state;
pub(crate) mod peer_connection_state;
pub(crate) mod signaling_state;

pub use ice_connection_state::RTCIceConnectionState;
pub use ice_gathering_state::RTCIceGatheringState;
pub use peer_connection_state::RTCPeerConnectionState;
pub use signaling_state::RTCSignalingState;
