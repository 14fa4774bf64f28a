//! Transport layer bookkeeping for ICE, DTLS and SCTP.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      Transceivers / Data Channels   │
//! ├──────────────┬──────────────────────┤
//! │ send/receive │      SCTP            │  SctpTransport
//! │    bins      │                      │
//! ├──────────────┴──────────────────────┤
//! │      DTLS (one per component)       │  RTCDtlsTransport
//! ├─────────────────────────────────────┤
//! │      ICE stream (rtp, rtcp)         │  IceAgent
//! └─────────────────────────────────────┘
//! ```
//!
//! The engine owns one [`stream::RTCTransportStream`] per bundle group, or
//! per media section when nothing is bundled, keyed by its session id.
//! Transceivers refer to their stream by that id. The ICE agent and the
//! SCTP association are external collaborators behind the [`IceAgent`] and
//! [`SctpTransport`] traits.
//!
//! ```
//! use rtc::peer_connection::transport::{RTCDtlsTransportState, RTCIceTransportState};
//!
//! fn media_can_flow(ice: RTCIceTransportState, dtls: RTCDtlsTransportState) -> bool {
//!     ice.is_connected() && dtls == RTCDtlsTransportState::Connected
//! }
//!
//! assert!(media_can_flow(
//!     RTCIceTransportState::Completed,
//!     RTCDtlsTransportState::Connected
//! ));
//! ```

pub mod bin;
pub mod dtls;
pub mod ice;
pub mod sctp;
pub(crate) mod stream;

pub use bin::{RTCReceiveState, RTCTransportReceiveBin, RTCTransportSendBin};
pub use dtls::RTCDtlsTransport;
pub use dtls::fingerprint::RTCDtlsFingerprint;
pub use dtls::role::RTCDtlsRole;
pub use dtls::state::RTCDtlsTransportState;
pub use ice::state::RTCIceTransportState;
pub use ice::{IceAgent, IceStreamId, RTCIceComponent};
pub use sctp::{RTCSctpTransportState, SctpTransport};
