//! Peer connection configuration.
//!
//! [`RTCConfiguration`] is immutable once the peer connection is built. It is
//! assembled with [`RTCConfigurationBuilder`]:
//!
//! ```
//! use rtc::peer_connection::configuration::RTCConfigurationBuilder;
//! use rtc::peer_connection::configuration::bundle_policy::RTCBundlePolicy;
//!
//! let config = RTCConfigurationBuilder::new()
//!     .with_bundle_policy(RTCBundlePolicy::MaxBundle)
//!     .with_stun_server("stun:stun.l.google.com:19302".to_owned())
//!     .with_name("alice".to_owned())
//!     .build();
//!
//! assert_eq!(config.bundle_policy(), RTCBundlePolicy::MaxBundle);
//! assert_eq!(config.sctp_port(), 5000);
//! ```

pub mod bundle_policy;
pub mod offer_answer_options;
pub mod rtcp_mux_policy;

use crate::peer_connection::certificate::RTCCertificate;
use bundle_policy::RTCBundlePolicy;
use rtcp_mux_policy::RTCRtcpMuxPolicy;

/// UNSPECIFIED_STR is the string representation of every enum's unspecified
/// value.
pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

pub(crate) const DEFAULT_MAX_DATA_CHANNELS: u16 = 65535;
pub(crate) const DEFAULT_MAX_MESSAGE_SIZE: usize = 65536;
pub(crate) const DEFAULT_SCTP_PORT: u16 = 5000;
pub(crate) const DEFAULT_NAME: &str = "webrtc";

/// A Configuration defines how peer-to-peer communication via PeerConnection
/// is established or re-established.
#[derive(Debug, Clone)]
pub struct RTCConfiguration {
    pub(crate) bundle_policy: RTCBundlePolicy,

    pub(crate) rtcp_mux_policy: RTCRtcpMuxPolicy,

    /// certificates used by every DTLS transport. One ECDSA certificate is
    /// generated when the list is empty.
    pub(crate) certificates: Vec<RTCCertificate>,

    pub(crate) stun_server: Option<String>,

    pub(crate) turn_server: Option<String>,

    pub(crate) max_data_channels: u16,

    pub(crate) max_message_size: usize,

    pub(crate) sctp_port: u16,

    /// name appears in `a=msid-semantic` and is the RTCP CNAME
    pub(crate) name: String,
}

impl Default for RTCConfiguration {
    fn default() -> Self {
        RTCConfigurationBuilder::new().build()
    }
}

impl RTCConfiguration {
    pub fn bundle_policy(&self) -> RTCBundlePolicy {
        self.bundle_policy
    }

    pub fn rtcp_mux_policy(&self) -> RTCRtcpMuxPolicy {
        self.rtcp_mux_policy
    }

    pub fn certificates(&self) -> &[RTCCertificate] {
        &self.certificates
    }

    pub fn stun_server(&self) -> Option<&str> {
        self.stun_server.as_deref()
    }

    pub fn turn_server(&self) -> Option<&str> {
        self.turn_server.as_deref()
    }

    pub fn max_data_channels(&self) -> u16 {
        self.max_data_channels
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn sctp_port(&self) -> u16 {
        self.sctp_port
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct RTCConfigurationBuilder {
    bundle_policy: RTCBundlePolicy,
    rtcp_mux_policy: RTCRtcpMuxPolicy,
    certificates: Vec<RTCCertificate>,
    stun_server: Option<String>,
    turn_server: Option<String>,
    max_data_channels: u16,
    max_message_size: usize,
    sctp_port: u16,
    name: String,
}

impl Default for RTCConfigurationBuilder {
    fn default() -> Self {
        Self {
            bundle_policy: RTCBundlePolicy::default(),
            rtcp_mux_policy: RTCRtcpMuxPolicy::default(),
            certificates: vec![],
            stun_server: None,
            turn_server: None,
            max_data_channels: DEFAULT_MAX_DATA_CHANNELS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            sctp_port: DEFAULT_SCTP_PORT,
            name: DEFAULT_NAME.to_owned(),
        }
    }
}

impl RTCConfigurationBuilder {
    pub fn new() -> Self {
        RTCConfigurationBuilder::default()
    }

    pub fn with_bundle_policy(mut self, bundle_policy: RTCBundlePolicy) -> Self {
        self.bundle_policy = bundle_policy;
        self
    }

    pub fn with_rtcp_mux_policy(mut self, rtcp_mux_policy: RTCRtcpMuxPolicy) -> Self {
        self.rtcp_mux_policy = rtcp_mux_policy;
        self
    }

    pub fn with_certificates(mut self, certificates: Vec<RTCCertificate>) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn with_stun_server(mut self, stun_server: String) -> Self {
        self.stun_server = Some(stun_server);
        self
    }

    pub fn with_turn_server(mut self, turn_server: String) -> Self {
        self.turn_server = Some(turn_server);
        self
    }

    pub fn with_max_data_channels(mut self, max_data_channels: u16) -> Self {
        self.max_data_channels = max_data_channels;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_sctp_port(mut self, sctp_port: u16) -> Self {
        self.sctp_port = sctp_port;
        self
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    pub fn build(self) -> RTCConfiguration {
        RTCConfiguration {
            bundle_policy: self.bundle_policy,
            rtcp_mux_policy: self.rtcp_mux_policy,
            certificates: self.certificates,
            stun_server: self.stun_server,
            turn_server: self.turn_server,
            max_data_channels: self.max_data_channels,
            max_message_size: self.max_message_size,
            sctp_port: self.sctp_port,
            name: self.name,
        }
    }
}
