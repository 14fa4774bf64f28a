
pub mod common;
pub mod media;
pub mod session;

pub const ATTR_KEY_CANDIDATE: &str = "candidate";
pub const ATTR_KEY_END_OF_CANDIDATES: &str = "end-of-candidates";
pub const ATTR_KEY_IDENTITY: &str = "identity";
pub const ATTR_KEY_GROUP: &str = "group";
pub const ATTR_KEY_SSRC: &str = "ssrc";
pub const ATTR_KEY_SSRC_GROUP: &str = "ssrc-group";
pub const ATTR_KEY_MSID: &str = "msid";
pub const ATTR_KEY_MSID_SEMANTIC: &str = "msid-semantic";
pub const ATTR_KEY_CONNECTION_SETUP: &str = "setup";
pub const ATTR_KEY_MID: &str = "mid";
pub const ATTR_KEY_ICE_LITE: &str = "ice-lite";
pub const ATTR_KEY_ICE_UFRAG: &str = "ice-ufrag";
pub const ATTR_KEY_ICE_PWD: &str = "ice-pwd";
pub const ATTR_KEY_ICE_OPTIONS: &str = "ice-options";
pub const ATTR_KEY_FINGERPRINT: &str = "fingerprint";
pub const ATTR_KEY_RTCP_MUX: &str = "rtcp-mux";
pub const ATTR_KEY_RTCP_RSIZE: &str = "rtcp-rsize";
pub const ATTR_KEY_RTCP_FB: &str = "rtcp-fb";
pub const ATTR_KEY_RTPMAP: &str = "rtpmap";
pub const ATTR_KEY_FMTP: &str = "fmtp";
pub const ATTR_KEY_SCTP_PORT: &str = "sctp-port";
pub const ATTR_KEY_MAX_MESSAGE_SIZE: &str = "max-message-size";
pub const ATTR_KEY_INACTIVE: &str = "inactive";
pub const ATTR_KEY_RECV_ONLY: &str = "recvonly";
pub const ATTR_KEY_SEND_ONLY: &str = "sendonly";
pub const ATTR_KEY_SEND_RECV: &str = "sendrecv";

pub const SEMANTIC_TOKEN_BUNDLE: &str = "BUNDLE";
pub const SEMANTIC_TOKEN_WEBRTC_MEDIA_STREAMS: &str = "WMS";
