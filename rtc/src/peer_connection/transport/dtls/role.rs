use std::fmt;

use sdp::util::ConnectionRole;
use serde::{Deserialize, Serialize};

/// RTCDtlsRole indicates the role of the DTLS transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCDtlsRole {
    #[default]
    Unspecified = 0,

    /// The role is not settled yet: this side offered `setup:actpass`.
    #[serde(rename = "auto")]
    Auto = 1,

    /// DTLSRoleClient defines the DTLS client role.
    #[serde(rename = "client")]
    Client = 2,

    /// DTLSRoleServer defines the DTLS server role.
    #[serde(rename = "server")]
    Server = 3,
}

impl fmt::Display for RTCDtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCDtlsRole::Auto => write!(f, "auto"),
            RTCDtlsRole::Client => write!(f, "client"),
            RTCDtlsRole::Server => write!(f, "server"),
            _ => write!(
                f,
                "{}",
                crate::peer_connection::configuration::UNSPECIFIED_STR
            ),
        }
    }
}

/// A resolved local `a=setup` value maps onto the DTLS role: the active side
/// sends the ClientHello.
impl From<ConnectionRole> for RTCDtlsRole {
    fn from(role: ConnectionRole) -> Self {
        match role {
            ConnectionRole::Active => RTCDtlsRole::Client,
            ConnectionRole::Passive => RTCDtlsRole::Server,
            ConnectionRole::Actpass => RTCDtlsRole::Auto,
            _ => RTCDtlsRole::Unspecified,
        }
    }
}
