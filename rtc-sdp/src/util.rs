use std::fmt;

/// ConnectionRole indicates which of the end points should initiate the connection establishment
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum ConnectionRole {
    #[default]
    Unspecified,

    /// ConnectionRoleActive indicates the endpoint will initiate an outgoing connection.
    Active,

    /// ConnectionRolePassive indicates the endpoint will accept an incoming connection.
    Passive,

    /// ConnectionRoleActpass indicates the endpoint is willing to accept an incoming connection or to initiate an outgoing connection.
    Actpass,

    /// ConnectionRoleHoldconn indicates the endpoint does not want the connection to be established for the time being.
    Holdconn,
}

const CONNECTION_ROLE_ACTIVE_STR: &str = "active";
const CONNECTION_ROLE_PASSIVE_STR: &str = "passive";
const CONNECTION_ROLE_ACTPASS_STR: &str = "actpass";
const CONNECTION_ROLE_HOLDCONN_STR: &str = "holdconn";

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionRole::Active => CONNECTION_ROLE_ACTIVE_STR,
            ConnectionRole::Passive => CONNECTION_ROLE_PASSIVE_STR,
            ConnectionRole::Actpass => CONNECTION_ROLE_ACTPASS_STR,
            ConnectionRole::Holdconn => CONNECTION_ROLE_HOLDCONN_STR,
            _ => "Unspecified",
        };
        write!(f, "{s}")
    }
}

impl From<&str> for ConnectionRole {
    fn from(raw: &str) -> Self {
        match raw {
            CONNECTION_ROLE_ACTIVE_STR => ConnectionRole::Active,
            CONNECTION_ROLE_PASSIVE_STR => ConnectionRole::Passive,
            CONNECTION_ROLE_ACTPASS_STR => ConnectionRole::Actpass,
            CONNECTION_ROLE_HOLDCONN_STR => ConnectionRole::Holdconn,
            _ => ConnectionRole::Unspecified,
        }
    }
}

/// Codec represents a codec assembled from the rtpmap, fmtp and rtcp-fb
/// attributes of one payload type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
    pub encoding_parameters: String,
    pub fmtp: String,
    pub rtcp_feedback: Vec<String>,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}/{} ({}) [{}]",
            self.payload_type,
            self.name,
            self.clock_rate,
            self.encoding_parameters,
            self.fmtp,
            self.rtcp_feedback.join(", "),
        )
    }
}

/// parse_rtpmap parses `<pt> <name>/<clock>[/<params>]`.
pub(crate) fn parse_rtpmap(rtpmap: &str) -> Option<Codec> {
    let (pt, rest) = rtpmap.split_once(' ')?;
    let payload_type = pt.parse::<u8>().ok()?;

    let mut split = rest.split('/');
    let name = split.next()?.trim().to_owned();
    let clock_rate = match split.next() {
        Some(c) => c.trim().parse::<u32>().ok()?,
        None => 0,
    };
    let encoding_parameters = split.next().unwrap_or_default().trim().to_owned();

    Some(Codec {
        payload_type,
        name,
        clock_rate,
        encoding_parameters,
        ..Default::default()
    })
}

/// parse_fmtp parses `<pt> <parameters>`.
pub(crate) fn parse_fmtp(fmtp: &str) -> Option<(u8, String)> {
    let (pt, rest) = fmtp.split_once(' ')?;
    Some((pt.parse::<u8>().ok()?, rest.trim().to_owned()))
}

/// parse_rtcp_fb parses `<pt> <feedback>`.
pub(crate) fn parse_rtcp_fb(rtcp_fb: &str) -> Option<(u8, String)> {
    let (pt, rest) = rtcp_fb.split_once(' ')?;
    Some((pt.parse::<u8>().ok()?, rest.trim().to_owned()))
}
