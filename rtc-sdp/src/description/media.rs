use std::collections::HashMap;
use std::fmt;

use super::common::*;
use super::*;
use crate::direction::Direction;
use crate::util::{Codec, ConnectionRole, parse_fmtp, parse_rtcp_fb, parse_rtpmap};

/// RangedPort supports special format for the media field "m=" port value. If
/// it may be necessary to specify multiple transport ports, the protocol allows
/// to write it as: <port>/<number of ports> where number of ports is a an
/// offsetting range.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RangedPort {
    pub value: isize,
    pub range: Option<isize>,
}

impl fmt::Display for RangedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(range) = self.range {
            write!(f, "{}/{}", self.value, range)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// MediaName describes the "m=" field storage structure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaName {
    pub media: String,
    pub port: RangedPort,
    pub protos: Vec<String>,
    pub formats: Vec<String>,
}

impl fmt::Display for MediaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = [
            self.media.clone(),
            self.port.to_string(),
            self.protos.join("/"),
            self.formats.join(" "),
        ];
        write!(f, "{}", s.join(" "))
    }
}

/// MediaDescription represents a media type.
/// <https://tools.ietf.org/html/rfc4566#section-5.14>
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    /// `m=<media> <port>/<number of ports> <proto> <fmt> ...`
    pub media_name: MediaName,

    /// `i=<session description>`
    pub media_title: Option<Information>,

    /// `c=<nettype> <addrtype> <connection-address>`
    pub connection_information: Option<ConnectionInformation>,

    /// `b=<bwtype>:<bandwidth>`
    pub bandwidth: Vec<Bandwidth>,

    /// `k=<method>`
    pub encryption_key: Option<EncryptionKey>,

    /// Attributes are the primary means for extending SDP.
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    /// attribute returns the value of an attribute and if it exists
    pub fn attribute(&self, key: &str) -> Option<Option<&str>> {
        for a in &self.attributes {
            if a.key == key {
                return Some(a.value.as_ref().map(|s| s.as_ref()));
            }
        }
        None
    }

    /// attributes_with_key returns the values of every attribute named `key`
    pub fn attributes_with_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes
            .iter()
            .filter(move |a| a.key == key)
            .map(|a| a.value.as_deref().unwrap_or_default())
    }

    /// mid returns the a=mid value when present and non-empty
    pub fn mid(&self) -> Option<&str> {
        match self.attribute(ATTR_KEY_MID) {
            Some(Some(mid)) if !mid.is_empty() => Some(mid),
            _ => None,
        }
    }

    /// ice_credentials returns the a=ice-ufrag and a=ice-pwd pair
    pub fn ice_credentials(&self) -> (Option<&str>, Option<&str>) {
        (
            self.attribute(ATTR_KEY_ICE_UFRAG).flatten(),
            self.attribute(ATTR_KEY_ICE_PWD).flatten(),
        )
    }

    /// direction returns the first direction attribute of this section
    pub fn direction(&self) -> Direction {
        for a in &self.attributes {
            let d = Direction::new(&a.key);
            if d != Direction::Unspecified {
                return d;
            }
        }
        Direction::Unspecified
    }

    /// replace_direction removes every direction attribute and appends `direction`
    pub fn replace_direction(&mut self, direction: Direction) {
        self.attributes
            .retain(|a| Direction::new(&a.key) == Direction::Unspecified);
        if direction != Direction::Unspecified {
            self.attributes
                .push(Attribute::new(direction.to_string(), None));
        }
    }

    /// connection_role returns the a=setup value
    pub fn connection_role(&self) -> ConnectionRole {
        match self.attribute(ATTR_KEY_CONNECTION_SETUP) {
            Some(Some(v)) => ConnectionRole::from(v),
            _ => ConnectionRole::Unspecified,
        }
    }

    /// replace_connection_role updates the a=setup value in place
    pub fn replace_connection_role(&mut self, role: ConnectionRole) {
        for a in &mut self.attributes {
            if a.key == ATTR_KEY_CONNECTION_SETUP {
                a.value = Some(role.to_string());
                return;
            }
        }
        self.attributes.push(Attribute::new(
            ATTR_KEY_CONNECTION_SETUP.to_owned(),
            Some(role.to_string()),
        ));
    }

    /// is_rejected is true for a section with port zero
    pub fn is_rejected(&self) -> bool {
        self.media_name.port.value == 0
    }

    /// codecs assembles one Codec per payload format using the rtpmap, fmtp
    /// and rtcp-fb attributes. Formats without an rtpmap are skipped.
    pub fn codecs(&self) -> Vec<Codec> {
        let mut codecs: HashMap<u8, Codec> = HashMap::new();
        for value in self.attributes_with_key(ATTR_KEY_RTPMAP) {
            if let Some(codec) = parse_rtpmap(value) {
                codecs.insert(codec.payload_type, codec);
            }
        }
        for value in self.attributes_with_key(ATTR_KEY_FMTP) {
            if let Some((pt, fmtp)) = parse_fmtp(value) {
                if let Some(codec) = codecs.get_mut(&pt) {
                    codec.fmtp = fmtp;
                }
            }
        }
        for value in self.attributes_with_key(ATTR_KEY_RTCP_FB) {
            if let Some((pt, fb)) = parse_rtcp_fb(value) {
                if let Some(codec) = codecs.get_mut(&pt) {
                    codec.rtcp_feedback.push(fb);
                }
            }
        }

        self.media_name
            .formats
            .iter()
            .filter_map(|f| f.parse::<u8>().ok())
            .filter_map(|pt| codecs.remove(&pt))
            .collect()
    }

    /// new_jsep_media_description creates a new MediaName with
    /// some settings that are required by the JSEP spec.
    pub fn new_jsep_media_description(codec_type: String, _codec_prefs: Vec<&str>) -> Self {
        MediaDescription {
            media_name: MediaName {
                media: codec_type,
                port: RangedPort {
                    value: 9,
                    range: None,
                },
                protos: vec![
                    "UDP".to_owned(),
                    "TLS".to_owned(),
                    "RTP".to_owned(),
                    "SAVPF".to_owned(),
                ],
                formats: vec![],
            },
            media_title: None,
            connection_information: Some(ConnectionInformation {
                network_type: "IN".to_owned(),
                address_type: "IP4".to_owned(),
                address: Some("0.0.0.0".to_owned()),
            }),
            bandwidth: vec![],
            encryption_key: None,
            attributes: vec![],
        }
    }

    /// with_property_attribute adds a property attribute 'a=key' to the media description
    pub fn with_property_attribute(mut self, key: String) -> Self {
        self.attributes.push(Attribute::new(key, None));
        self
    }

    /// with_value_attribute adds a value attribute 'a=key:value' to the media description
    pub fn with_value_attribute(mut self, key: String, value: String) -> Self {
        self.attributes.push(Attribute::new(key, Some(value)));
        self
    }

    /// with_fingerprint adds a fingerprint to the media description
    pub fn with_fingerprint(self, algorithm: String, value: String) -> Self {
        self.with_value_attribute(ATTR_KEY_FINGERPRINT.to_owned(), algorithm + " " + &value)
    }

    /// with_ice_credentials adds ICE credentials to the media description
    pub fn with_ice_credentials(self, username: String, password: String) -> Self {
        self.with_value_attribute(ATTR_KEY_ICE_UFRAG.to_owned(), username)
            .with_value_attribute(ATTR_KEY_ICE_PWD.to_owned(), password)
    }

    /// with_format adds a payload format to the m= line
    pub fn with_format(mut self, format: String) -> Self {
        self.media_name.formats.push(format);
        self
    }

    /// with_codec adds codec information to the media description
    pub fn with_codec(
        mut self,
        payload_type: u8,
        name: String,
        clockrate: u32,
        channels: u16,
        fmtp: String,
    ) -> Self {
        self.media_name.formats.push(payload_type.to_string());
        let mut rtpmap = format!("{payload_type} {name}/{clockrate}");
        if channels > 0 {
            rtpmap += format!("/{channels}").as_str();
        }

        if !fmtp.is_empty() {
            self.with_value_attribute(ATTR_KEY_RTPMAP.to_owned(), rtpmap)
                .with_value_attribute(ATTR_KEY_FMTP.to_owned(), format!("{payload_type} {fmtp}"))
        } else {
            self.with_value_attribute(ATTR_KEY_RTPMAP.to_owned(), rtpmap)
        }
    }

    /// with_media_source adds media source information to the media description
    pub fn with_media_source(
        self,
        ssrc: u32,
        cname: String,
        stream_label: String,
        label: String,
    ) -> Self {
        self.with_value_attribute(
            ATTR_KEY_SSRC.to_owned(),
            format!("{ssrc} msid:{stream_label} {label}"),
        )
        .with_value_attribute(ATTR_KEY_SSRC.to_owned(), format!("{ssrc} cname:{cname}"))
    }

    /// with_candidate adds an ICE candidate to the media description
    pub fn with_candidate(self, value: String) -> Self {
        self.with_value_attribute(ATTR_KEY_CANDIDATE.to_owned(), value)
    }

    pub fn with_end_of_candidates(self) -> Self {
        self.with_property_attribute(ATTR_KEY_END_OF_CANDIDATES.to_owned())
    }
}
