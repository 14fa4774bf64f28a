use std::fmt;
use std::io;

use super::common::*;
use super::media::*;
use super::*;
use shared::error::{Error, Result};

/// Version describes the value provided by the "v=" field which gives
/// the version of the Session Description Protocol.
pub type Version = isize;

/// Origin defines the structure for the "o=" field which provides the
/// originator of the session plus a session identifier and version number.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub network_type: String,
    pub address_type: String,
    pub unicast_address: String,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.network_type,
            self.address_type,
            self.unicast_address,
        )
    }
}

impl Origin {
    pub fn new() -> Self {
        Origin {
            username: "".to_owned(),
            session_id: 0,
            session_version: 0,
            network_type: "".to_owned(),
            address_type: "".to_owned(),
            unicast_address: "".to_owned(),
        }
    }
}

/// SessionName describes a structured representations for the "s=" field
/// and is the textual session name.
pub type SessionName = String;

/// EmailAddress describes a structured representations for the "e=" line
/// which specifies email contact information for the person responsible for
/// the conference.
pub type EmailAddress = String;

/// PhoneNumber describes a structured representations for the "p=" line
/// specify phone contact information for the person responsible for the
/// conference.
pub type PhoneNumber = String;

/// Timing defines the "t=" field's structured representation for the start and
/// stop times.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Timing {
    pub start_time: u64,
    pub stop_time: u64,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.start_time, self.stop_time)
    }
}

/// TimeDescription describes "t=", "r=" fields of the session description
/// which are used to specify the start and stop times for a session as well as
/// repeat intervals and durations for the scheduled session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimeDescription {
    /// `t=<start-time> <stop-time>`
    pub timing: Timing,

    /// `r=<repeat interval> <active duration> <offsets from start-time>`, kept verbatim
    pub repeat_times: Vec<String>,
}

/// SessionDescription is a a well-defined format for conveying sufficient
/// information to discover and participate in a multimedia session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// `v=0`
    pub version: Version,

    /// `o=<username> <sess-id> <sess-version> <nettype> <addrtype> <unicast-address>`
    pub origin: Origin,

    /// `s=<session name>`
    pub session_name: SessionName,

    /// `i=<session description>`
    pub session_information: Option<Information>,

    /// `u=<uri>`
    pub uri: Option<String>,

    /// `e=<email-address>`
    pub email_address: Option<EmailAddress>,

    /// `p=<phone-number>`
    pub phone_number: Option<PhoneNumber>,

    /// `c=<nettype> <addrtype> <connection-address>`
    pub connection_information: Option<ConnectionInformation>,

    /// `b=<bwtype>:<bandwidth>`
    pub bandwidth: Vec<Bandwidth>,

    /// Timing lines, at least one is required on the wire
    pub time_descriptions: Vec<TimeDescription>,

    /// `z=<adjustment time> <offset> ...`, kept verbatim
    pub time_zones: Vec<String>,

    /// `k=<method>`
    pub encryption_key: Option<EncryptionKey>,

    /// `a=<attribute>` and `a=<attribute>:<value>`
    pub attributes: Vec<Attribute>,

    /// Media Descriptions
    pub media_descriptions: Vec<MediaDescription>,
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marshal())
    }
}

impl SessionDescription {
    /// new_jsep_session_description creates a new SessionDescription with
    /// some settings that are required by the JSEP spec.
    pub fn new_jsep_session_description(session_id: u64) -> Self {
        SessionDescription {
            version: 0,
            origin: Origin {
                username: "-".to_string(),
                session_id,
                session_version: 0,
                network_type: "IN".to_string(),
                address_type: "IP4".to_string(),
                unicast_address: "0.0.0.0".to_string(),
            },
            session_name: "-".to_string(),
            time_descriptions: vec![TimeDescription {
                timing: Timing {
                    start_time: 0,
                    stop_time: 0,
                },
                repeat_times: vec![],
            }],
            ..Default::default()
        }
    }

    /// with_property_attribute adds a property attribute 'a=key' to the session description
    pub fn with_property_attribute(mut self, key: String) -> Self {
        self.attributes.push(Attribute::new(key, None));
        self
    }

    /// with_value_attribute adds a value attribute 'a=key:value' to the session description
    pub fn with_value_attribute(mut self, key: String, value: String) -> Self {
        self.attributes.push(Attribute::new(key, Some(value)));
        self
    }

    /// with_fingerprint adds a fingerprint to the session description
    pub fn with_fingerprint(self, algorithm: String, value: String) -> Self {
        self.with_value_attribute(ATTR_KEY_FINGERPRINT.to_owned(), algorithm + " " + value.as_str())
    }

    /// with_media adds a media description to the session description
    pub fn with_media(mut self, md: MediaDescription) -> Self {
        self.media_descriptions.push(md);
        self
    }

    /// attribute returns the value of the first session attribute named `key`
    pub fn attribute(&self, key: &str) -> Option<&String> {
        for a in &self.attributes {
            if a.key == key {
                return a.value.as_ref();
            }
        }
        None
    }

    /// has_attribute reports whether a session attribute named `key` exists
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.iter().any(|a| a.key == key)
    }

    /// bundle_group returns the mids of the first a=group:BUNDLE attribute
    pub fn bundle_group(&self) -> Option<Vec<&str>> {
        for a in &self.attributes {
            if a.key != ATTR_KEY_GROUP {
                continue;
            }
            if let Some(value) = &a.value {
                let mut fields = value.split_whitespace();
                if fields.next() == Some(SEMANTIC_TOKEN_BUNDLE) {
                    return Some(fields.collect());
                }
            }
        }
        None
    }

    /// Marshal takes a SDP struct to text
    /// <https://tools.ietf.org/html/rfc4566#section-5>
    pub fn marshal(&self) -> String {
        let mut result = String::new();

        result += key_value_build("v=", Some(&self.version.to_string())).as_str();
        result += key_value_build("o=", Some(&self.origin.to_string())).as_str();
        result += key_value_build("s=", Some(&self.session_name)).as_str();
        result += key_value_build("i=", self.session_information.as_ref()).as_str();
        result += key_value_build("u=", self.uri.as_ref()).as_str();
        result += key_value_build("e=", self.email_address.as_ref()).as_str();
        result += key_value_build("p=", self.phone_number.as_ref()).as_str();
        if let Some(connection_information) = &self.connection_information {
            result += key_value_build("c=", Some(&connection_information.to_string())).as_str();
        }

        for bandwidth in &self.bandwidth {
            result += key_value_build("b=", Some(&bandwidth.to_string())).as_str();
        }
        for time_description in &self.time_descriptions {
            result += key_value_build("t=", Some(&time_description.timing.to_string())).as_str();
            for repeat_time in &time_description.repeat_times {
                result += key_value_build("r=", Some(repeat_time)).as_str();
            }
        }
        for time_zone in &self.time_zones {
            result += key_value_build("z=", Some(time_zone)).as_str();
        }
        result += key_value_build("k=", self.encryption_key.as_ref()).as_str();
        for attribute in &self.attributes {
            result += key_value_build("a=", Some(&attribute.to_string())).as_str();
        }

        for media_description in &self.media_descriptions {
            result +=
                key_value_build("m=", Some(&media_description.media_name.to_string())).as_str();
            result += key_value_build("i=", media_description.media_title.as_ref()).as_str();
            if let Some(connection_information) = &media_description.connection_information {
                result +=
                    key_value_build("c=", Some(&connection_information.to_string())).as_str();
            }
            for bandwidth in &media_description.bandwidth {
                result += key_value_build("b=", Some(&bandwidth.to_string())).as_str();
            }
            result += key_value_build("k=", media_description.encryption_key.as_ref()).as_str();
            for attribute in &media_description.attributes {
                result += key_value_build("a=", Some(&attribute.to_string())).as_str();
            }
        }

        result
    }

    /// Unmarshal is the primary function that deserializes the session description
    /// message and stores it inside of a structured SessionDescription object.
    ///
    /// Lines are accepted with either CRLF or LF endings. Blank lines are
    /// skipped. Session level fields must precede the first `m=` line.
    pub fn unmarshal<R: io::BufRead>(reader: &mut R) -> Result<Self> {
        let mut sd = SessionDescription::default();
        let mut seen_version = false;
        let mut seen_origin = false;
        let mut seen_session_name = false;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }

            let (key, value) = split_key_value(trimmed)?;

            if !seen_version && key != 'v' {
                return Err(Error::ErrSdpInvalidSyntax(trimmed.to_owned()));
            }

            match sd.media_descriptions.last_mut() {
                None => match key {
                    'v' => {
                        sd.version = value
                            .parse::<isize>()
                            .map_err(|_| Error::ErrSdpInvalidValue(value.to_owned()))?;
                        seen_version = true;
                    }
                    'o' => {
                        sd.origin = unmarshal_origin(value)?;
                        seen_origin = true;
                    }
                    's' => {
                        sd.session_name = value.to_owned();
                        seen_session_name = true;
                    }
                    'i' => sd.session_information = Some(value.to_owned()),
                    'u' => sd.uri = Some(value.to_owned()),
                    'e' => sd.email_address = Some(value.to_owned()),
                    'p' => sd.phone_number = Some(value.to_owned()),
                    'c' => sd.connection_information = Some(unmarshal_connection_information(value)?),
                    'b' => sd.bandwidth.push(unmarshal_bandwidth(value)?),
                    't' => sd.time_descriptions.push(TimeDescription {
                        timing: unmarshal_timing(value)?,
                        repeat_times: vec![],
                    }),
                    'r' => match sd.time_descriptions.last_mut() {
                        Some(td) => td.repeat_times.push(value.to_owned()),
                        None => return Err(Error::ErrSdpInvalidSyntax(trimmed.to_owned())),
                    },
                    'z' => sd.time_zones.push(value.to_owned()),
                    'k' => sd.encryption_key = Some(value.to_owned()),
                    'a' => sd.attributes.push(parse_attribute(value)),
                    'm' => {
                        if !seen_origin || !seen_session_name {
                            return Err(Error::ErrSdpInvalidSyntax(trimmed.to_owned()));
                        }
                        if sd.time_descriptions.is_empty() {
                            return Err(Error::ErrSdpEmptyTimeDescription);
                        }
                        sd.media_descriptions.push(unmarshal_media_name(value)?);
                    }
                    _ => return Err(Error::ErrSdpInvalidSyntax(trimmed.to_owned())),
                },
                Some(media) => match key {
                    'i' => media.media_title = Some(value.to_owned()),
                    'c' => {
                        media.connection_information =
                            Some(unmarshal_connection_information(value)?)
                    }
                    'b' => media.bandwidth.push(unmarshal_bandwidth(value)?),
                    'k' => media.encryption_key = Some(value.to_owned()),
                    'a' => media.attributes.push(parse_attribute(value)),
                    'm' => sd.media_descriptions.push(unmarshal_media_name(value)?),
                    _ => return Err(Error::ErrSdpInvalidSyntax(trimmed.to_owned())),
                },
            }
        }

        if !seen_version || !seen_origin || !seen_session_name {
            return Err(Error::ErrSdpInvalidSyntax(
                "missing v=, o= or s= line".to_owned(),
            ));
        }
        if sd.time_descriptions.is_empty() {
            return Err(Error::ErrSdpEmptyTimeDescription);
        }

        Ok(sd)
    }
}

fn key_value_build(key: &str, value: Option<&String>) -> String {
    if let Some(val) = value {
        format!("{key}{val}\r\n")
    } else {
        "".to_string()
    }
}

fn split_key_value(line: &str) -> Result<(char, &str)> {
    let mut chars = line.chars();
    let key = chars
        .next()
        .ok_or_else(|| Error::ErrSdpInvalidSyntax(line.to_owned()))?;
    if chars.next() != Some('=') || !key.is_ascii_lowercase() {
        return Err(Error::ErrSdpInvalidSyntax(line.to_owned()));
    }
    Ok((key, &line[2..]))
}

fn unmarshal_origin(value: &str) -> Result<Origin> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(Error::ErrSdpInvalidSyntax(format!("`o={value}`")));
    }

    let session_id = fields[1]
        .parse::<u64>()
        .map_err(|_| Error::ErrSdpInvalidValue(fields[1].to_owned()))?;
    let session_version = fields[2]
        .parse::<u64>()
        .map_err(|_| Error::ErrSdpInvalidValue(fields[2].to_owned()))?;

    // Set according to currently registered with IANA
    // https://tools.ietf.org/html/rfc4566#section-8.2.6
    if fields[3] != "IN" {
        return Err(Error::ErrSdpInvalidValue(fields[3].to_owned()));
    }
    // Set according to currently registered with IANA
    // https://tools.ietf.org/html/rfc4566#section-8.2.7
    if fields[4] != "IP4" && fields[4] != "IP6" {
        return Err(Error::ErrSdpInvalidValue(fields[4].to_owned()));
    }

    Ok(Origin {
        username: fields[0].to_owned(),
        session_id,
        session_version,
        network_type: fields[3].to_owned(),
        address_type: fields[4].to_owned(),
        unicast_address: fields[5].to_owned(),
    })
}

fn unmarshal_connection_information(value: &str) -> Result<ConnectionInformation> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(Error::ErrSdpInvalidSyntax(format!("`c={value}`")));
    }
    if fields[0] != "IN" {
        return Err(Error::ErrSdpInvalidValue(fields[0].to_owned()));
    }
    if fields[1] != "IP4" && fields[1] != "IP6" {
        return Err(Error::ErrSdpInvalidValue(fields[1].to_owned()));
    }

    Ok(ConnectionInformation {
        network_type: fields[0].to_owned(),
        address_type: fields[1].to_owned(),
        address: fields.get(2).map(|a| (*a).to_owned()),
    })
}

fn unmarshal_bandwidth(value: &str) -> Result<Bandwidth> {
    let (bandwidth_type, bandwidth) = value
        .split_once(':')
        .ok_or_else(|| Error::ErrSdpInvalidValue(value.to_owned()))?;

    let (experimental, bandwidth_type) = match bandwidth_type.strip_prefix("X-") {
        Some(t) => (true, t),
        None => (false, bandwidth_type),
    };
    let bandwidth = bandwidth
        .parse::<u64>()
        .map_err(|_| Error::ErrSdpInvalidValue(bandwidth.to_owned()))?;

    Ok(Bandwidth {
        experimental,
        bandwidth_type: bandwidth_type.to_owned(),
        bandwidth,
    })
}

fn unmarshal_timing(value: &str) -> Result<Timing> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(Error::ErrSdpInvalidSyntax(format!("`t={value}`")));
    }

    let start_time = fields[0]
        .parse::<u64>()
        .map_err(|_| Error::ErrSdpInvalidValue(fields[0].to_owned()))?;
    let stop_time = fields[1]
        .parse::<u64>()
        .map_err(|_| Error::ErrSdpInvalidValue(fields[1].to_owned()))?;

    Ok(Timing {
        start_time,
        stop_time,
    })
}

fn unmarshal_media_name(value: &str) -> Result<MediaDescription> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(Error::ErrSdpInvalidSyntax(format!("`m={value}`")));
    }

    let port = match fields[1].split_once('/') {
        Some((port, range)) => RangedPort {
            value: port
                .parse::<isize>()
                .map_err(|_| Error::ErrSdpInvalidValue(port.to_owned()))?,
            range: Some(
                range
                    .parse::<isize>()
                    .map_err(|_| Error::ErrSdpInvalidValue(range.to_owned()))?,
            ),
        },
        None => RangedPort {
            value: fields[1]
                .parse::<isize>()
                .map_err(|_| Error::ErrSdpInvalidValue(fields[1].to_owned()))?,
            range: None,
        },
    };

    Ok(MediaDescription {
        media_name: MediaName {
            media: fields[0].to_owned(),
            port,
            protos: fields[2].split('/').map(|p| p.to_owned()).collect(),
            formats: fields[3..].iter().map(|f| (*f).to_owned()).collect(),
        },
        ..Default::default()
    })
}
