use std::fmt::Display;
use std::io::Cursor;

use sdp::description::session::SessionDescription;
use serde::{Deserialize, Serialize};

use super::sdp_type::RTCSdpType;
use shared::error::{Error, Result};

/// RTCSessionDescription is used to expose local and remote session descriptions.
///
/// The JSON form is `{"type":"offer","sdp":"v=0..."}`. The parsed form is cached
/// and never serialized; descriptions received over JSON are parsed again when
/// they are applied.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,

    #[serde(skip)]
    pub(crate) parsed: Option<SessionDescription>,
}

impl Display for RTCSessionDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type: {}, sdp:\n{}",
            self.sdp_type,
            self.sdp.replace("\r\n", "\n")
        )
    }
}

impl PartialEq for RTCSessionDescription {
    fn eq(&self, other: &Self) -> bool {
        self.sdp_type == other.sdp_type && self.sdp == other.sdp
    }
}

impl RTCSessionDescription {
    fn parse(sdp_type: RTCSdpType, sdp: String) -> Result<RTCSessionDescription> {
        let mut desc = RTCSessionDescription {
            sdp_type,
            sdp,
            parsed: None,
        };
        desc.parsed = Some(desc.unmarshal()?);
        Ok(desc)
    }

    /// Given SDP representing an answer, wrap it in an RTCSessionDescription
    /// that can be given to an RTCPeerConnection.
    pub fn answer(sdp: String) -> Result<RTCSessionDescription> {
        Self::parse(RTCSdpType::Answer, sdp)
    }

    /// Given SDP representing an offer, wrap it in an RTCSessionDescription
    /// that can be given to an RTCPeerConnection.
    pub fn offer(sdp: String) -> Result<RTCSessionDescription> {
        Self::parse(RTCSdpType::Offer, sdp)
    }

    /// Given SDP representing a provisional answer, wrap it in an RTCSessionDescription
    /// that can be given to an RTCPeerConnection.
    pub fn pranswer(sdp: String) -> Result<RTCSessionDescription> {
        Self::parse(RTCSdpType::Pranswer, sdp)
    }

    pub fn rollback() -> RTCSessionDescription {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Rollback,
            sdp: String::new(),
            parsed: None,
        }
    }

    pub(crate) fn from_parsed(
        sdp_type: RTCSdpType,
        parsed: SessionDescription,
    ) -> RTCSessionDescription {
        RTCSessionDescription {
            sdp_type,
            sdp: parsed.marshal(),
            parsed: Some(parsed),
        }
    }

    /// unmarshal is a helper to deserialize the sdp
    pub fn unmarshal(&self) -> Result<SessionDescription> {
        if self.sdp.is_empty() {
            return Err(Error::ErrSessionDescriptionMissingSdp(
                self.sdp_type.to_string(),
            ));
        }
        let mut reader = Cursor::new(self.sdp.as_bytes());
        let parsed = SessionDescription::unmarshal(&mut reader)?;
        Ok(parsed)
    }

    /// Returns the cached parse, parsing the text when the description was
    /// built by hand or deserialized from JSON.
    pub(crate) fn ensure_parsed(&mut self) -> Result<&SessionDescription> {
        if self.parsed.is_none() {
            self.parsed = Some(self.unmarshal()?);
        }
        self.parsed
            .as_ref()
            .ok_or_else(|| Error::ErrSessionDescriptionMissingSdp(self.sdp_type.to_string()))
    }

    pub(crate) fn parsed(&self) -> Option<&SessionDescription> {
        self.parsed.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL_SDP: &str = "v=0\r\n\
o=- 4596489990601351948 2 IN IP4 0.0.0.0\r\n\
s=-\r\n\
t=0 0\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n";

    #[test]
    fn test_session_description_json() {
        let tests = vec![
            (RTCSdpType::Offer, r#"{"type":"offer","sdp":"sdp"}"#),
            (RTCSdpType::Pranswer, r#"{"type":"pranswer","sdp":"sdp"}"#),
            (RTCSdpType::Answer, r#"{"type":"answer","sdp":"sdp"}"#),
            (RTCSdpType::Rollback, r#"{"type":"rollback","sdp":"sdp"}"#),
            (
                RTCSdpType::Unspecified,
                r#"{"type":"Unspecified","sdp":"sdp"}"#,
            ),
        ];

        for (sdp_type, expected_string) in tests {
            let desc = RTCSessionDescription {
                sdp_type,
                sdp: "sdp".to_owned(),
                parsed: None,
            };
            let desc_data = serde_json::to_string(&desc).unwrap();
            assert_eq!(desc_data, expected_string);

            let sd = serde_json::from_str::<RTCSessionDescription>(&desc_data).unwrap();
            assert_eq!(sd, desc);
            assert!(sd.parsed.is_none());
        }
    }

    #[test]
    fn test_session_description_constructors_parse() -> Result<()> {
        let tests: Vec<(fn(String) -> Result<RTCSessionDescription>, RTCSdpType)> = vec![
            (RTCSessionDescription::offer, RTCSdpType::Offer),
            (RTCSessionDescription::answer, RTCSdpType::Answer),
            (RTCSessionDescription::pranswer, RTCSdpType::Pranswer),
        ];

        for (ctor, sdp_type) in tests {
            let desc = ctor(MINIMAL_SDP.to_owned())?;
            assert_eq!(desc.sdp_type, sdp_type);
            let parsed = desc.parsed().unwrap();
            assert_eq!(parsed.origin.session_id, 4596489990601351948);
            assert_eq!(parsed.media_descriptions.len(), 1);
            assert_eq!(parsed.media_descriptions[0].mid(), Some("0"));
        }

        Ok(())
    }

    #[test]
    fn test_session_description_rollback_has_no_sdp() {
        let mut desc = RTCSessionDescription::rollback();
        assert_eq!(desc.sdp_type, RTCSdpType::Rollback);
        assert_eq!(
            desc.ensure_parsed().err(),
            Some(Error::ErrSessionDescriptionMissingSdp("rollback".to_owned()))
        );
    }

    #[test]
    fn test_session_description_ensure_parsed_after_json() -> Result<()> {
        let json = serde_json::to_string(&RTCSessionDescription::offer(MINIMAL_SDP.to_owned())?)
            .map_err(|e| Error::Other(e.to_string()))?;
        let mut desc: RTCSessionDescription =
            serde_json::from_str(&json).map_err(|e| Error::Other(e.to_string()))?;
        assert!(desc.parsed().is_none());
        assert_eq!(desc.ensure_parsed()?.session_name, "-");
        assert!(desc.parsed().is_some());
        Ok(())
    }
}
