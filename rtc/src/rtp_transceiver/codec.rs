use std::fmt;

use sdp::util::Codec;
use serde::{Deserialize, Serialize};

use crate::peer_connection::configuration::UNSPECIFIED_STR;

/// PayloadType identifies the format of the RTP payload
pub type PayloadType = u8;

/// SSRC identifies one RTP stream
pub type SSRC = u32;

/// Codec kind identifying the media type.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RtpCodecKind {
    #[default]
    Unspecified = 0,

    #[serde(rename = "audio")]
    Audio = 1,

    #[serde(rename = "video")]
    Video = 2,
}

const RTP_CODEC_KIND_AUDIO_STR: &str = "audio";
const RTP_CODEC_KIND_VIDEO_STR: &str = "video";

impl From<&str> for RtpCodecKind {
    fn from(raw: &str) -> Self {
        match raw {
            RTP_CODEC_KIND_AUDIO_STR => RtpCodecKind::Audio,
            RTP_CODEC_KIND_VIDEO_STR => RtpCodecKind::Video,
            _ => RtpCodecKind::Unspecified,
        }
    }
}

impl fmt::Display for RtpCodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RtpCodecKind::Audio => RTP_CODEC_KIND_AUDIO_STR,
            RtpCodecKind::Video => RTP_CODEC_KIND_VIDEO_STR,
            RtpCodecKind::Unspecified => UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

pub const MIME_TYPE_OPUS: &str = "audio/opus";
pub const MIME_TYPE_PCMU: &str = "audio/PCMU";
pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_H264: &str = "video/H264";

pub(crate) const CODEC_NAME_RED: &str = "red";
pub(crate) const CODEC_NAME_ULPFEC: &str = "ulpfec";
pub(crate) const CODEC_NAME_RTX: &str = "rtx";

/// Transport-wide congestion control feedback type
pub const TYPE_RTCP_FB_TRANSPORT_CC: &str = "transport-cc";

/// Google REMB (Receiver Estimated Maximum Bitrate) feedback type
pub const TYPE_RTCP_FB_GOOG_REMB: &str = "goog-remb";

/// Acknowledgment feedback type
pub const TYPE_RTCP_FB_ACK: &str = "ack";

/// Codec Control Message feedback type
pub const TYPE_RTCP_FB_CCM: &str = "ccm";

/// Negative Acknowledgment feedback type
pub const TYPE_RTCP_FB_NACK: &str = "nack";

/// RTCPFeedback signals support for one RTCP feedback mechanism, written
/// as `a=rtcp-fb:<pt> <type> [<parameter>]`.
///
/// `type="nack" parameter="pli"` stands for Picture Loss Indication.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCPFeedback {
    /// One of `ack`, `ccm`, `nack`, `goog-remb`, `transport-cc`
    pub typ: String,

    pub parameter: String,
}

impl RTCPFeedback {
    pub fn new(typ: &str, parameter: &str) -> Self {
        RTCPFeedback {
            typ: typ.to_owned(),
            parameter: parameter.to_owned(),
        }
    }

    pub(crate) fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once(' ') {
            Some((typ, parameter)) => RTCPFeedback::new(typ, parameter.trim()),
            None => RTCPFeedback::new(raw, ""),
        }
    }
}

impl fmt::Display for RTCPFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parameter.is_empty() {
            write!(f, "{}", self.typ)
        } else {
            write!(f, "{} {}", self.typ, self.parameter)
        }
    }
}

/// RTCRtpCodec describes one codec of a media section.
///
/// A `payload_type` of zero means the codec has no payload type of its own
/// yet; it is taken from the offer or assigned while building one.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RTCRtpCodec {
    pub payload_type: PayloadType,
    /// MIME type of the codec, e.g. `video/VP8`
    pub mime_type: String,
    pub clock_rate: u32,
    /// Number of audio channels, 0 for video
    pub channels: u16,
    pub sdp_fmtp_line: String,
    pub rtcp_feedback: Vec<RTCPFeedback>,
}

impl RTCRtpCodec {
    pub fn new(payload_type: PayloadType, mime_type: &str, clock_rate: u32, channels: u16) -> Self {
        RTCRtpCodec {
            payload_type,
            mime_type: mime_type.to_owned(),
            clock_rate,
            channels,
            ..Default::default()
        }
    }

    pub(crate) fn from_sdp(kind: RtpCodecKind, codec: &Codec) -> Self {
        RTCRtpCodec {
            payload_type: codec.payload_type,
            mime_type: format!("{kind}/{}", codec.name),
            clock_rate: codec.clock_rate,
            channels: codec.encoding_parameters.parse::<u16>().unwrap_or_default(),
            sdp_fmtp_line: codec.fmtp.clone(),
            rtcp_feedback: codec
                .rtcp_feedback
                .iter()
                .map(|fb| RTCPFeedback::parse(fb))
                .collect(),
        }
    }

    /// name is the encoding name of the rtpmap line
    pub fn name(&self) -> &str {
        match self.mime_type.split_once('/') {
            Some((_, name)) => name,
            None => &self.mime_type,
        }
    }

    pub fn kind(&self) -> RtpCodecKind {
        match self.mime_type.split_once('/') {
            Some((kind, _)) => RtpCodecKind::from(kind.to_lowercase().as_str()),
            None => RtpCodecKind::Unspecified,
        }
    }

    pub(crate) fn is_red(&self) -> bool {
        self.name().eq_ignore_ascii_case(CODEC_NAME_RED)
    }

    pub(crate) fn is_ulpfec(&self) -> bool {
        self.name().eq_ignore_ascii_case(CODEC_NAME_ULPFEC)
    }

    pub(crate) fn is_rtx(&self) -> bool {
        self.name().eq_ignore_ascii_case(CODEC_NAME_RTX)
    }

    /// is_media is false for the redundancy and retransmission formats
    pub(crate) fn is_media(&self) -> bool {
        !(self.is_red() || self.is_ulpfec() || self.is_rtx())
    }

    /// apt returns the associated payload type of an RTX format
    pub(crate) fn apt(&self) -> Option<PayloadType> {
        self.sdp_fmtp_line
            .split(';')
            .filter_map(|p| p.trim().strip_prefix("apt="))
            .find_map(|v| v.parse::<PayloadType>().ok())
    }

    /// matches compares the encoding, ignoring payload type, fmtp and
    /// feedback. A channel count of zero matches any.
    pub(crate) fn matches(&self, other: &RTCRtpCodec) -> bool {
        self.name().eq_ignore_ascii_case(other.name())
            && self.clock_rate == other.clock_rate
            && (self.channels == other.channels || self.channels == 0 || other.channels == 0)
    }

    pub(crate) fn has_feedback(&self, typ: &str, parameter: &str) -> bool {
        self.rtcp_feedback
            .iter()
            .any(|fb| fb.typ == typ && fb.parameter == parameter)
    }

    fn add_feedback(&mut self, typ: &str, parameter: &str) {
        if !self.has_feedback(typ, parameter) {
            self.rtcp_feedback.push(RTCPFeedback::new(typ, parameter));
        }
    }

    fn remove_feedback(&mut self, typ: &str) {
        self.rtcp_feedback.retain(|fb| fb.typ != typ || !fb.parameter.is_empty());
    }
}

/// Computes the intersection of two RTCP feedback lists.
///
/// Returns feedback mechanisms that are supported by both lists,
/// matching on both type and parameter fields.
pub(crate) fn rtcp_feedback_intersection(
    a: &[RTCPFeedback],
    b: &[RTCPFeedback],
) -> Vec<RTCPFeedback> {
    let mut out = vec![];
    for a_feedback in a {
        for b_feedback in b {
            if a_feedback.typ == b_feedback.typ && a_feedback.parameter == b_feedback.parameter {
                out.push(a_feedback.clone());
                break;
            }
        }
    }

    out
}

/// add_supported_feedback annotates every codec with the feedback the
/// engine handles: generic NACK when `do_nack` is set, and PLI always.
pub(crate) fn add_supported_feedback(codecs: &mut [RTCRtpCodec], do_nack: bool) {
    for codec in codecs.iter_mut().filter(|c| c.is_media()) {
        if do_nack {
            codec.add_feedback(TYPE_RTCP_FB_NACK, "");
        }
        codec.add_feedback(TYPE_RTCP_FB_NACK, "pli");
    }
}

/// strip_nack removes generic NACK feedback, keeping `nack pli`
pub(crate) fn strip_nack(codecs: &mut [RTCRtpCodec]) {
    for codec in codecs {
        codec.remove_feedback(TYPE_RTCP_FB_NACK);
    }
}

/// codecs_intersection answers `offered` with the local `preferences`.
///
/// The result follows the local preference order while keeping the
/// payload type and fmtp line the remote side offered. Redundancy and
/// retransmission formats are left out; they are negotiated separately.
pub(crate) fn codecs_intersection(
    preferences: &[RTCRtpCodec],
    offered: &[RTCRtpCodec],
) -> Vec<RTCRtpCodec> {
    let mut out: Vec<RTCRtpCodec> = vec![];
    for local in preferences.iter().filter(|c| c.is_media()) {
        let found = offered.iter().find(|remote| {
            remote.is_media()
                && local.matches(remote)
                && !out.iter().any(|c| c.payload_type == remote.payload_type)
        });
        if let Some(remote) = found {
            let mut codec = remote.clone();
            codec.rtcp_feedback =
                rtcp_feedback_intersection(&remote.rtcp_feedback, &local.rtcp_feedback);
            out.push(codec);
        }
    }
    out
}

const DYNAMIC_PAYLOAD_TYPE_MIN: PayloadType = 96;
const DYNAMIC_PAYLOAD_TYPE_MAX: PayloadType = 127;

/// PayloadTypePicker hands out unused dynamic payload types.
#[derive(Default, Debug, Clone)]
pub(crate) struct PayloadTypePicker {
    reserved: Vec<PayloadType>,
}

impl PayloadTypePicker {
    pub(crate) fn new(reserved: impl IntoIterator<Item = PayloadType>) -> Self {
        PayloadTypePicker {
            reserved: reserved.into_iter().collect(),
        }
    }

    /// pick scans 96..=127 for the first value not reserved yet and
    /// reserves it
    pub(crate) fn pick(&mut self) -> Option<PayloadType> {
        let pt = (DYNAMIC_PAYLOAD_TYPE_MIN..=DYNAMIC_PAYLOAD_TYPE_MAX)
            .find(|pt| !self.reserved.contains(pt))?;
        self.reserved.push(pt);
        Some(pt)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn opus() -> RTCRtpCodec {
        RTCRtpCodec::new(111, MIME_TYPE_OPUS, 48000, 2)
    }

    fn vp8(pt: PayloadType) -> RTCRtpCodec {
        RTCRtpCodec::new(pt, MIME_TYPE_VP8, 90000, 0)
    }

    #[test]
    fn test_rtp_codec_kind_string() {
        let tests = vec![
            (RtpCodecKind::Unspecified, "Unspecified"),
            (RtpCodecKind::Audio, "audio"),
            (RtpCodecKind::Video, "video"),
        ];

        for (kind, expected_string) in tests {
            assert_eq!(kind.to_string(), expected_string);
            assert_eq!(RtpCodecKind::from(expected_string), kind);
        }
    }

    #[test]
    fn test_rtcp_feedback_parse() {
        let tests = vec![
            ("nack", TYPE_RTCP_FB_NACK, ""),
            ("nack pli", TYPE_RTCP_FB_NACK, "pli"),
            (" ccm fir ", TYPE_RTCP_FB_CCM, "fir"),
            ("goog-remb", TYPE_RTCP_FB_GOOG_REMB, ""),
        ];

        for (raw, typ, parameter) in tests {
            let fb = RTCPFeedback::parse(raw);
            assert_eq!(fb, RTCPFeedback::new(typ, parameter), "{raw}");
            assert_eq!(fb.to_string(), raw.trim());
        }
    }

    #[test]
    fn test_rtp_codec_from_sdp() {
        let codec = Codec {
            payload_type: 111,
            name: "opus".to_owned(),
            clock_rate: 48000,
            encoding_parameters: "2".to_owned(),
            fmtp: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec!["transport-cc".to_owned()],
        };

        let c = RTCRtpCodec::from_sdp(RtpCodecKind::Audio, &codec);
        assert_eq!(c.mime_type, MIME_TYPE_OPUS);
        assert_eq!(c.name(), "opus");
        assert_eq!(c.kind(), RtpCodecKind::Audio);
        assert_eq!(c.channels, 2);
        assert_eq!(c.rtcp_feedback, vec![RTCPFeedback::new("transport-cc", "")]);
    }

    #[test]
    fn test_rtp_codec_apt() {
        let tests = vec![
            ("apt=96", Some(96)),
            ("rtx-time=3000;apt=100", Some(100)),
            ("apt=x", None),
            ("", None),
        ];

        for (fmtp, expected) in tests {
            let mut rtx = RTCRtpCodec::new(97, "video/rtx", 90000, 0);
            rtx.sdp_fmtp_line = fmtp.to_owned();
            assert!(rtx.is_rtx());
            assert!(!rtx.is_media());
            assert_eq!(rtx.apt(), expected, "{fmtp}");
        }
    }

    #[test]
    fn test_rtp_codec_matches() {
        let tests = vec![
            (opus(), RTCRtpCodec::new(100, "audio/OPUS", 48000, 2), true),
            (opus(), RTCRtpCodec::new(111, MIME_TYPE_OPUS, 48000, 0), true),
            (opus(), RTCRtpCodec::new(111, MIME_TYPE_OPUS, 16000, 2), false),
            (opus(), RTCRtpCodec::new(111, MIME_TYPE_OPUS, 48000, 1), false),
            (vp8(96), vp8(120), true),
            (vp8(96), RTCRtpCodec::new(96, MIME_TYPE_H264, 90000, 0), false),
        ];

        for (a, b, expected) in tests {
            assert_eq!(a.matches(&b), expected, "{a:?} {b:?}");
        }
    }

    #[test]
    fn test_codecs_intersection_keeps_offer_payload_types() {
        let h264 = RTCRtpCodec::new(102, MIME_TYPE_H264, 90000, 0);
        let mut offered_vp8 = vp8(120);
        offered_vp8.rtcp_feedback = vec![
            RTCPFeedback::new(TYPE_RTCP_FB_NACK, ""),
            RTCPFeedback::new(TYPE_RTCP_FB_GOOG_REMB, ""),
        ];
        let mut rtx = RTCRtpCodec::new(121, "video/rtx", 90000, 0);
        rtx.sdp_fmtp_line = "apt=120".to_owned();
        let offered = vec![offered_vp8, rtx, h264.clone()];

        let mut preferences = vec![h264.clone(), vp8(96)];
        add_supported_feedback(&mut preferences, true);

        let answer = codecs_intersection(&preferences, &offered);
        assert_eq!(answer.len(), 2);
        assert_eq!(answer[0].payload_type, 102);
        assert_eq!(answer[1].payload_type, 120);
        assert_eq!(
            answer[1].rtcp_feedback,
            vec![RTCPFeedback::new(TYPE_RTCP_FB_NACK, "")]
        );

        assert!(codecs_intersection(&[], &offered).is_empty());
        assert!(codecs_intersection(&[opus()], &offered).is_empty());
    }

    #[test]
    fn test_supported_feedback() {
        let mut codecs = vec![vp8(96)];
        add_supported_feedback(&mut codecs, true);
        assert!(codecs[0].has_feedback(TYPE_RTCP_FB_NACK, ""));
        assert!(codecs[0].has_feedback(TYPE_RTCP_FB_NACK, "pli"));

        strip_nack(&mut codecs);
        assert!(!codecs[0].has_feedback(TYPE_RTCP_FB_NACK, ""));
        assert!(codecs[0].has_feedback(TYPE_RTCP_FB_NACK, "pli"));

        let mut codecs = vec![vp8(96)];
        add_supported_feedback(&mut codecs, false);
        assert_eq!(codecs[0].rtcp_feedback.len(), 1);
    }

    #[test]
    fn test_payload_type_picker() {
        let mut picker = PayloadTypePicker::new([96, 98]);
        assert_eq!(picker.pick(), Some(97));
        assert_eq!(picker.pick(), Some(99));

        let mut full = PayloadTypePicker::new(96..=127);
        assert_eq!(full.pick(), None);
    }
}
