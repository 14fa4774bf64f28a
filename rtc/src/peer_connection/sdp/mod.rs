//! SDP offer/answer engine.
//!
//! Offers and answers are built from the transceivers and data channels of a
//! peer connection. Attributes of a media section are written in JSEP order:
//! `a=setup` first, then the ICE credentials, and `a=fingerprint` last.

pub mod sdp_type;
pub mod session_description;

pub(crate) mod answer;
pub(crate) mod negotiation;
pub(crate) mod offer;
pub(crate) mod validation;

use sdp::description::{
    ATTR_KEY_FMTP, ATTR_KEY_MAX_MESSAGE_SIZE, ATTR_KEY_RTCP_FB, ATTR_KEY_RTPMAP,
    ATTR_KEY_SCTP_PORT, ATTR_KEY_SSRC, ATTR_KEY_SSRC_GROUP,
};
use sdp::{MEDIA_SECTION_APPLICATION, MediaDescription};

use crate::peer_connection::configuration::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::transport::dtls::fingerprint::RTCDtlsFingerprint;
use crate::peer_connection::transport::ice::IceCredentials;
use crate::rtp_transceiver::RTCRtpTransceiver;
use crate::rtp_transceiver::codec::{PayloadType, RTCRtpCodec};

pub(crate) const SCTP_FORMAT_WEBRTC_DATACHANNEL: &str = "webrtc-datachannel";

/// Parameters of the `m=application` section carrying data channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SctpSdpParams {
    pub(crate) port: u16,
    pub(crate) max_message_size: usize,
}

/// Association of the data channel section, the counterpart of a
/// transceiver's mid and mline
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApplicationSection {
    pub(crate) mid: Option<String>,
    pub(crate) mline: Option<usize>,
}

/// What the local side contributes to every description it builds
#[derive(Debug, Clone)]
pub(crate) struct LocalSdpParams<'a> {
    /// Name of the connection, used for `msid-semantic` and the CNAME
    pub(crate) name: &'a str,
    pub(crate) fingerprint: &'a RTCDtlsFingerprint,
    pub(crate) bundle_policy: RTCBundlePolicy,
    pub(crate) session_id: u64,
    pub(crate) session_version: u64,
    pub(crate) ice_restart: bool,
    /// Present when data channels can be negotiated
    pub(crate) sctp: Option<SctpSdpParams>,
}

/// is_application tells whether a section carries data channels
pub(crate) fn is_application(media: &MediaDescription) -> bool {
    media.media_name.media == MEDIA_SECTION_APPLICATION
}

/// add_codecs writes the rtpmap, fmtp and rtcp-fb lines of every codec
pub(crate) fn add_codecs(mut media: MediaDescription, codecs: &[RTCRtpCodec]) -> MediaDescription {
    for codec in codecs {
        media = media.with_codec(
            codec.payload_type,
            codec.name().to_owned(),
            codec.clock_rate,
            codec.channels,
            codec.sdp_fmtp_line.clone(),
        );
        for fb in &codec.rtcp_feedback {
            media = media.with_value_attribute(
                ATTR_KEY_RTCP_FB.to_owned(),
                format!("{} {fb}", codec.payload_type),
            );
        }
    }
    media
}

/// add_redundancy_format writes a RED or ULPFEC format
pub(crate) fn add_redundancy_format(
    media: MediaDescription,
    pt: PayloadType,
    name: &str,
    clock_rate: u32,
) -> MediaDescription {
    media
        .with_format(pt.to_string())
        .with_value_attribute(ATTR_KEY_RTPMAP.to_owned(), format!("{pt} {name}/{clock_rate}"))
}

/// add_rtx_format writes an RTX format retransmitting `apt`
pub(crate) fn add_rtx_format(
    media: MediaDescription,
    pt: PayloadType,
    clock_rate: u32,
    apt: PayloadType,
) -> MediaDescription {
    media
        .with_format(pt.to_string())
        .with_value_attribute(ATTR_KEY_RTPMAP.to_owned(), format!("{pt} rtx/{clock_rate}"))
        .with_value_attribute(ATTR_KEY_FMTP.to_owned(), format!("{pt} apt={apt}"))
}

/// add_ssrcs announces the sender of `transceiver`: the retransmission
/// group first, then msid and cname for the media and the RTX ssrc.
pub(crate) fn add_ssrcs(
    mut media: MediaDescription,
    transceiver: &RTCRtpTransceiver,
    cname: &str,
) -> MediaDescription {
    if let Some(rtx_ssrc) = transceiver.rtx_ssrc {
        media = media.with_value_attribute(
            ATTR_KEY_SSRC_GROUP.to_owned(),
            format!("FID {} {rtx_ssrc}", transceiver.ssrc),
        );
    }

    media = media.with_media_source(
        transceiver.ssrc,
        cname.to_owned(),
        cname.to_owned(),
        transceiver.name(),
    );

    if let Some(rtx_ssrc) = transceiver.rtx_ssrc {
        media = media.with_value_attribute(
            ATTR_KEY_SSRC.to_owned(),
            format!("{rtx_ssrc} msid:{cname} {}", transceiver.name()),
        );
        media = media.with_value_attribute(ATTR_KEY_SSRC.to_owned(), format!("{rtx_ssrc} cname:{cname}"));
    }
    media
}

/// new_application_media starts an `m=application` section
pub(crate) fn new_application_media(port: u16) -> MediaDescription {
    let mut media = MediaDescription::new_jsep_media_description(
        MEDIA_SECTION_APPLICATION.to_owned(),
        vec![],
    );
    media.media_name.port.value = port as isize;
    media.media_name.protos = vec!["UDP".to_owned(), "DTLS".to_owned(), "SCTP".to_owned()];
    media.media_name.formats = vec![SCTP_FORMAT_WEBRTC_DATACHANNEL.to_owned()];
    media
}

/// add_sctp_attributes writes the SCTP port and the largest message the
/// local side accepts
pub(crate) fn add_sctp_attributes(media: MediaDescription, sctp: &SctpSdpParams) -> MediaDescription {
    media
        .with_value_attribute(ATTR_KEY_SCTP_PORT.to_owned(), sctp.port.to_string())
        .with_value_attribute(
            ATTR_KEY_MAX_MESSAGE_SIZE.to_owned(),
            sctp.max_message_size.to_string(),
        )
}

/// sctp_port_of reads `a=sctp-port`, falling back to 5000
pub(crate) fn sctp_port_of(media: &MediaDescription) -> u16 {
    media
        .attribute(ATTR_KEY_SCTP_PORT)
        .flatten()
        .and_then(|v| v.trim().parse::<u16>().ok())
        .unwrap_or(crate::peer_connection::configuration::DEFAULT_SCTP_PORT)
}

/// max_message_size_of reads `a=max-message-size`; absent means 64 KiB
pub(crate) fn max_message_size_of(media: &MediaDescription) -> usize {
    media
        .attribute(ATTR_KEY_MAX_MESSAGE_SIZE)
        .flatten()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(crate::peer_connection::configuration::DEFAULT_MAX_MESSAGE_SIZE)
}

/// credentials_of reads the ufrag/pwd pair of a section
pub(crate) fn credentials_of(media: &MediaDescription) -> Option<IceCredentials> {
    match media.ice_credentials() {
        (Some(ufrag), Some(pwd)) => Some(IceCredentials {
            ufrag: ufrag.to_owned(),
            pwd: pwd.to_owned(),
        }),
        _ => None,
    }
}
