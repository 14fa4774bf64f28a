use log::{trace, warn};
use sdp::description::{
    ATTR_KEY_CONNECTION_SETUP, ATTR_KEY_GROUP, ATTR_KEY_ICE_OPTIONS, ATTR_KEY_MID,
    ATTR_KEY_MSID_SEMANTIC, ATTR_KEY_RTCP_MUX, ATTR_KEY_RTCP_RSIZE, SEMANTIC_TOKEN_BUNDLE,
    SEMANTIC_TOKEN_WEBRTC_MEDIA_STREAMS,
};
use sdp::util::ConnectionRole;
use sdp::{MEDIA_SECTION_APPLICATION, MediaDescription, SessionDescription};

use super::{
    add_codecs, add_redundancy_format, add_rtx_format, add_sctp_attributes, add_ssrcs,
    credentials_of, new_application_media, ApplicationSection, LocalSdpParams,
};
use crate::peer_connection::configuration::bundle_policy::RTCBundlePolicy;
use crate::peer_connection::transport::ice::IceCredentials;
use crate::rtp_transceiver::codec::{
    add_supported_feedback, PayloadTypePicker, CODEC_NAME_RED, CODEC_NAME_ULPFEC,
};
use crate::rtp_transceiver::{RTCFecType, RTCRtpTransceiver};

const ICE_OPTION_TRICKLE: &str = "trickle";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum OfferEntry {
    Transceiver(usize),
    Application,
}

/// generate_offer builds an offer from every live transceiver, followed by
/// the data channel section when `params.sctp` is set.
///
/// Sections already negotiated keep their position; new ones are appended
/// in array order. Transceivers and the data channel section get their mid
/// here, so applying the offer finds them again by mid.
pub(crate) fn generate_offer(
    params: &LocalSdpParams<'_>,
    transceivers: &mut [RTCRtpTransceiver],
    application: &mut ApplicationSection,
    media_counter: &mut u32,
    previous: Option<&SessionDescription>,
) -> SessionDescription {
    let mut entries: Vec<(Option<usize>, OfferEntry)> = transceivers
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.stopped)
        .map(|(i, t)| (t.mline, OfferEntry::Transceiver(i)))
        .collect();
    if params.sctp.is_some() {
        entries.push((application.mline, OfferEntry::Application));
    }
    entries.sort_by_key(|(mline, _)| mline.unwrap_or(usize::MAX));

    let bundled = params.bundle_policy != RTCBundlePolicy::None;
    let bundle_credentials = if bundled {
        Some(reuse_credentials(params, previous, 0).unwrap_or_else(IceCredentials::generate))
    } else {
        None
    };

    let mut d = SessionDescription::new_jsep_session_description(params.session_id);
    d.origin.session_version = params.session_version;

    let mut mids = vec![];
    for (prev_mline, entry) in entries {
        let credentials = match &bundle_credentials {
            Some(credentials) => credentials.clone(),
            None => prev_mline
                .and_then(|mline| reuse_credentials(params, previous, mline))
                .unwrap_or_else(IceCredentials::generate),
        };

        let media = match entry {
            OfferEntry::Transceiver(i) => {
                let taken = taken_mids(transceivers, application);
                let t = &mut transceivers[i];
                if t.codec_preferences.is_empty() {
                    warn!("no codecs available for {t}, skipping");
                    continue;
                }
                if t.mid.is_none() {
                    t.mid = Some(next_mid(&t.kind.to_string(), media_counter, &taken));
                }
                media_from_transceiver(params, t, &credentials)
            }
            OfferEntry::Application => {
                let Some(sctp) = &params.sctp else {
                    continue;
                };
                if application.mid.is_none() {
                    let taken = taken_mids(transceivers, application);
                    application.mid = Some(next_mid(MEDIA_SECTION_APPLICATION, media_counter, &taken));
                }
                let mid = application.mid.clone().unwrap_or_default();
                let media = new_application_media(9)
                    .with_value_attribute(
                        ATTR_KEY_CONNECTION_SETUP.to_owned(),
                        ConnectionRole::Actpass.to_string(),
                    )
                    .with_ice_credentials(credentials.ufrag.clone(), credentials.pwd.clone())
                    .with_value_attribute(ATTR_KEY_MID.to_owned(), mid);
                add_sctp_attributes(media, sctp).with_fingerprint(
                    params.fingerprint.algorithm.clone(),
                    params.fingerprint.value.clone(),
                )
            }
        };

        if let Some(mid) = media.mid() {
            mids.push(mid.to_owned());
        }
        d = d.with_media(media);
    }

    if bundled && !mids.is_empty() {
        d = d.with_value_attribute(
            ATTR_KEY_GROUP.to_owned(),
            format!("{SEMANTIC_TOKEN_BUNDLE} {}", mids.join(" ")),
        );
    }
    d = d
        .with_value_attribute(ATTR_KEY_ICE_OPTIONS.to_owned(), ICE_OPTION_TRICKLE.to_owned())
        .with_value_attribute(
            ATTR_KEY_MSID_SEMANTIC.to_owned(),
            format!("{SEMANTIC_TOKEN_WEBRTC_MEDIA_STREAMS} {}", params.name),
        );

    trace!("generated offer with {} media sections", d.media_descriptions.len());
    d
}

/// media_from_transceiver writes one offered media section
fn media_from_transceiver(
    params: &LocalSdpParams<'_>,
    t: &mut RTCRtpTransceiver,
    credentials: &IceCredentials,
) -> MediaDescription {
    let mut caps = t.codec_preferences.clone();
    add_supported_feedback(&mut caps, t.do_nack);

    let mut media = MediaDescription::new_jsep_media_description(t.kind.to_string(), vec![])
        .with_value_attribute(
            ATTR_KEY_CONNECTION_SETUP.to_owned(),
            ConnectionRole::Actpass.to_string(),
        )
        .with_ice_credentials(credentials.ufrag.clone(), credentials.pwd.clone());
    media.replace_direction(t.direction.to_sdp_direction());
    media = media
        .with_property_attribute(ATTR_KEY_RTCP_MUX.to_owned())
        .with_property_attribute(ATTR_KEY_RTCP_RSIZE.to_owned());
    media = add_codecs(media, &caps);

    // redundancy and retransmission formats protect the first codec
    let first = &caps[0];
    let clock_rate = first.clock_rate;
    let original_target_pt = first.payload_type;
    let mut target_pt = original_target_pt;
    let mut picker = PayloadTypePicker::new(caps.iter().map(|c| c.payload_type));

    if t.fec_type == RTCFecType::UlpRed {
        match (picker.pick(), picker.pick()) {
            (Some(red), Some(ulpfec)) => {
                media = add_redundancy_format(media, red, CODEC_NAME_RED, clock_rate);
                media = add_redundancy_format(media, ulpfec, CODEC_NAME_ULPFEC, clock_rate);
                target_pt = red;
            }
            _ => warn!("no payload type left for FEC on {t}"),
        }
    }

    if t.do_nack {
        let mut targets = vec![target_pt];
        if target_pt != original_target_pt {
            targets.push(original_target_pt);
        }
        for apt in targets {
            match picker.pick() {
                Some(pt) => media = add_rtx_format(media, pt, clock_rate, apt),
                None => warn!("no payload type left for RTX of {apt} on {t}"),
            }
        }
        t.rtx_ssrc_or_assign();
    } else {
        t.rtx_ssrc = None;
    }

    media = add_ssrcs(media, t, params.name);

    media
        .with_value_attribute(ATTR_KEY_MID.to_owned(), t.mid.clone().unwrap_or_default())
        .with_fingerprint(
            params.fingerprint.algorithm.clone(),
            params.fingerprint.value.clone(),
        )
}

/// reuse_credentials returns the credentials the section at `mline` carried
/// in the previous local description, unless ICE restarts
fn reuse_credentials(
    params: &LocalSdpParams<'_>,
    previous: Option<&SessionDescription>,
    mline: usize,
) -> Option<IceCredentials> {
    if params.ice_restart {
        return None;
    }
    previous?
        .media_descriptions
        .get(mline)
        .and_then(credentials_of)
}

fn taken_mids(transceivers: &[RTCRtpTransceiver], application: &ApplicationSection) -> Vec<String> {
    transceivers
        .iter()
        .filter_map(|t| t.mid.clone())
        .chain(application.mid.clone())
        .collect()
}

/// next_mid names a section after its media and a connection wide counter
fn next_mid(media: &str, counter: &mut u32, taken: &[String]) -> String {
    loop {
        let mid = format!("{media}{counter}");
        *counter += 1;
        if !taken.contains(&mid) {
            return mid;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::peer_connection::transport::dtls::fingerprint::RTCDtlsFingerprint;
    use crate::rtp_transceiver::codec::{RTCRtpCodec, RtpCodecKind, MIME_TYPE_OPUS, MIME_TYPE_VP8};
    use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
    use crate::rtp_transceiver::RTCRtpTransceiverInit;
    use crate::peer_connection::sdp::SctpSdpParams;

    fn fingerprint() -> RTCDtlsFingerprint {
        RTCDtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: "AA:BB".to_owned(),
        }
    }

    fn params(fingerprint: &RTCDtlsFingerprint, bundle_policy: RTCBundlePolicy) -> LocalSdpParams<'_> {
        LocalSdpParams {
            name: "webrtc",
            fingerprint,
            bundle_policy,
            session_id: 42,
            session_version: 1,
            ice_restart: false,
            sctp: None,
        }
    }

    fn audio(id: usize) -> RTCRtpTransceiver {
        RTCRtpTransceiver::new(
            id,
            RtpCodecKind::Audio,
            RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendrecv,
                codecs: vec![RTCRtpCodec::new(111, MIME_TYPE_OPUS, 48000, 2)],
                ..Default::default()
            },
        )
    }

    fn keys(media: &MediaDescription) -> Vec<&str> {
        media.attributes.iter().map(|a| a.key.as_str()).collect()
    }

    #[test]
    fn test_generate_offer_attribute_order() {
        let fp = fingerprint();
        let mut transceivers = vec![audio(0)];
        transceivers[0].ssrc = 1234;
        let mut counter = 0;

        let d = generate_offer(
            &params(&fp, RTCBundlePolicy::None),
            &mut transceivers,
            &mut ApplicationSection::default(),
            &mut counter,
            None,
        );

        assert_eq!(d.origin.session_id, 42);
        assert_eq!(d.origin.session_version, 1);
        assert_eq!(d.attribute(ATTR_KEY_ICE_OPTIONS).map(|s| s.as_str()), Some("trickle"));
        assert_eq!(d.attribute(ATTR_KEY_MSID_SEMANTIC).map(|s| s.as_str()), Some("WMS webrtc"));
        assert!(d.bundle_group().is_none());
        assert_eq!(d.media_descriptions.len(), 1);

        let media = &d.media_descriptions[0];
        assert_eq!(
            media.media_name.to_string(),
            "audio 9 UDP/TLS/RTP/SAVPF 111"
        );
        assert_eq!(
            keys(media),
            vec![
                "setup",
                "ice-ufrag",
                "ice-pwd",
                "sendrecv",
                "rtcp-mux",
                "rtcp-rsize",
                "rtpmap",
                "rtcp-fb",
                "ssrc",
                "ssrc",
                "mid",
                "fingerprint",
            ]
        );
        assert_eq!(media.mid(), Some("audio0"));
        assert_eq!(transceivers[0].mid(), Some("audio0"));
        assert_eq!(counter, 1);
    }

    #[test]
    fn test_generate_offer_fec_and_rtx() {
        let fp = fingerprint();
        let mut video = RTCRtpTransceiver::new(
            0,
            RtpCodecKind::Video,
            RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
                codecs: vec![RTCRtpCodec::new(96, MIME_TYPE_VP8, 90000, 0)],
                do_nack: true,
                fec_type: RTCFecType::UlpRed,
                fec_percentage: 10,
            },
        );
        video.ssrc = 1111;
        let mut transceivers = vec![video];

        let d = generate_offer(
            &params(&fp, RTCBundlePolicy::None),
            &mut transceivers,
            &mut ApplicationSection::default(),
            &mut 0,
            None,
        );
        let media = &d.media_descriptions[0];
        assert_eq!(media.media_name.formats, vec!["96", "97", "98", "99", "100"]);

        let rtpmaps: Vec<&str> = media.attributes_with_key("rtpmap").collect();
        assert_eq!(
            rtpmaps,
            vec![
                "96 VP8/90000",
                "97 red/90000",
                "98 ulpfec/90000",
                "99 rtx/90000",
                "100 rtx/90000"
            ]
        );
        let fmtps: Vec<&str> = media.attributes_with_key("fmtp").collect();
        assert_eq!(fmtps, vec!["99 apt=97", "100 apt=96"]);

        let rtx_ssrc = transceivers[0].rtx_ssrc().unwrap();
        let groups: Vec<&str> = media.attributes_with_key("ssrc-group").collect();
        assert_eq!(groups, vec![format!("FID 1111 {rtx_ssrc}")]);
        assert_eq!(media.direction(), sdp::direction::Direction::SendOnly);
    }

    #[test]
    fn test_generate_offer_bundle_and_application() {
        let fp = fingerprint();
        let mut transceivers = vec![audio(0), audio(1)];
        transceivers[1].stopped = true;
        let mut empty = audio(2);
        empty.codec_preferences.clear();
        transceivers.push(empty);

        let mut p = params(&fp, RTCBundlePolicy::MaxBundle);
        p.sctp = Some(SctpSdpParams {
            port: 5000,
            max_message_size: 65536,
        });
        let mut application = ApplicationSection::default();

        let d = generate_offer(&p, &mut transceivers, &mut application, &mut 0, None);

        assert_eq!(d.media_descriptions.len(), 2);
        assert_eq!(d.bundle_group(), Some(vec!["audio0", "application1"]));
        assert_eq!(application.mid.as_deref(), Some("application1"));
        assert_eq!(transceivers[1].mid(), None);
        assert_eq!(transceivers[2].mid(), None);

        let creds: Vec<_> = d
            .media_descriptions
            .iter()
            .map(|m| m.ice_credentials())
            .collect();
        assert_eq!(creds[0], creds[1]);

        let app = &d.media_descriptions[1];
        assert_eq!(app.attribute("sctp-port"), Some(Some("5000")));
        assert_eq!(app.attribute("fingerprint"), Some(Some("sha-256 AA:BB")));
    }

    #[test]
    fn test_generate_offer_keeps_negotiated_order_and_credentials() {
        let fp = fingerprint();
        let mut transceivers = vec![audio(0)];
        let mut application = ApplicationSection::default();
        let mut p = params(&fp, RTCBundlePolicy::None);
        p.sctp = Some(SctpSdpParams {
            port: 5000,
            max_message_size: 65536,
        });
        let mut counter = 0;

        let first = generate_offer(&p, &mut transceivers, &mut application, &mut counter, None);
        transceivers[0].mline = Some(0);
        application.mline = Some(1);

        transceivers.insert(0, audio(1));
        let second = generate_offer(&p, &mut transceivers, &mut application, &mut counter, Some(&first));

        let mids: Vec<_> = second.media_descriptions.iter().map(|m| m.mid()).collect();
        assert_eq!(mids, vec![Some("audio0"), Some("application1"), Some("audio2")]);
        assert_eq!(
            second.media_descriptions[0].ice_credentials(),
            first.media_descriptions[0].ice_credentials()
        );

        p.ice_restart = true;
        let third = generate_offer(&p, &mut transceivers, &mut application, &mut counter, Some(&second));
        assert_ne!(
            third.media_descriptions[0].ice_credentials(),
            second.media_descriptions[0].ice_credentials()
        );
    }

    #[test]
    fn test_next_mid_skips_taken() {
        let mut counter = 0;
        let taken = vec!["audio0".to_owned(), "audio1".to_owned()];
        assert_eq!(next_mid("audio", &mut counter, &taken), "audio2");
        assert_eq!(counter, 3);
    }
}
