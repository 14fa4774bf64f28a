use log::{debug, trace, warn};
use sdp::description::{
    ATTR_KEY_CONNECTION_SETUP, ATTR_KEY_GROUP, ATTR_KEY_ICE_OPTIONS, ATTR_KEY_MID,
    ATTR_KEY_MSID_SEMANTIC, ATTR_KEY_RTCP_MUX, ATTR_KEY_RTCP_RSIZE, SEMANTIC_TOKEN_BUNDLE,
    SEMANTIC_TOKEN_WEBRTC_MEDIA_STREAMS,
};
use sdp::util::ConnectionRole;
use sdp::{MediaDescription, SessionDescription};

use super::negotiation::{intersect_answer_directions, intersect_dtls_setup};
use super::{
    add_codecs, add_redundancy_format, add_rtx_format, add_sctp_attributes, add_ssrcs,
    credentials_of, is_application, new_application_media, ApplicationSection, LocalSdpParams,
};
use crate::peer_connection::transport::ice::IceCredentials;
use crate::rtp_transceiver::codec::{
    add_supported_feedback, codecs_intersection, strip_nack, RTCRtpCodec, RtpCodecKind,
    TYPE_RTCP_FB_NACK,
};
use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{find_by_mid, RTCFecType, RTCRtpTransceiver, RTCRtpTransceiverInit};

/// generate_answer answers every section of `offer`.
///
/// Each media section is matched with the transceiver already bound to its
/// mid, else the first free transceiver of the same kind sharing a codec,
/// else a new `recvonly` transceiver appended to `transceivers`. Sections
/// that cannot be answered are echoed with port zero.
pub(crate) fn generate_answer(
    params: &LocalSdpParams<'_>,
    offer: &SessionDescription,
    transceivers: &mut Vec<RTCRtpTransceiver>,
    application: &mut ApplicationSection,
    previous: Option<&SessionDescription>,
) -> SessionDescription {
    let offer_bundle: Option<Vec<String>> = offer
        .bundle_group()
        .map(|group| group.into_iter().map(str::to_owned).collect());
    let bundle_credentials = offer_bundle.as_ref().map(|_| {
        reuse_credentials(params, previous, 0).unwrap_or_else(IceCredentials::generate)
    });
    let session_setup = offer
        .attribute(ATTR_KEY_CONNECTION_SETUP)
        .map(|v| ConnectionRole::from(v.as_str()))
        .unwrap_or(ConnectionRole::Unspecified);

    let mut d = SessionDescription::new_jsep_session_description(offer.origin.session_id);
    d.origin.session_version = params.session_version;

    let mut accepted = vec![];
    for (i, offer_media) in offer.media_descriptions.iter().enumerate() {
        if offer_media.is_rejected() {
            d = d.with_media(reject(offer_media));
            continue;
        }
        let Some(mid) = offer_media.mid() else {
            d = d.with_media(reject(offer_media));
            continue;
        };

        let in_bundle = offer_bundle
            .as_ref()
            .is_some_and(|group| group.iter().any(|m| m == mid));
        let credentials = match (&bundle_credentials, in_bundle) {
            (Some(credentials), true) => credentials.clone(),
            _ => reuse_credentials(params, previous, i).unwrap_or_else(IceCredentials::generate),
        };

        let mut offer_setup = offer_media.connection_role();
        if offer_setup == ConnectionRole::Unspecified {
            offer_setup = session_setup;
        }
        let setup = intersect_dtls_setup(offer_setup);
        if setup == ConnectionRole::Unspecified {
            warn!("cannot answer setup {offer_setup} of mline {i}, rejecting");
            d = d.with_media(reject(offer_media));
            continue;
        }

        let answered = if is_application(offer_media) {
            answer_application(params, offer_media, mid, setup, &credentials).map(|media| {
                application.mid = Some(mid.to_owned());
                application.mline = Some(i);
                media
            })
        } else {
            answer_media(
                params,
                offer_media,
                i,
                mid,
                setup,
                &credentials,
                transceivers,
            )
        };

        match answered {
            Some(media) => {
                accepted.push(mid.to_owned());
                d = d.with_media(media);
            }
            None => d = d.with_media(reject(offer_media)),
        }
    }

    if let Some(group) = &offer_bundle {
        let mids: Vec<&str> = group
            .iter()
            .filter(|m| accepted.contains(m))
            .map(|m| m.as_str())
            .collect();
        if !mids.is_empty() {
            d = d.with_value_attribute(
                ATTR_KEY_GROUP.to_owned(),
                format!("{SEMANTIC_TOKEN_BUNDLE} {}", mids.join(" ")),
            );
        }
    }
    if let Some(ice_options) = offer.attribute(ATTR_KEY_ICE_OPTIONS) {
        d = d.with_value_attribute(ATTR_KEY_ICE_OPTIONS.to_owned(), ice_options.clone());
    }
    d = d.with_value_attribute(
        ATTR_KEY_MSID_SEMANTIC.to_owned(),
        format!("{SEMANTIC_TOKEN_WEBRTC_MEDIA_STREAMS} {}", params.name),
    );

    trace!(
        "generated answer accepting {} of {} media sections",
        accepted.len(),
        offer.media_descriptions.len()
    );
    d
}

fn answer_application(
    params: &LocalSdpParams<'_>,
    offer_media: &MediaDescription,
    mid: &str,
    setup: ConnectionRole,
    credentials: &IceCredentials,
) -> Option<MediaDescription> {
    let Some(sctp) = &params.sctp else {
        debug!("no data channel support, rejecting {}", offer_media.media_name);
        return None;
    };

    let media = new_application_media(9)
        .with_value_attribute(ATTR_KEY_CONNECTION_SETUP.to_owned(), setup.to_string())
        .with_ice_credentials(credentials.ufrag.clone(), credentials.pwd.clone())
        .with_value_attribute(ATTR_KEY_MID.to_owned(), mid.to_owned());
    Some(
        add_sctp_attributes(media, sctp).with_fingerprint(
            params.fingerprint.algorithm.clone(),
            params.fingerprint.value.clone(),
        ),
    )
}

fn answer_media(
    params: &LocalSdpParams<'_>,
    offer_media: &MediaDescription,
    mline: usize,
    mid: &str,
    setup: ConnectionRole,
    credentials: &IceCredentials,
    transceivers: &mut Vec<RTCRtpTransceiver>,
) -> Option<MediaDescription> {
    let kind = RtpCodecKind::from(offer_media.media_name.media.as_str());
    if kind == RtpCodecKind::Unspecified {
        warn!("unsupported media {}, rejecting", offer_media.media_name.media);
        return None;
    }

    let offered: Vec<RTCRtpCodec> = offer_media
        .codecs()
        .iter()
        .map(|c| RTCRtpCodec::from_sdp(kind, c))
        .collect();

    let index = match find_by_mid(mid, transceivers) {
        Some(index) => index,
        None => match find_compatible(kind, &offered, transceivers) {
            Some(index) => index,
            None => {
                let t = synthesize_receiver(transceivers.len(), kind, &offered);
                debug!("created {t} for mline {mline}");
                transceivers.push(t);
                transceivers.len() - 1
            }
        },
    };
    let t = &mut transceivers[index];
    if t.stopped {
        debug!("{t} is stopped, rejecting mline {mline}");
        return None;
    }

    let mut preferences = t.codec_preferences.clone();
    add_supported_feedback(&mut preferences, t.do_nack);
    let mut codecs = codecs_intersection(&preferences, &offered);
    if codecs.is_empty() {
        warn!("no common codec for mline {mline}, rejecting");
        return None;
    }
    if !t.do_nack {
        strip_nack(&mut codecs);
    }

    let mut offer_direction = RTCRtpTransceiverDirection::from(offer_media.direction());
    if offer_direction == RTCRtpTransceiverDirection::Unspecified {
        offer_direction = RTCRtpTransceiverDirection::Sendrecv;
    }
    let direction = intersect_answer_directions(offer_direction, t.direction);
    if direction == RTCRtpTransceiverDirection::Unspecified {
        warn!("cannot answer direction {offer_direction} with {t}, rejecting");
        return None;
    }

    let mut media = MediaDescription::new_jsep_media_description(kind.to_string(), vec![])
        .with_value_attribute(ATTR_KEY_CONNECTION_SETUP.to_owned(), setup.to_string())
        .with_ice_credentials(credentials.ufrag.clone(), credentials.pwd.clone())
        .with_value_attribute(ATTR_KEY_MID.to_owned(), mid.to_owned());
    if offer_media.attribute(ATTR_KEY_RTCP_MUX).is_some() {
        media = media.with_property_attribute(ATTR_KEY_RTCP_MUX.to_owned());
    }
    if offer_media.attribute(ATTR_KEY_RTCP_RSIZE).is_some() {
        media = media.with_property_attribute(ATTR_KEY_RTCP_RSIZE.to_owned());
    }
    media.replace_direction(direction.to_sdp_direction());
    media = add_codecs(media, &codecs);

    let original_target_pt = codecs[0].payload_type;
    let mut target_pt = original_target_pt;
    if t.fec_type == RTCFecType::UlpRed {
        for codec in offered.iter().filter(|c| c.is_red() || c.is_ulpfec()) {
            media = add_redundancy_format(media, codec.payload_type, codec.name(), codec.clock_rate);
            if codec.is_red() {
                target_pt = codec.payload_type;
            }
        }
    }

    let mut has_rtx = false;
    if t.do_nack {
        for codec in offered.iter().filter(|c| c.is_rtx()) {
            let Some(apt) = codec.apt() else {
                continue;
            };
            if apt == target_pt || apt == original_target_pt {
                media = add_rtx_format(media, codec.payload_type, codec.clock_rate, apt);
                has_rtx = true;
            }
        }
    }
    if has_rtx {
        t.rtx_ssrc_or_assign();
    } else {
        t.rtx_ssrc = None;
    }

    if direction.has_send() {
        media = add_ssrcs(media, t, params.name);
    }

    t.mid = Some(mid.to_owned());
    t.mline = Some(mline);

    Some(media.with_fingerprint(
        params.fingerprint.algorithm.clone(),
        params.fingerprint.value.clone(),
    ))
}

/// find_compatible returns the first free transceiver of `kind` that shares
/// a codec with the offer
fn find_compatible(
    kind: RtpCodecKind,
    offered: &[RTCRtpCodec],
    transceivers: &[RTCRtpTransceiver],
) -> Option<usize> {
    transceivers.iter().position(|t| {
        !t.stopped
            && !t.is_associated()
            && t.kind == kind
            && !codecs_intersection(&t.codec_preferences, offered).is_empty()
    })
}

fn synthesize_receiver(
    id: usize,
    kind: RtpCodecKind,
    offered: &[RTCRtpCodec],
) -> RTCRtpTransceiver {
    let codecs: Vec<RTCRtpCodec> = offered.iter().filter(|c| c.is_media()).cloned().collect();
    let do_nack = codecs.iter().any(|c| c.has_feedback(TYPE_RTCP_FB_NACK, ""));
    RTCRtpTransceiver::new(
        id,
        kind,
        RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Recvonly,
            codecs,
            do_nack,
            ..Default::default()
        },
    )
}

/// reject echoes an offered section with port zero
fn reject(offer_media: &MediaDescription) -> MediaDescription {
    let mut media = offer_media.clone();
    media.media_name.port.value = 0;
    media
}

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
