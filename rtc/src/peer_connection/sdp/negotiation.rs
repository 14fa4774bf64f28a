use sdp::util::ConnectionRole;

use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;

/// intersect_answer_directions picks the direction an answer carries for a
/// section offered with `offer` when the local transceiver wants `local`.
///
/// Unspecified means there is no usable answer and the section is rejected.
pub(crate) fn intersect_answer_directions(
    offer: RTCRtpTransceiverDirection,
    local: RTCRtpTransceiverDirection,
) -> RTCRtpTransceiverDirection {
    use RTCRtpTransceiverDirection::*;

    match (offer, local) {
        (Unspecified, _) | (_, Unspecified) => Unspecified,
        (Sendrecv, _) => local,
        (Sendonly, Sendrecv | Recvonly) => Recvonly,
        (Recvonly, Sendrecv | Sendonly) => Sendonly,
        _ => Inactive,
    }
}

/// intersect_dtls_setup answers the `a=setup` of an offer.
pub(crate) fn intersect_dtls_setup(offer: ConnectionRole) -> ConnectionRole {
    match offer {
        ConnectionRole::Actpass | ConnectionRole::Passive => ConnectionRole::Active,
        ConnectionRole::Active => ConnectionRole::Passive,
        _ => ConnectionRole::Unspecified,
    }
}

/// get_final_setup resolves the role this side plays once both the local
/// and the remote `a=setup` are known. Two identical concrete roles have no
/// resolution.
pub(crate) fn get_final_setup(local: ConnectionRole, remote: ConnectionRole) -> ConnectionRole {
    use ConnectionRole::*;

    match (local, remote) {
        (Actpass, Active) => Passive,
        (Actpass, Passive) => Active,
        (Active, Passive | Actpass) => Active,
        (Passive, Active | Actpass) => Passive,
        _ => Unspecified,
    }
}

/// get_final_direction resolves the direction this side ends up with given
/// the local and remote section directions.
pub(crate) fn get_final_direction(
    local: RTCRtpTransceiverDirection,
    remote: RTCRtpTransceiverDirection,
) -> RTCRtpTransceiverDirection {
    if local == RTCRtpTransceiverDirection::Unspecified
        || remote == RTCRtpTransceiverDirection::Unspecified
    {
        return RTCRtpTransceiverDirection::Unspecified;
    }
    local.intersect(remote.reverse())
}
