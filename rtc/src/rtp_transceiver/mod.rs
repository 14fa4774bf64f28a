use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer_connection::configuration::UNSPECIFIED_STR;
use crate::rtp_transceiver::codec::{RTCRtpCodec, RtpCodecKind, SSRC};
use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;

pub mod codec;
pub mod direction;

/// Handle of a transceiver, stable for the lifetime of the connection
pub type RTCRtpTransceiverId = usize;

/// RTCFecType selects the forward error correction offered for a transceiver.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCFecType {
    #[default]
    #[serde(rename = "none")]
    None,

    /// ULPFEC carried inside RED
    #[serde(rename = "ulp-red")]
    UlpRed,
}

const FEC_TYPE_NONE_STR: &str = "none";
const FEC_TYPE_ULP_RED_STR: &str = "ulp-red";

impl From<&str> for RTCFecType {
    fn from(raw: &str) -> Self {
        match raw {
            FEC_TYPE_ULP_RED_STR => RTCFecType::UlpRed,
            _ => RTCFecType::None,
        }
    }
}

impl fmt::Display for RTCFecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            RTCFecType::None => FEC_TYPE_NONE_STR,
            RTCFecType::UlpRed => FEC_TYPE_ULP_RED_STR,
        };
        write!(f, "{s}")
    }
}

/// RTCRtpTransceiverInit is used when calling add_transceiver() to
/// provide configuration options for the new transceiver.
#[derive(Default, Debug, Clone)]
pub struct RTCRtpTransceiverInit {
    pub direction: RTCRtpTransceiverDirection,
    /// Codec preferences in order. Payload types are kept when offering and
    /// replaced by the remote ones when answering.
    pub codecs: Vec<RTCRtpCodec>,
    pub do_nack: bool,
    pub fec_type: RTCFecType,
    pub fec_percentage: u32,
}

/// RTCRtpTransceiver represents a combination of a sender and a receiver
/// that share a common mid.
///
/// Transceivers are owned by the peer connection; the application receives
/// snapshots and refers to a transceiver through its [`id`](Self::id).
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RTCRtpTransceiver {
    pub(crate) id: RTCRtpTransceiverId,
    pub(crate) kind: RtpCodecKind,
    pub(crate) mid: Option<String>,
    pub(crate) mline: Option<usize>,
    pub(crate) direction: RTCRtpTransceiverDirection,
    pub(crate) current_direction: RTCRtpTransceiverDirection,
    pub(crate) codec_preferences: Vec<RTCRtpCodec>,

    pub(crate) ssrc: SSRC,
    pub(crate) rtx_ssrc: Option<SSRC>,
    pub(crate) remote_ssrcs: Vec<SSRC>,

    /// Transport stream the transceiver is bound to, by session id
    pub(crate) session_id: Option<u32>,

    pub(crate) do_nack: bool,
    pub(crate) fec_type: RTCFecType,
    pub(crate) fec_percentage: u32,
    pub(crate) stopped: bool,
}

impl RTCRtpTransceiver {
    pub(crate) fn new(id: RTCRtpTransceiverId, kind: RtpCodecKind, init: RTCRtpTransceiverInit) -> Self {
        Self {
            id,
            kind,
            direction: init.direction,
            codec_preferences: init.codecs,
            ssrc: shared::util::random_ssrc(),
            do_nack: init.do_nack,
            fec_type: init.fec_type,
            fec_percentage: init.fec_percentage,
            ..Default::default()
        }
    }

    pub fn id(&self) -> RTCRtpTransceiverId {
        self.id
    }

    pub fn kind(&self) -> RtpCodecKind {
        self.kind
    }

    /// mid is assigned by create_offer or while applying a remote offer.
    pub fn mid(&self) -> Option<&str> {
        self.mid.as_deref()
    }

    /// mline is the index of the media section the transceiver is bound to
    pub fn mline(&self) -> Option<usize> {
        self.mline
    }

    pub fn direction(&self) -> RTCRtpTransceiverDirection {
        self.direction
    }

    /// current_direction is the direction negotiated by the last applied
    /// answer.
    pub fn current_direction(&self) -> RTCRtpTransceiverDirection {
        self.current_direction
    }

    pub fn codec_preferences(&self) -> &[RTCRtpCodec] {
        &self.codec_preferences
    }

    pub fn ssrc(&self) -> SSRC {
        self.ssrc
    }

    pub fn rtx_ssrc(&self) -> Option<SSRC> {
        self.rtx_ssrc
    }

    pub fn remote_ssrcs(&self) -> &[SSRC] {
        &self.remote_ssrcs
    }

    pub fn do_nack(&self) -> bool {
        self.do_nack
    }

    pub fn fec_type(&self) -> RTCFecType {
        self.fec_type
    }

    pub fn fec_percentage(&self) -> u32 {
        self.fec_percentage
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// name labels the transceiver in `a=ssrc ... msid:` lines
    pub(crate) fn name(&self) -> String {
        format!("transceiver{}", self.id)
    }

    /// is_associated is true once the transceiver is bound to a media
    /// section
    pub(crate) fn is_associated(&self) -> bool {
        self.mid.is_some() || self.mline.is_some()
    }

    /// rtx_ssrc_or_assign gives the retransmission ssrc paired with the
    /// sender ssrc, drawing one on first use
    pub(crate) fn rtx_ssrc_or_assign(&mut self) -> SSRC {
        *self.rtx_ssrc.get_or_insert_with(shared::util::random_ssrc)
    }

    pub(crate) fn stop(&mut self) {
        self.stopped = true;
        self.direction = RTCRtpTransceiverDirection::Inactive;
        self.current_direction = RTCRtpTransceiverDirection::Inactive;
    }
}

impl fmt::Display for RTCRtpTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transceiver {} {} mid={} direction={} current={}",
            self.id,
            self.kind,
            self.mid.as_deref().unwrap_or(UNSPECIFIED_STR),
            self.direction,
            self.current_direction
        )
    }
}

/// find_by_mid returns the index of the transceiver bound to `mid`
pub(crate) fn find_by_mid(mid: &str, transceivers: &[RTCRtpTransceiver]) -> Option<usize> {
    transceivers.iter().position(|t| t.mid.as_deref() == Some(mid))
}

/// find_by_mline returns the index of the transceiver bound to `mline`
pub(crate) fn find_by_mline(mline: usize, transceivers: &[RTCRtpTransceiver]) -> Option<usize> {
    transceivers.iter().position(|t| t.mline == Some(mline))
}
