#![allow(dead_code)]

use std::io;
use std::num::ParseIntError;
use std::string::FromUtf8Error;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer: short")]
    ErrBufferShort,
    #[error("raw is too small for a DataChannel message")]
    UnexpectedEndOfBuffer { expected: usize, actual: usize },
    #[error("unknown MessageType {0}")]
    InvalidMessageType(u8),
    #[error("unknown ChannelType {0}")]
    InvalidChannelType(u8),
    #[error("unknown PayloadProtocolIdentifier {0}")]
    InvalidPayloadProtocolIdentifier(u8),

    //SDP
    #[error("sdp: invalid syntax `{0}`")]
    ErrSdpInvalidSyntax(String),
    #[error("sdp: invalid value `{0}`")]
    ErrSdpInvalidValue(String),
    #[error("sdp: empty time_descriptions")]
    ErrSdpEmptyTimeDescription,
    #[error("sdp: missing media description")]
    ErrSdpMissingMediaDescription,

    /// ErrConnectionClosed indicates an operation executed after connection
    /// has already been closed.
    #[error("connection closed")]
    ErrConnectionClosed,
    /// ErrNoRemoteDescription indicates that an operation was rejected because
    /// the remote description is not set
    #[error("remote description is not set")]
    ErrNoRemoteDescription,
    /// ErrIncorrectSignalingState indicates that the signaling state of PeerConnection is not correct
    #[error("operation can not be run in current signaling state")]
    ErrIncorrectSignalingState,
    #[error("invalid proposed signaling state transition: {0}")]
    ErrSignalingStateProposedTransitionInvalid(String),
    #[error("unknown transceiver")]
    ErrRTPTransceiverNotFound,
    #[error("cannot set codec preferences with an unknown media kind")]
    ErrRTPTransceiverCodecUnsupported,

    /// ErrSessionDescriptionNoFingerprint indicates a description was applied that has no
    /// fingerprint
    #[error("set_remote_description called with no fingerprint")]
    ErrSessionDescriptionNoFingerprint,
    /// ErrSessionDescriptionInvalidFingerprint indicates a description carries a fingerprint
    /// that could not be parsed
    #[error("set_remote_description called with an invalid fingerprint")]
    ErrSessionDescriptionInvalidFingerprint,
    /// ErrSessionDescriptionConflictingFingerprints indicates media sections carry
    /// fingerprints that disagree with each other
    #[error("set_remote_description called with multiple conflicting fingerprint")]
    ErrSessionDescriptionConflictingFingerprints,
    /// ErrSessionDescriptionMixedFingerprints indicates a description that carries a
    /// session fingerprint and media fingerprints at the same time, or only some media
    /// fingerprints
    #[error("fingerprints must be present at either session or every media level")]
    ErrSessionDescriptionMixedFingerprints,
    /// ErrSessionDescriptionKeyLine indicates a description carrying an `k=` key line
    #[error("sdp contains a key line which is not supported")]
    ErrSessionDescriptionKeyLine,
    #[error("media section {0} is missing a=mid")]
    ErrSessionDescriptionMissingMid(usize),
    #[error("media section {0} is missing a=ice-ufrag")]
    ErrSessionDescriptionMissingIceUfrag(usize),
    #[error("media section {0} is missing a=ice-pwd")]
    ErrSessionDescriptionMissingIcePwd(usize),
    #[error("media section {0} is missing a=setup")]
    ErrSessionDescriptionMissingSetup(usize),
    #[error("media section {0} has an invalid a=setup value `{1}`")]
    ErrSessionDescriptionInvalidSetup(usize, String),
    #[error("bundled media sections do not share ICE credentials with `{0}`")]
    ErrSessionDescriptionBundleCredentialsMismatch(String),
    /// ErrSessionDescriptionConflictingSetup indicates both peers claimed the same
    /// DTLS role for one media section
    #[error("media section {0} resolved to an impossible DTLS setup `{1}`/`{2}`")]
    ErrSessionDescriptionConflictingSetup(usize, String, String),
    #[error("a description of type {0} has no sdp to apply")]
    ErrSessionDescriptionMissingSdp(String),

    #[error("renegotiation changing the direction of transceiver {0} is not implemented")]
    ErrRenegotiationDirectionChange(String),

    /// ErrMaxDataChannelID indicates that the maximum number ID that could be
    /// specified for a data channel has been exceeded.
    #[error("maximum number ID for datachannel specified")]
    ErrMaxDataChannelID,
    #[error("data channel id {0} is already in use")]
    ErrDataChannelIdInUse(u16),
    /// ErrRetransmitsOrPacketLifeTime indicates that both max_packet_life_time and max_retransmits
    /// was set.
    #[error("both max_packet_life_time and max_retransmits was set")]
    ErrRetransmitsOrPacketLifeTime,
    #[error("negotiated data channel requires an id")]
    ErrDataChannelNegotiatedWithoutId,
    #[error("data channel closed")]
    ErrDataChannelClosed,
    #[error("data channel is not open")]
    ErrDataChannelNotOpen,
    #[error("outbound packet larger than maximum message size")]
    ErrOutboundPacketTooLarge,
    #[error("unknown data channel")]
    ErrDataChannelNotExisted,

    #[error("required collaborator is unavailable: {0}")]
    ErrMissingCollaborator(String),

    #[error("{0}")]
    RcGen(String),
    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("utf8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("mutex poison: {0}")]
    PoisonError(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl From<rcgen::Error> for Error {
    fn from(e: rcgen::Error) -> Self {
        Error::RcGen(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::Other(errs_strs.join("\n")))
    }
}
