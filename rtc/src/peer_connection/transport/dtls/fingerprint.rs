use std::fmt;

use serde::{Deserialize, Serialize};

/// DTLS certificate fingerprint, as carried by `a=fingerprint`.
///
/// The value is a colon separated sequence of hex bytes. Comparison ignores
/// the case of both the algorithm and the value, see RFC 8122 section 5.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RTCDtlsFingerprint {
    /// Hash function name from the 'Hash function Textual Names' registry,
    /// `sha-256` for every certificate this crate generates.
    pub algorithm: String,

    pub value: String,
}

impl PartialEq for RTCDtlsFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm.eq_ignore_ascii_case(&other.algorithm)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl fmt::Display for RTCDtlsFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.algorithm, self.value)
    }
}

impl RTCDtlsFingerprint {
    /// parse reads the `<algorithm> <value>` form of an `a=fingerprint`
    /// attribute. None is returned unless both fields are present.
    pub(crate) fn parse(attribute: &str) -> Option<Self> {
        let mut fields = attribute.split_whitespace();
        let algorithm = fields.next()?;
        let value = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(RTCDtlsFingerprint {
            algorithm: algorithm.to_owned(),
            value: value.to_owned(),
        })
    }
}
