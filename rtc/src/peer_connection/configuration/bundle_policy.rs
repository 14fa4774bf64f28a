use std::fmt;

use serde::{Deserialize, Serialize};

/// BundlePolicy affects which media tracks are negotiated if the remote
/// endpoint is not bundle-aware, and what ICE candidates are gathered. Any
/// policy other than `None` groups every media section of an offer into one
/// `a=group:BUNDLE` and makes them share a single transport.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum RTCBundlePolicy {
    Unspecified = 0,

    /// None never offers bundling. Every media section gets its own
    /// ICE/DTLS transport.
    #[default]
    #[serde(rename = "none")]
    None = 1,

    /// Balanced gathers ICE candidates for each media type in use (audio,
    /// video, and data).
    #[serde(rename = "balanced")]
    Balanced = 2,

    /// MaxCompat gathers ICE candidates for each track.
    #[serde(rename = "max-compat")]
    MaxCompat = 3,

    /// MaxBundle gathers ICE candidates for only one track.
    #[serde(rename = "max-bundle")]
    MaxBundle = 4,
}

const BUNDLE_POLICY_NONE_STR: &str = "none";
const BUNDLE_POLICY_BALANCED_STR: &str = "balanced";
const BUNDLE_POLICY_MAX_COMPAT_STR: &str = "max-compat";
const BUNDLE_POLICY_MAX_BUNDLE_STR: &str = "max-bundle";

impl From<&str> for RTCBundlePolicy {
    fn from(raw: &str) -> Self {
        match raw {
            BUNDLE_POLICY_NONE_STR => RTCBundlePolicy::None,
            BUNDLE_POLICY_BALANCED_STR => RTCBundlePolicy::Balanced,
            BUNDLE_POLICY_MAX_COMPAT_STR => RTCBundlePolicy::MaxCompat,
            BUNDLE_POLICY_MAX_BUNDLE_STR => RTCBundlePolicy::MaxBundle,
            _ => RTCBundlePolicy::Unspecified,
        }
    }
}

impl fmt::Display for RTCBundlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCBundlePolicy::None => write!(f, "{BUNDLE_POLICY_NONE_STR}"),
            RTCBundlePolicy::Balanced => write!(f, "{BUNDLE_POLICY_BALANCED_STR}"),
            RTCBundlePolicy::MaxCompat => write!(f, "{BUNDLE_POLICY_MAX_COMPAT_STR}"),
            RTCBundlePolicy::MaxBundle => write!(f, "{BUNDLE_POLICY_MAX_BUNDLE_STR}"),
            _ => write!(
                f,
                "{}",
                crate::peer_connection::configuration::UNSPECIFIED_STR
            ),
        }
    }
}

impl RTCBundlePolicy {
    /// is_bundled reports whether offers built under this policy carry a
    /// BUNDLE group.
    pub fn is_bundled(&self) -> bool {
        !matches!(self, RTCBundlePolicy::None | RTCBundlePolicy::Unspecified)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_bundle_policy() {
        let tests = vec![
            ("Unspecified", RTCBundlePolicy::Unspecified),
            ("none", RTCBundlePolicy::None),
            ("balanced", RTCBundlePolicy::Balanced),
            ("max-compat", RTCBundlePolicy::MaxCompat),
            ("max-bundle", RTCBundlePolicy::MaxBundle),
        ];

        for (policy_string, expected_policy) in tests {
            assert_eq!(RTCBundlePolicy::from(policy_string), expected_policy);
        }
    }

    #[test]
    fn test_bundle_policy_string() {
        let tests = vec![
            (RTCBundlePolicy::Unspecified, "Unspecified", false),
            (RTCBundlePolicy::None, "none", false),
            (RTCBundlePolicy::Balanced, "balanced", true),
            (RTCBundlePolicy::MaxCompat, "max-compat", true),
            (RTCBundlePolicy::MaxBundle, "max-bundle", true),
        ];

        for (policy, expected_string, bundled) in tests {
            assert_eq!(policy.to_string(), expected_string);
            assert_eq!(policy.is_bundled(), bundled, "{policy}");
        }
    }

    #[test]
    fn test_bundle_policy_default() {
        assert_eq!(RTCBundlePolicy::default(), RTCBundlePolicy::None);
    }
}
