//! X.509 certificates for DTLS authentication.
//!
//! Every DTLS transport created by the peer connection presents the same
//! certificate. Its SHA-256 fingerprint is what ends up in the
//! `a=fingerprint` lines of every description the engine builds.
//!
//! ```
//! use rtc::peer_connection::certificate::RTCCertificate;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let certificate = RTCCertificate::generate()?;
//! for fp in certificate.get_fingerprints() {
//!     println!("a=fingerprint:{} {}", fp.algorithm, fp.value);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::SystemTime;

use rcgen::{CertificateParams, KeyPair};
use sha2::{Digest, Sha256};

use crate::peer_connection::transport::dtls::fingerprint::RTCDtlsFingerprint;
use shared::error::{Error, Result};
use shared::util::math_rand_alpha;

/// Certificate represents a x509Cert used to authenticate WebRTC communications.
#[derive(Clone, Debug)]
pub struct RTCCertificate {
    /// DER encoded certificate chain, leaf first
    pub(crate) certificate: Vec<Vec<u8>>,
    /// PKCS#8 DER encoded private key
    pub(crate) private_key: Vec<u8>,
    pub(crate) expires: SystemTime,
}

impl PartialEq for RTCCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.certificate == other.certificate
    }
}

impl RTCCertificate {
    fn from_params(params: CertificateParams, key_pair: KeyPair) -> Result<Self> {
        let not_after = params.not_after;
        let x509_cert = params.self_signed(&key_pair)?;

        Ok(Self {
            certificate: vec![x509_cert.der().to_vec()],
            private_key: key_pair.serialize_der(),
            expires: not_after.into(),
        })
    }

    /// generate creates a self-signed ECDSA P-256 certificate with a random
    /// common name.
    pub fn generate() -> Result<Self> {
        let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
        RTCCertificate::from_key_pair(key_pair)
    }

    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self> {
        if !(key_pair.is_compatible(&rcgen::PKCS_ED25519)
            || key_pair.is_compatible(&rcgen::PKCS_ECDSA_P256_SHA256))
        {
            return Err(Error::Other("Unsupported key_pair".to_owned()));
        }

        RTCCertificate::from_params(CertificateParams::new(vec![math_rand_alpha(16)])?, key_pair)
    }

    /// from_existing wraps a certificate chain and key produced elsewhere
    pub fn from_existing(
        certificate: Vec<Vec<u8>>,
        private_key: Vec<u8>,
        expires: SystemTime,
    ) -> Self {
        Self {
            certificate,
            private_key,
            expires,
        }
    }

    pub fn expires(&self) -> SystemTime {
        self.expires
    }

    /// der returns the DER encoding of the leaf certificate
    pub fn der(&self) -> Option<&[u8]> {
        self.certificate.first().map(|c| c.as_slice())
    }

    pub fn get_fingerprints(&self) -> Vec<RTCDtlsFingerprint> {
        let mut fingerprints = Vec::new();

        for c in &self.certificate {
            fingerprints.push(sha256_fingerprint(c));
        }

        fingerprints
    }
}

/// sha256_fingerprint hashes one DER certificate the way `a=fingerprint`
/// carries it.
pub(crate) fn sha256_fingerprint(der: &[u8]) -> RTCDtlsFingerprint {
    let mut h = Sha256::new();
    h.update(der);
    let hashed = h.finalize();
    let values: Vec<String> = hashed.iter().map(|x| format! {"{x:02x}"}).collect();

    RTCDtlsFingerprint {
        algorithm: SHA_256.to_owned(),
        value: values.join(":"),
    }
}

pub(crate) const SHA_256: &str = "sha-256";

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generate_certificate_ecdsa() -> Result<()> {
        let cert = RTCCertificate::generate()?;
        assert!(cert.der().is_some());
        assert!(!cert.private_key.is_empty());
        assert!(cert.expires() > SystemTime::now());

        Ok(())
    }

    #[test]
    fn test_generate_certificate_eddsa() -> Result<()> {
        let kp = KeyPair::generate_for(&rcgen::PKCS_ED25519)?;
        let _cert = RTCCertificate::from_key_pair(kp)?;

        Ok(())
    }

    #[test]
    fn test_certificate_equal() -> Result<()> {
        let cert1 = RTCCertificate::generate()?;
        let cert2 = RTCCertificate::generate()?;

        assert_ne!(cert1, cert2);
        assert_eq!(cert1, cert1.clone());

        Ok(())
    }

    #[test]
    fn test_certificate_fingerprint_format() -> Result<()> {
        let cert = RTCCertificate::generate()?;
        let fingerprints = cert.get_fingerprints();
        assert_eq!(fingerprints.len(), 1);

        let fp = &fingerprints[0];
        assert_eq!(fp.algorithm, "sha-256");
        // 32 bytes, two hex digits each, joined by colons
        assert_eq!(fp.value.len(), 32 * 3 - 1);
        assert!(
            fp.value
                .split(':')
                .all(|b| b.len() == 2 && b.chars().all(|c| c.is_ascii_hexdigit()))
        );

        Ok(())
    }
}
