pub mod fingerprint;
pub mod role;
pub mod state;

use log::{debug, warn};

use crate::peer_connection::certificate::{RTCCertificate, SHA_256, sha256_fingerprint};
use crate::peer_connection::transport::ice::RTCIceComponent;
use fingerprint::RTCDtlsFingerprint;
use role::RTCDtlsRole;
use shared::error::{Error, Result};
use state::RTCDtlsTransportState;

/// RTCDtlsTransport is the engine's view of one DTLS-SRTP transport.
///
/// The handshake itself runs in the media layer. This object only tracks
/// what the engine needs for negotiation and state collation: the local
/// certificate, the role resolved from `a=setup`, the remote certificate
/// and whether SRTP keys have been derived.
#[derive(Debug, Clone)]
pub struct RTCDtlsTransport {
    pub(crate) component: RTCIceComponent,
    pub(crate) state: RTCDtlsTransportState,
    pub(crate) role: RTCDtlsRole,
    pub(crate) certificate: RTCCertificate,
    pub(crate) remote_fingerprint: Option<RTCDtlsFingerprint>,
    pub(crate) remote_certificate: Option<Vec<u8>>,
    pub(crate) key_set: bool,
}

impl RTCDtlsTransport {
    pub(crate) fn new(component: RTCIceComponent, certificate: RTCCertificate) -> Self {
        Self {
            component,
            state: RTCDtlsTransportState::New,
            role: RTCDtlsRole::Auto,
            certificate,
            remote_fingerprint: None,
            remote_certificate: None,
            key_set: false,
        }
    }

    pub fn component(&self) -> RTCIceComponent {
        self.component
    }

    pub fn state(&self) -> RTCDtlsTransportState {
        self.state
    }

    pub fn role(&self) -> RTCDtlsRole {
        self.role
    }

    pub fn is_client(&self) -> bool {
        self.role == RTCDtlsRole::Client
    }

    pub fn certificate(&self) -> &RTCCertificate {
        &self.certificate
    }

    /// remote_certificate returns the DER certificate the peer presented
    pub fn remote_certificate(&self) -> Option<&[u8]> {
        self.remote_certificate.as_deref()
    }

    /// key_set is true once SRTP keys were derived from the handshake
    pub fn key_set(&self) -> bool {
        self.key_set
    }

    pub(crate) fn set_client(&mut self, is_client: bool) {
        let role = if is_client {
            RTCDtlsRole::Client
        } else {
            RTCDtlsRole::Server
        };
        if self.role != role {
            debug!("dtls {} transport is now {}", self.component, role);
            self.role = role;
        }
    }

    /// set_state records a state reported by the handshake and tells
    /// whether it changed
    pub(crate) fn set_state(&mut self, state: RTCDtlsTransportState) -> bool {
        if self.state == state {
            return false;
        }
        debug!(
            "dtls {} transport state {} -> {}",
            self.component, self.state, state
        );
        self.state = state;
        true
    }

    pub(crate) fn set_key(&mut self) {
        self.key_set = true;
    }

    pub(crate) fn set_remote_fingerprint(&mut self, fingerprint: Option<RTCDtlsFingerprint>) {
        self.remote_fingerprint = fingerprint;
    }

    /// set_remote_certificate checks the peer certificate against the
    /// fingerprint of the remote description. A mismatch fails the
    /// transport.
    pub(crate) fn set_remote_certificate(&mut self, der: Vec<u8>) -> Result<()> {
        let result = match &self.remote_fingerprint {
            Some(expected) if expected.algorithm.eq_ignore_ascii_case(SHA_256) => {
                if sha256_fingerprint(&der) == *expected {
                    Ok(())
                } else {
                    Err(Error::ErrSessionDescriptionInvalidFingerprint)
                }
            }
            Some(expected) => {
                warn!(
                    "cannot verify {} fingerprint of the remote certificate",
                    expected.algorithm
                );
                Ok(())
            }
            None => Err(Error::ErrSessionDescriptionNoFingerprint),
        };

        self.remote_certificate = Some(der);
        if result.is_err() {
            self.set_state(RTCDtlsTransportState::Failed);
        }
        result
    }

    pub(crate) fn close(&mut self) {
        self.set_state(RTCDtlsTransportState::Closed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dtls_transport_remote_certificate() -> Result<()> {
        let local = RTCCertificate::generate()?;
        let remote = RTCCertificate::generate()?;
        let remote_der = remote.der().map(|d| d.to_vec()).unwrap_or_default();

        let mut transport = RTCDtlsTransport::new(RTCIceComponent::Rtp, local.clone());
        transport.set_remote_fingerprint(remote.get_fingerprints().pop());
        transport.set_remote_certificate(remote_der.clone())?;
        assert_eq!(transport.remote_certificate(), Some(remote_der.as_slice()));
        assert_eq!(transport.state(), RTCDtlsTransportState::New);

        let mut transport = RTCDtlsTransport::new(RTCIceComponent::Rtp, local.clone());
        transport.set_remote_fingerprint(local.get_fingerprints().pop());
        assert_eq!(
            transport.set_remote_certificate(remote_der),
            Err(Error::ErrSessionDescriptionInvalidFingerprint)
        );
        assert_eq!(transport.state(), RTCDtlsTransportState::Failed);

        Ok(())
    }

    #[test]
    fn test_dtls_transport_role_and_state() -> Result<()> {
        let mut transport = RTCDtlsTransport::new(RTCIceComponent::Rtcp, RTCCertificate::generate()?);
        assert_eq!(transport.role(), RTCDtlsRole::Auto);

        transport.set_client(true);
        assert!(transport.is_client());
        transport.set_client(false);
        assert_eq!(transport.role(), RTCDtlsRole::Server);

        assert!(transport.set_state(RTCDtlsTransportState::Connecting));
        assert!(!transport.set_state(RTCDtlsTransportState::Connecting));
        assert!(!transport.key_set());
        transport.set_key();
        assert!(transport.key_set());

        transport.close();
        assert_eq!(transport.state(), RTCDtlsTransportState::Closed);
        Ok(())
    }
}
