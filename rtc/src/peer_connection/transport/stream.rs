use std::collections::HashMap;

use log::debug;

use crate::peer_connection::certificate::RTCCertificate;
use crate::peer_connection::state::ice_gathering_state::RTCIceGatheringState;
use crate::peer_connection::transport::bin::{
    RTCTransportReceiveBin, RTCTransportSendBin, TransportReadiness,
};
use crate::peer_connection::transport::dtls::RTCDtlsTransport;
use crate::peer_connection::transport::dtls::state::RTCDtlsTransportState;
use crate::peer_connection::transport::ice::state::RTCIceTransportState;
use crate::peer_connection::transport::ice::{IceCredentials, IceStreamItem, RTCIceComponent};
use crate::rtp_transceiver::codec::{PayloadType, RTCRtpCodec};

/// One entry of the payload type map negotiated for a transport stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PtMapItem {
    pub(crate) pt: PayloadType,
    pub(crate) codec: RTCRtpCodec,
}

/// Per component state reported by the ICE agent
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct IceComponentState {
    pub(crate) state: RTCIceTransportState,
    pub(crate) gathering_state: RTCIceGatheringState,
}

/// RTCTransportStream pairs one RTP and one RTCP DTLS transport over one
/// ICE stream. There is one per bundle group, or per media section when
/// nothing is bundled, and it is keyed by its session id.
#[derive(Debug, Clone)]
pub(crate) struct RTCTransportStream {
    pub(crate) session_id: u32,
    pub(crate) ice_stream: IceStreamItem,

    pub(crate) rtp_dtls: RTCDtlsTransport,
    pub(crate) rtcp_dtls: RTCDtlsTransport,
    pub(crate) rtp_ice: IceComponentState,
    pub(crate) rtcp_ice: IceComponentState,

    pub(crate) rtcp_mux: bool,
    pub(crate) rtcp_rsize: bool,
    pub(crate) ptmap: Vec<PtMapItem>,
    /// remote ssrc -> mline index
    pub(crate) remote_ssrc_map: HashMap<u32, usize>,

    pub(crate) send_bin: RTCTransportSendBin,
    pub(crate) receive_bin: RTCTransportReceiveBin,

    pub(crate) local_credentials: Option<IceCredentials>,
    pub(crate) remote_credentials: Option<IceCredentials>,
    pub(crate) gathering_started: bool,
}

impl RTCTransportStream {
    pub(crate) fn new(ice_stream: IceStreamItem, certificate: RTCCertificate) -> Self {
        let session_id = ice_stream.session_id;
        Self {
            session_id,
            ice_stream,
            rtp_dtls: RTCDtlsTransport::new(RTCIceComponent::Rtp, certificate.clone()),
            rtcp_dtls: RTCDtlsTransport::new(RTCIceComponent::Rtcp, certificate),
            rtp_ice: IceComponentState::default(),
            rtcp_ice: IceComponentState::default(),
            rtcp_mux: false,
            rtcp_rsize: false,
            ptmap: vec![],
            remote_ssrc_map: HashMap::new(),
            send_bin: RTCTransportSendBin::new(session_id),
            receive_bin: RTCTransportReceiveBin::new(session_id),
            local_credentials: None,
            remote_credentials: None,
            gathering_started: false,
        }
    }

    pub(crate) fn dtls_mut(&mut self, component: RTCIceComponent) -> &mut RTCDtlsTransport {
        match component {
            RTCIceComponent::Rtp => &mut self.rtp_dtls,
            RTCIceComponent::Rtcp => &mut self.rtcp_dtls,
        }
    }

    fn ice_mut(&mut self, component: RTCIceComponent) -> &mut IceComponentState {
        match component {
            RTCIceComponent::Rtp => &mut self.rtp_ice,
            RTCIceComponent::Rtcp => &mut self.rtcp_ice,
        }
    }

    /// set_ice_state records a state reported by the agent and tells whether
    /// it changed
    pub(crate) fn set_ice_state(
        &mut self,
        component: RTCIceComponent,
        state: RTCIceTransportState,
    ) -> bool {
        let ice = self.ice_mut(component);
        if ice.state == state {
            return false;
        }
        ice.state = state;
        self.update_bins();
        true
    }

    pub(crate) fn set_gathering_state(
        &mut self,
        component: RTCIceComponent,
        state: RTCIceGatheringState,
    ) -> bool {
        let ice = self.ice_mut(component);
        if ice.gathering_state == state {
            return false;
        }
        ice.gathering_state = state;
        true
    }

    pub(crate) fn set_dtls_state(
        &mut self,
        component: RTCIceComponent,
        state: RTCDtlsTransportState,
    ) -> bool {
        self.dtls_mut(component).set_state(state)
    }

    pub(crate) fn set_key(&mut self, component: RTCIceComponent) {
        self.dtls_mut(component).set_key();
        if component == RTCIceComponent::Rtp {
            self.receive_bin.set_key();
        }
        self.update_bins();
    }

    /// set_dtls_client applies the role resolved from `a=setup` to both
    /// DTLS transports of the stream
    pub(crate) fn set_dtls_client(&mut self, is_client: bool) {
        self.rtp_dtls.set_client(is_client);
        self.rtcp_dtls.set_client(is_client);
    }

    pub(crate) fn set_rtcp_mux(&mut self, rtcp_mux: bool) {
        if self.rtcp_mux != rtcp_mux {
            debug!("transport stream {} rtcp-mux {}", self.session_id, rtcp_mux);
            self.rtcp_mux = rtcp_mux;
            self.update_bins();
        }
    }

    fn update_bins(&mut self) {
        let ice_connected = self.rtp_ice.state.is_connected()
            && (self.rtcp_mux || self.rtcp_ice.state.is_connected());
        let rtcp_key_set = if self.rtcp_mux {
            self.rtp_dtls.key_set()
        } else {
            self.rtcp_dtls.key_set()
        };
        self.send_bin.update(TransportReadiness {
            ice_connected,
            rtp_key_set: self.rtp_dtls.key_set(),
            rtcp_key_set,
        });
    }

    /// ice_states lists the ICE transports in use: the RTCP component only
    /// counts without rtcp-mux
    pub(crate) fn ice_states(&self) -> Vec<RTCIceTransportState> {
        let mut states = vec![self.rtp_ice.state];
        if !self.rtcp_mux {
            states.push(self.rtcp_ice.state);
        }
        states
    }

    pub(crate) fn gathering_states(&self) -> Vec<RTCIceGatheringState> {
        let mut states = vec![self.rtp_ice.gathering_state];
        if !self.rtcp_mux {
            states.push(self.rtcp_ice.gathering_state);
        }
        states
    }

    pub(crate) fn dtls_states(&self) -> Vec<RTCDtlsTransportState> {
        let mut states = vec![self.rtp_dtls.state()];
        if !self.rtcp_mux {
            states.push(self.rtcp_dtls.state());
        }
        states
    }

    pub(crate) fn codec_for_pt(&self, pt: PayloadType) -> Option<&RTCRtpCodec> {
        self.ptmap.iter().find(|item| item.pt == pt).map(|item| &item.codec)
    }

    /// mline_for_ssrc resolves an incoming SSRC to its media section
    pub(crate) fn mline_for_ssrc(&self, ssrc: u32) -> Option<usize> {
        self.remote_ssrc_map.get(&ssrc).copied()
    }

    pub(crate) fn close(&mut self) {
        self.rtp_dtls.close();
        self.rtcp_dtls.close();
        self.rtp_ice.state = RTCIceTransportState::Closed;
        self.rtcp_ice.state = RTCIceTransportState::Closed;
        self.send_bin.block();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use shared::error::Result;

    fn new_stream() -> Result<RTCTransportStream> {
        Ok(RTCTransportStream::new(
            IceStreamItem {
                session_id: 0,
                stream_id: 7,
            },
            RTCCertificate::generate()?,
        ))
    }

    #[test]
    fn test_transport_stream_rtcp_mux_hides_rtcp_component() -> Result<()> {
        let mut stream = new_stream()?;
        assert_eq!(stream.ice_states().len(), 2);
        assert_eq!(stream.dtls_states().len(), 2);

        stream.set_rtcp_mux(true);
        assert_eq!(stream.ice_states(), vec![RTCIceTransportState::Unspecified]);
        assert_eq!(stream.dtls_states(), vec![RTCDtlsTransportState::New]);
        assert_eq!(
            stream.gathering_states(),
            vec![RTCIceGatheringState::Unspecified]
        );
        Ok(())
    }

    #[test]
    fn test_transport_stream_send_bin_unblocks() -> Result<()> {
        let mut stream = new_stream()?;
        stream.set_rtcp_mux(true);

        assert!(stream.set_ice_state(RTCIceComponent::Rtp, RTCIceTransportState::Connected));
        assert!(!stream.set_ice_state(RTCIceComponent::Rtp, RTCIceTransportState::Connected));
        assert!(stream.send_bin.rtp_blocked());

        stream.set_key(RTCIceComponent::Rtp);
        assert!(!stream.send_bin.rtp_blocked());
        assert!(!stream.send_bin.rtcp_blocked());

        stream.close();
        assert!(stream.send_bin.rtp_blocked());
        assert_eq!(stream.rtp_dtls.state(), RTCDtlsTransportState::Closed);
        Ok(())
    }

    #[test]
    fn test_transport_stream_dtls_client() -> Result<()> {
        let mut stream = new_stream()?;
        stream.set_dtls_client(true);
        assert!(stream.rtp_dtls.is_client());
        assert!(stream.rtcp_dtls.is_client());

        stream.remote_ssrc_map.insert(1234, 2);
        assert_eq!(stream.mline_for_ssrc(1234), Some(2));
        assert_eq!(stream.mline_for_ssrc(1), None);
        Ok(())
    }
}
