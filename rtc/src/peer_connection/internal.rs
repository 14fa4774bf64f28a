use std::collections::BTreeMap;
use std::time::SystemTime;

use bytes::BytesMut;
use datachannel::data_channel::{DataChannelEvent, DataChannelMessage, DataChannelTransportEvent};
use datachannel::payload::PayloadProtocolIdentifier;
use log::{debug, info, trace, warn};
use sansio::Protocol;
use sdp::description::{ATTR_KEY_CANDIDATE, ATTR_KEY_CONNECTION_SETUP, ATTR_KEY_FINGERPRINT};
use sdp::description::{ATTR_KEY_RTCP_MUX, ATTR_KEY_RTCP_RSIZE, ATTR_KEY_SSRC};
use sdp::util::ConnectionRole;
use sdp::{MediaDescription, SessionDescription};
use shared::error::{Error, Result, flatten_errs};

use crate::data_channel::init::RTCDataChannelInit;
use crate::data_channel::internal::{RTCDataChannelInternal, allocate_data_channel_id};
use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{RTCDataChannelHandle, RTCDataChannelId};
use crate::peer_connection::certificate::RTCCertificate;
use crate::peer_connection::configuration::RTCConfiguration;
use crate::peer_connection::configuration::offer_answer_options::RTCOfferOptions;
use crate::peer_connection::configuration::rtcp_mux_policy::RTCRtcpMuxPolicy;
use crate::peer_connection::event::data_channel_event::RTCDataChannelEvent;
use crate::peer_connection::event::ice_event::RTCIceCandidateEvent;
use crate::peer_connection::event::{RTCPeerConnectionEvent, RTCTransportEvent};
use crate::peer_connection::operation::{OperationSender, TaskState};
use crate::peer_connection::sdp::answer::generate_answer;
use crate::peer_connection::sdp::negotiation::{get_final_direction, get_final_setup};
use crate::peer_connection::sdp::negotiation::intersect_answer_directions;
use crate::peer_connection::sdp::offer::generate_offer;
use crate::peer_connection::sdp::sdp_type::RTCSdpType;
use crate::peer_connection::sdp::session_description::RTCSessionDescription;
use crate::peer_connection::sdp::validation::validate_description;
use crate::peer_connection::sdp::{
    ApplicationSection, LocalSdpParams, SctpSdpParams, credentials_of, is_application,
    max_message_size_of, sctp_port_of,
};
use crate::peer_connection::state::ice_connection_state::RTCIceConnectionState;
use crate::peer_connection::state::ice_gathering_state::RTCIceGatheringState;
use crate::peer_connection::state::peer_connection_state::RTCPeerConnectionState;
use crate::peer_connection::state::signaling_state::{
    RTCSignalingState, StateChangeOp, next_signaling_state,
};
use crate::peer_connection::transport::bin::RTCReceiveState;
use crate::peer_connection::transport::dtls::fingerprint::RTCDtlsFingerprint;
use crate::peer_connection::transport::ice::candidate::{PendingIceCandidates, normalize_candidate};
use crate::peer_connection::transport::ice::{IceAgent, IceStreamItem, RTCIceComponent};
use crate::peer_connection::transport::sctp::{
    RTCSctpTransportState, SctpAssociation, SctpTransport, effective_max_message_size,
};
use crate::peer_connection::transport::stream::{PtMapItem, RTCTransportStream};
use crate::rtp_transceiver::codec::{RTCRtpCodec, RtpCodecKind, SSRC};
use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::{
    RTCRtpTransceiver, RTCRtpTransceiverId, RTCRtpTransceiverInit, find_by_mid, find_by_mline,
};
use crate::stats::RTCStatsReport;
use crate::stats::data_channel::RTCDataChannelStats;
use crate::stats::peer_connection::RTCPeerConnectionStats;
use crate::stats::transceiver::RTCTransceiverStats;
use crate::stats::transport::RTCTransportStats;

/// What applying a stable pair of descriptions does to one media section
#[derive(Debug, Clone)]
enum MlinePlan {
    Media {
        mline: usize,
        session_id: u32,
        /// None creates a receiver for a section only the peer knows about
        transceiver: Option<usize>,
        kind: RtpCodecKind,
        mid: String,
        current_direction: RTCRtpTransceiverDirection,
        dtls_client: bool,
        remote_fingerprint: Option<RTCDtlsFingerprint>,
        rtcp_mux: bool,
        rtcp_rsize: bool,
        ptmap: Vec<PtMapItem>,
        remote_ssrcs: Vec<SSRC>,
    },
    Application {
        mline: usize,
        session_id: u32,
        mid: String,
        dtls_client: bool,
        remote_fingerprint: Option<RTCDtlsFingerprint>,
        local_port: u16,
        remote_port: u16,
        remote_max_message_size: usize,
    },
}

impl MlinePlan {
    fn mline(&self) -> usize {
        match self {
            MlinePlan::Media { mline, .. } | MlinePlan::Application { mline, .. } => *mline,
        }
    }

    fn session_id(&self) -> u32 {
        match self {
            MlinePlan::Media { session_id, .. } | MlinePlan::Application { session_id, .. } => {
                *session_id
            }
        }
    }
}

/// PeerConnectionInternal is the connection state every operation runs
/// against. It is only ever touched by the operation thread, or under the
/// connection lock by getters.
pub(crate) struct PeerConnectionInternal {
    pub(crate) configuration: RTCConfiguration,
    certificate: RTCCertificate,
    fingerprint: RTCDtlsFingerprint,
    ice_agent: Box<dyn IceAgent>,
    sctp_transport: Option<Box<dyn SctpTransport>>,
    pub(crate) is_closed: bool,

    pub(crate) signaling_state: RTCSignalingState,
    pub(crate) ice_connection_state: RTCIceConnectionState,
    pub(crate) ice_gathering_state: RTCIceGatheringState,
    pub(crate) peer_connection_state: RTCPeerConnectionState,

    pub(crate) current_local_description: Option<RTCSessionDescription>,
    pub(crate) pending_local_description: Option<RTCSessionDescription>,
    pub(crate) current_remote_description: Option<RTCSessionDescription>,
    pub(crate) pending_remote_description: Option<RTCSessionDescription>,

    session_id: u64,
    session_version: u64,
    media_counter: u32,
    last_offer: String,
    last_answer: String,

    pub(crate) transceivers: Vec<RTCRtpTransceiver>,
    application: ApplicationSection,
    pub(crate) transports: Vec<RTCTransportStream>,
    pending_candidates: PendingIceCandidates,

    pub(crate) data_channels: BTreeMap<RTCDataChannelHandle, RTCDataChannelInternal>,
    next_data_channel_handle: RTCDataChannelHandle,
    sctp: SctpAssociation,
    dtls_client: Option<bool>,
    data_channels_opened: u32,
    data_channels_closed: u32,

    negotiation_needed: bool,
    events: Vec<RTCPeerConnectionEvent>,
    ops: OperationSender<PeerConnectionInternal>,
}

impl TaskState for PeerConnectionInternal {
    fn take_events(&mut self) -> Vec<RTCPeerConnectionEvent> {
        std::mem::take(&mut self.events)
    }
}

impl PeerConnectionInternal {
    pub(crate) fn new(
        configuration: RTCConfiguration,
        mut ice_agent: Box<dyn IceAgent>,
        sctp_transport: Option<Box<dyn SctpTransport>>,
        ops: OperationSender<PeerConnectionInternal>,
    ) -> Result<Self> {
        let certificate = match configuration.certificates.first() {
            Some(certificate) => certificate.clone(),
            None => RTCCertificate::generate()?,
        };
        let fingerprint = certificate
            .get_fingerprints()
            .into_iter()
            .next()
            .ok_or(Error::ErrSessionDescriptionNoFingerprint)?;

        if let Some(stun_server) = &configuration.stun_server {
            ice_agent.set_stun_server(stun_server)?;
        }
        if let Some(turn_server) = &configuration.turn_server {
            ice_agent.set_turn_server(turn_server)?;
        }

        Ok(Self {
            configuration,
            certificate,
            fingerprint,
            ice_agent,
            sctp_transport,
            is_closed: false,

            signaling_state: RTCSignalingState::Stable,
            ice_connection_state: RTCIceConnectionState::New,
            ice_gathering_state: RTCIceGatheringState::New,
            peer_connection_state: RTCPeerConnectionState::New,

            current_local_description: None,
            pending_local_description: None,
            current_remote_description: None,
            pending_remote_description: None,

            // 63 bits keep the session id a valid positive SDP number
            session_id: rand::random::<u64>() >> 1,
            session_version: 0,
            media_counter: 0,
            last_offer: String::new(),
            last_answer: String::new(),

            transceivers: vec![],
            application: ApplicationSection::default(),
            transports: vec![],
            pending_candidates: PendingIceCandidates::default(),

            data_channels: BTreeMap::new(),
            next_data_channel_handle: 0,
            sctp: SctpAssociation::default(),
            dtls_client: None,
            data_channels_opened: 0,
            data_channels_closed: 0,

            negotiation_needed: false,
            events: vec![],
            ops,
        })
    }

    fn check_closed(&self) -> Result<()> {
        if self.is_closed {
            Err(Error::ErrConnectionClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn local_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_local_description
            .as_ref()
            .or(self.current_local_description.as_ref())
    }

    pub(crate) fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_remote_description
            .as_ref()
            .or(self.current_remote_description.as_ref())
    }

    fn sctp_params(&self) -> SctpSdpParams {
        SctpSdpParams {
            port: self.configuration.sctp_port,
            max_message_size: self.configuration.max_message_size,
        }
    }

    pub(crate) fn create_offer(
        &mut self,
        options: Option<RTCOfferOptions>,
    ) -> Result<RTCSessionDescription> {
        self.check_closed()?;
        if !matches!(
            self.signaling_state,
            RTCSignalingState::Stable | RTCSignalingState::HaveLocalOffer
        ) {
            return Err(Error::ErrIncorrectSignalingState);
        }

        let sctp = if !self.data_channels.is_empty() || self.application.mid.is_some() {
            Some(self.sctp_params())
        } else {
            None
        };
        self.session_version += 1;

        let params = LocalSdpParams {
            name: &self.configuration.name,
            fingerprint: &self.fingerprint,
            bundle_policy: self.configuration.bundle_policy,
            session_id: self.session_id,
            session_version: self.session_version,
            ice_restart: options.is_some_and(|o| o.ice_restart),
            sctp,
        };
        let previous = self
            .pending_local_description
            .as_ref()
            .or(self.current_local_description.as_ref())
            .and_then(|d| d.parsed());

        let offer = generate_offer(
            &params,
            &mut self.transceivers,
            &mut self.application,
            &mut self.media_counter,
            previous,
        );
        debug!(
            "created offer v{} with {} media sections",
            self.session_version,
            offer.media_descriptions.len()
        );
        let offer = RTCSessionDescription::from_parsed(RTCSdpType::Offer, offer);
        self.last_offer.clone_from(&offer.sdp);
        Ok(offer)
    }

    pub(crate) fn create_answer(&mut self) -> Result<RTCSessionDescription> {
        self.check_closed()?;
        if !matches!(
            self.signaling_state,
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveLocalPranswer
        ) {
            return Err(Error::ErrIncorrectSignalingState);
        }
        let offer = self
            .pending_remote_description
            .as_ref()
            .and_then(|d| d.parsed())
            .ok_or(Error::ErrNoRemoteDescription)?;

        let sctp = if self.sctp_transport.is_some() {
            Some(self.sctp_params())
        } else {
            None
        };
        self.session_version += 1;

        let params = LocalSdpParams {
            name: &self.configuration.name,
            fingerprint: &self.fingerprint,
            bundle_policy: self.configuration.bundle_policy,
            session_id: self.session_id,
            session_version: self.session_version,
            ice_restart: false,
            sctp,
        };
        let previous = self
            .current_local_description
            .as_ref()
            .and_then(|d| d.parsed());

        let known = self.transceivers.len();
        let answer = generate_answer(
            &params,
            offer,
            &mut self.transceivers,
            &mut self.application,
            previous,
        );
        for t in &self.transceivers[known..] {
            self.events
                .push(RTCPeerConnectionEvent::OnTransceiverAdded(t.id));
        }
        debug!(
            "created answer v{} with {} media sections",
            self.session_version,
            answer.media_descriptions.len()
        );
        let answer = RTCSessionDescription::from_parsed(RTCSdpType::Answer, answer);
        self.last_answer.clone_from(&answer.sdp);
        Ok(answer)
    }

    /// set_description applies a local or remote description. Nothing is
    /// mutated unless the description passed every check.
    pub(crate) fn set_description(
        &mut self,
        mut desc: RTCSessionDescription,
        op: StateChangeOp,
    ) -> Result<()> {
        self.check_closed()?;
        let next_state = next_signaling_state(self.signaling_state, op, desc.sdp_type)?;

        if desc.sdp_type == RTCSdpType::Rollback {
            self.rollback();
            self.set_signaling_state(next_state);
            return Ok(());
        }

        // JSEP 5.4: an empty local description stands for the last one created
        if op == StateChangeOp::SetLocal && desc.sdp.is_empty() {
            match desc.sdp_type {
                RTCSdpType::Offer => desc.sdp.clone_from(&self.last_offer),
                RTCSdpType::Answer | RTCSdpType::Pranswer => desc.sdp.clone_from(&self.last_answer),
                _ => {}
            }
            desc.parsed = None;
        }
        desc.ensure_parsed()?;
        let parsed = desc
            .parsed()
            .ok_or_else(|| Error::ErrSessionDescriptionMissingSdp(desc.sdp_type.to_string()))?;

        let counterpart = if desc.sdp_type.is_answer() {
            let offer = match op {
                StateChangeOp::SetLocal => self.pending_remote_description.as_ref(),
                StateChangeOp::SetRemote => self.pending_local_description.as_ref(),
            };
            Some(
                offer
                    .and_then(|d| d.parsed())
                    .ok_or(Error::ErrNoRemoteDescription)?,
            )
        } else {
            None
        };
        validate_description(parsed, counterpart)?;
        if op == StateChangeOp::SetRemote {
            self.check_rtcp_mux_policy(parsed)?;
        }

        let plan = if next_state == RTCSignalingState::Stable {
            let (local, remote) = match (op, counterpart) {
                (StateChangeOp::SetLocal, Some(offer)) => (parsed, offer),
                (StateChangeOp::SetRemote, Some(offer)) => (offer, parsed),
                _ => return Err(Error::ErrIncorrectSignalingState),
            };
            let is_offerer = op == StateChangeOp::SetRemote;
            let plan = self.plan_stable(local, remote, is_offerer)?;
            // streams are created before any slot or state moves
            for entry in &plan {
                self.ensure_transport(entry.session_id())?;
            }
            Some(plan)
        } else {
            None
        };

        trace!("applying {} {} description", op, desc.sdp_type);
        match (op, desc.sdp_type) {
            (StateChangeOp::SetLocal, RTCSdpType::Offer) => {
                self.ice_agent.set_is_controller(true);
                self.pending_local_description = Some(desc);
            }
            (StateChangeOp::SetRemote, RTCSdpType::Offer) => {
                self.ice_agent.set_is_controller(false);
                self.pending_remote_description = Some(desc);
            }
            (StateChangeOp::SetLocal, RTCSdpType::Pranswer) => {
                self.pending_local_description = Some(desc);
            }
            (StateChangeOp::SetRemote, RTCSdpType::Pranswer) => {
                self.pending_remote_description = Some(desc);
            }
            (StateChangeOp::SetLocal, _) => {
                self.current_local_description = Some(desc);
                self.pending_local_description = None;
                if let Some(offer) = self.pending_remote_description.take() {
                    self.current_remote_description = Some(offer);
                }
            }
            (StateChangeOp::SetRemote, _) => {
                self.current_remote_description = Some(desc);
                self.pending_remote_description = None;
                if let Some(offer) = self.pending_local_description.take() {
                    self.current_local_description = Some(offer);
                }
            }
        }
        self.set_signaling_state(next_state);

        if let Some(plan) = plan {
            self.enter_stable(plan)?;
        }
        Ok(())
    }

    fn check_rtcp_mux_policy(&self, desc: &SessionDescription) -> Result<()> {
        if self.configuration.rtcp_mux_policy != RTCRtcpMuxPolicy::Require {
            return Ok(());
        }
        for (i, media) in desc.media_descriptions.iter().enumerate() {
            if media.is_rejected() || is_application(media) {
                continue;
            }
            if media.attribute(ATTR_KEY_RTCP_MUX).is_none() {
                return Err(Error::ErrSdpInvalidValue(format!(
                    "rtcp-mux is required but missing on mline {i}"
                )));
            }
        }
        Ok(())
    }

    fn set_signaling_state(&mut self, state: RTCSignalingState) {
        if self.signaling_state != state {
            info!("signaling state changed: {} -> {}", self.signaling_state, state);
        }
        self.signaling_state = state;
        self.events
            .push(RTCPeerConnectionEvent::OnSignalingStateChangeEvent(state));
    }

    /// rollback drops the pending descriptions and unbinds whatever was
    /// only associated through them
    fn rollback(&mut self) {
        self.pending_local_description = None;
        self.pending_remote_description = None;

        let negotiated: Vec<String> = [
            self.current_local_description.as_ref(),
            self.current_remote_description.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(|d| d.parsed())
        .flat_map(|d| d.media_descriptions.iter())
        .filter_map(|m| m.mid().map(str::to_owned))
        .collect();

        for t in &mut self.transceivers {
            let keep = t.mid.as_ref().is_some_and(|mid| negotiated.contains(mid));
            if !keep && t.is_associated() {
                debug!("rollback unbinds {t}");
                t.mid = None;
                t.mline = None;
            }
        }
        let keep = self
            .application
            .mid
            .as_ref()
            .is_some_and(|mid| negotiated.contains(mid));
        if !keep {
            self.application = ApplicationSection::default();
        }

        if self.negotiation_needed {
            self.negotiation_needed = false;
            self.update_negotiation_needed();
        }
    }

    /// plan_stable works out, section by section, what the pair of
    /// descriptions about to become current means for transceivers and
    /// transports. Errors leave the connection untouched.
    fn plan_stable(
        &self,
        local: &SessionDescription,
        remote: &SessionDescription,
        is_offerer: bool,
    ) -> Result<Vec<MlinePlan>> {
        let answer = if is_offerer { remote } else { local };
        let bundle: Vec<&str> = answer.bundle_group().unwrap_or_default();
        let bundle_tag = bundle.first().and_then(|tag| {
            answer
                .media_descriptions
                .iter()
                .position(|m| m.mid() == Some(*tag))
        });

        let mut plan = vec![];
        let mut claimed: Vec<usize> = vec![];
        for (i, remote_media) in remote.media_descriptions.iter().enumerate() {
            let Some(local_media) = local.media_descriptions.get(i) else {
                warn!("mline {i} missing from the local description, skipping");
                continue;
            };
            if remote_media.is_rejected() || local_media.is_rejected() {
                continue;
            }
            let Some(mid) = remote_media.mid().or(local_media.mid()) else {
                return Err(Error::ErrSessionDescriptionMissingMid(i));
            };

            let session_id = match bundle_tag {
                Some(tag) if bundle.contains(&mid) => tag as u32,
                _ => i as u32,
            };

            let local_setup = setup_of(local, local_media);
            let remote_setup = setup_of(remote, remote_media);
            let setup = get_final_setup(local_setup, remote_setup);
            if setup == ConnectionRole::Unspecified {
                return Err(Error::ErrSessionDescriptionConflictingSetup(
                    i,
                    local_setup.to_string(),
                    remote_setup.to_string(),
                ));
            }
            let dtls_client = setup == ConnectionRole::Active;
            let remote_fingerprint = fingerprint_of(remote, remote_media);

            if is_application(remote_media) {
                plan.push(MlinePlan::Application {
                    mline: i,
                    session_id,
                    mid: mid.to_owned(),
                    dtls_client,
                    remote_fingerprint,
                    local_port: sctp_port_of(local_media),
                    remote_port: sctp_port_of(remote_media),
                    remote_max_message_size: max_message_size_of(remote_media),
                });
                continue;
            }

            let kind = RtpCodecKind::from(remote_media.media_name.media.as_str());
            let transceiver = find_by_mid(mid, &self.transceivers)
                .or_else(|| find_by_mline(i, &self.transceivers))
                .or_else(|| {
                    self.transceivers.iter().position(|t| {
                        !t.stopped && !t.is_associated() && t.kind == kind && !claimed.contains(&t.id)
                    })
                });
            if transceiver.is_none() && is_offerer {
                return Err(Error::ErrRTPTransceiverNotFound);
            }
            if let Some(index) = transceiver {
                claimed.push(index);
            }

            let local_direction = section_direction(local_media);
            let remote_direction = section_direction(remote_media);
            let current_direction = get_final_direction(local_direction, remote_direction);
            if let Some(t) = transceiver.map(|index| &self.transceivers[index]) {
                if t.current_direction != RTCRtpTransceiverDirection::Unspecified
                    && current_direction != RTCRtpTransceiverDirection::Unspecified
                    && t.current_direction != current_direction
                {
                    return Err(Error::ErrRenegotiationDirectionChange(t.to_string()));
                }
            }

            let ptmap = remote_media
                .codecs()
                .iter()
                .map(|c| {
                    let codec = RTCRtpCodec::from_sdp(kind, c);
                    PtMapItem {
                        pt: codec.payload_type,
                        codec,
                    }
                })
                .collect();

            plan.push(MlinePlan::Media {
                mline: i,
                session_id,
                transceiver,
                kind,
                mid: mid.to_owned(),
                current_direction,
                dtls_client,
                remote_fingerprint,
                rtcp_mux: remote_media.attribute(ATTR_KEY_RTCP_MUX).is_some()
                    && local_media.attribute(ATTR_KEY_RTCP_MUX).is_some(),
                rtcp_rsize: remote_media.attribute(ATTR_KEY_RTCP_RSIZE).is_some()
                    && local_media.attribute(ATTR_KEY_RTCP_RSIZE).is_some(),
                ptmap,
                remote_ssrcs: remote_ssrcs_of(remote_media),
            });
        }
        Ok(plan)
    }

    /// enter_stable runs every side effect of a pair of descriptions
    /// becoming current
    fn enter_stable(&mut self, plan: Vec<MlinePlan>) -> Result<()> {
        let (local, remote) = match (
            self.current_local_description
                .as_ref()
                .and_then(|d| d.parsed())
                .cloned(),
            self.current_remote_description
                .as_ref()
                .and_then(|d| d.parsed())
                .cloned(),
        ) {
            (Some(local), Some(remote)) => (local, remote),
            _ => return Err(Error::ErrNoRemoteDescription),
        };

        let mut receiving: BTreeMap<u32, bool> = BTreeMap::new();
        let mut session_ids: Vec<u32> = vec![];
        for entry in &plan {
            let session_id = entry.session_id();
            if !session_ids.contains(&session_id) {
                session_ids.push(session_id);
            }
            let index = self.ensure_transport(session_id)?;
            match entry.clone() {
                MlinePlan::Media {
                    mline,
                    transceiver,
                    kind,
                    mid,
                    current_direction,
                    dtls_client,
                    remote_fingerprint,
                    rtcp_mux,
                    rtcp_rsize,
                    ptmap,
                    remote_ssrcs,
                    ..
                } => {
                    let t_index = match transceiver {
                        Some(t_index) => t_index,
                        None => {
                            let id = self.transceivers.len();
                            let t = RTCRtpTransceiver::new(
                                id,
                                kind,
                                RTCRtpTransceiverInit {
                                    direction: RTCRtpTransceiverDirection::Recvonly,
                                    codecs: ptmap.iter().map(|item| item.codec.clone()).collect(),
                                    ..Default::default()
                                },
                            );
                            debug!("created {t} for mline {mline}");
                            self.transceivers.push(t);
                            self.events
                                .push(RTCPeerConnectionEvent::OnTransceiverAdded(id));
                            id
                        }
                    };

                    let t = &mut self.transceivers[t_index];
                    t.mid = Some(mid);
                    t.mline = Some(mline);
                    t.session_id = Some(session_id);
                    t.remote_ssrcs = remote_ssrcs.clone();
                    if t.current_direction != current_direction {
                        debug!("{t} negotiated {current_direction}");
                        t.current_direction = current_direction;
                    }

                    let stream = &mut self.transports[index];
                    if session_id as usize == mline {
                        stream.set_rtcp_mux(rtcp_mux);
                        stream.rtcp_rsize = rtcp_rsize;
                    }
                    stream.set_dtls_client(dtls_client);
                    stream.rtp_dtls.set_remote_fingerprint(remote_fingerprint.clone());
                    stream.rtcp_dtls.set_remote_fingerprint(remote_fingerprint);
                    for item in ptmap {
                        stream.ptmap.retain(|existing| existing.pt != item.pt);
                        stream.ptmap.push(item);
                    }
                    for ssrc in remote_ssrcs {
                        stream.remote_ssrc_map.insert(ssrc, mline);
                    }
                    *receiving.entry(session_id).or_default() |= current_direction.has_recv();
                }
                MlinePlan::Application {
                    mline,
                    mid,
                    dtls_client,
                    remote_fingerprint,
                    local_port,
                    remote_port,
                    remote_max_message_size,
                    ..
                } => {
                    self.application.mid = Some(mid);
                    self.application.mline = Some(mline);

                    let stream = &mut self.transports[index];
                    stream.set_dtls_client(dtls_client);
                    stream.rtp_dtls.set_remote_fingerprint(remote_fingerprint.clone());
                    stream.rtcp_dtls.set_remote_fingerprint(remote_fingerprint);
                    if session_id as usize == mline {
                        stream.set_rtcp_mux(true);
                    }
                    receiving.entry(session_id).or_default();

                    self.sctp.session_id = Some(session_id);
                    self.sctp.local_port = local_port;
                    self.sctp.remote_port = remote_port;
                    self.sctp.max_message_size = effective_max_message_size(
                        self.configuration.max_message_size,
                        Some(remote_max_message_size),
                    );
                    self.dtls_client = Some(dtls_client);
                }
            }
        }

        for (session_id, receives) in receiving {
            if let Some(stream) = self.transport_mut(session_id) {
                stream.receive_bin.set_receive_state(if receives {
                    RTCReceiveState::Pass
                } else {
                    RTCReceiveState::Drop
                });
            }
        }

        for session_id in session_ids {
            self.start_ice(session_id, &local, &remote, &plan)?;
        }

        if !self.pending_candidates.is_empty() {
            debug!(
                "applying {} buffered remote candidates",
                self.pending_candidates.len()
            );
        }
        for pending in self.pending_candidates.take() {
            self.add_remote_candidate(pending.mline_index, &pending.candidate);
        }

        self.assign_data_channel_ids();
        if self.application.mline.is_some() && !self.sctp.is_started() {
            self.start_sctp()?;
        }

        self.update_ice_connection_state();
        self.update_ice_gathering_state();
        self.update_connection_state();

        self.negotiation_needed = false;
        self.update_negotiation_needed();
        Ok(())
    }

    fn transport_mut(&mut self, session_id: u32) -> Option<&mut RTCTransportStream> {
        self.transports
            .iter_mut()
            .find(|stream| stream.session_id == session_id)
    }

    /// ensure_transport returns the index of the transport stream for
    /// `session_id`, asking the ICE agent for a new stream the first time
    fn ensure_transport(&mut self, session_id: u32) -> Result<usize> {
        if let Some(index) = self
            .transports
            .iter()
            .position(|stream| stream.session_id == session_id)
        {
            return Ok(index);
        }

        let stream_id = self.ice_agent.add_stream(session_id)?;
        debug!("created transport stream {session_id} on ice stream {stream_id}");
        self.transports.push(RTCTransportStream::new(
            IceStreamItem {
                session_id,
                stream_id,
            },
            self.certificate.clone(),
        ));
        Ok(self.transports.len() - 1)
    }

    /// start_ice installs the credentials of the section owning the
    /// transport and starts gathering and checks on it
    fn start_ice(
        &mut self,
        session_id: u32,
        local: &SessionDescription,
        remote: &SessionDescription,
        plan: &[MlinePlan],
    ) -> Result<()> {
        let owner = session_id as usize;
        let (Some(local_media), Some(remote_media)) = (
            local.media_descriptions.get(owner),
            remote.media_descriptions.get(owner),
        ) else {
            return Err(Error::ErrSessionDescriptionMissingMid(owner));
        };
        let local_credentials = credentials_of(local_media);
        let remote_credentials = credentials_of(remote_media);

        let Some(index) = self
            .transports
            .iter()
            .position(|stream| stream.session_id == session_id)
        else {
            return Ok(());
        };
        let stream_id = self.transports[index].ice_stream.stream_id;

        if self.transports[index].local_credentials != local_credentials {
            if let Some(credentials) = &local_credentials {
                self.ice_agent
                    .set_local_credentials(stream_id, &credentials.ufrag, &credentials.pwd)?;
            }
            self.transports[index].local_credentials = local_credentials;
        }

        let remote_changed = self.transports[index].remote_credentials != remote_credentials;
        if remote_changed {
            if let Some(credentials) = &remote_credentials {
                self.ice_agent
                    .set_remote_credentials(stream_id, &credentials.ufrag, &credentials.pwd)?;
            }
            self.transports[index].remote_credentials = remote_credentials;
        }

        self.ice_agent.find_transport(stream_id, RTCIceComponent::Rtp)?;
        if !self.transports[index].rtcp_mux {
            self.ice_agent.find_transport(stream_id, RTCIceComponent::Rtcp)?;
        }
        if !self.transports[index].gathering_started {
            self.ice_agent.gather_candidates(stream_id)?;
            self.transports[index].gathering_started = true;
        }

        if remote_changed {
            for entry in plan.iter().filter(|entry| entry.session_id() == session_id) {
                let Some(media) = remote.media_descriptions.get(entry.mline()) else {
                    continue;
                };
                for value in media.attributes_with_key(ATTR_KEY_CANDIDATE) {
                    let candidate = format!("{ATTR_KEY_CANDIDATE}:{value}");
                    if let Err(err) = self.ice_agent.add_candidate(stream_id, &candidate) {
                        warn!("failed to add remote candidate {candidate}: {err}");
                    }
                }
            }
        }
        Ok(())
    }

    /// session_for_mline finds the transport stream a section is bound to
    fn session_for_mline(&self, mline: usize) -> Option<u32> {
        if let Some(index) = find_by_mline(mline, &self.transceivers) {
            return self.transceivers[index].session_id;
        }
        if self.application.mline == Some(mline) {
            return self.sctp.session_id;
        }
        None
    }

    /// mline_for_session is the first section using a transport stream
    fn mline_for_session(&self, session_id: u32) -> Option<usize> {
        let media = self
            .transceivers
            .iter()
            .filter(|t| t.session_id == Some(session_id))
            .filter_map(|t| t.mline);
        let application = self
            .application
            .mline
            .filter(|_| self.sctp.session_id == Some(session_id));
        media.chain(application).min()
    }

    pub(crate) fn add_ice_candidate(&mut self, mline_index: usize, candidate: &str) -> Result<()> {
        self.check_closed()?;
        let candidate = normalize_candidate(candidate);
        if candidate.is_empty() {
            trace!("ignoring end-of-candidates for mline {mline_index}");
            return Ok(());
        }

        if self.current_local_description.is_none() || self.current_remote_description.is_none()
        {
            self.pending_candidates.push(mline_index, candidate);
            return Ok(());
        }
        self.add_remote_candidate(mline_index, &candidate);
        Ok(())
    }

    fn add_remote_candidate(&mut self, mline_index: usize, candidate: &str) {
        let Some(session_id) = self.session_for_mline(mline_index) else {
            warn!("no transport for candidate on mline {mline_index}, dropping {candidate}");
            return;
        };
        let Some(stream_id) = self
            .transports
            .iter()
            .find(|stream| stream.session_id == session_id)
            .map(|stream| stream.ice_stream.stream_id)
        else {
            warn!("transport stream {session_id} is gone, dropping {candidate}");
            return;
        };
        trace!("adding remote candidate to stream {stream_id}: {candidate}");
        if let Err(err) = self.ice_agent.add_candidate(stream_id, candidate) {
            warn!("failed to add remote candidate {candidate}: {err}");
        }
    }

    pub(crate) fn add_transceiver(
        &mut self,
        kind: RtpCodecKind,
        mut init: RTCRtpTransceiverInit,
    ) -> Result<RTCRtpTransceiver> {
        self.check_closed()?;
        if kind == RtpCodecKind::Unspecified {
            return Err(Error::ErrRTPTransceiverCodecUnsupported);
        }
        if init.direction == RTCRtpTransceiverDirection::Unspecified {
            init.direction = RTCRtpTransceiverDirection::Sendrecv;
        }

        let t = RTCRtpTransceiver::new(self.transceivers.len(), kind, init);
        debug!("added {t}");
        self.transceivers.push(t.clone());
        self.update_negotiation_needed();
        Ok(t)
    }

    pub(crate) fn stop_transceiver(&mut self, id: RTCRtpTransceiverId) -> Result<()> {
        self.check_closed()?;
        let t = self
            .transceivers
            .get_mut(id)
            .ok_or(Error::ErrRTPTransceiverNotFound)?;
        if t.stopped {
            return Ok(());
        }
        t.stop();
        debug!("stopped {t}");
        self.update_negotiation_needed();
        Ok(())
    }

    pub(crate) fn create_data_channel(
        &mut self,
        label: String,
        init: RTCDataChannelInit,
    ) -> Result<RTCDataChannelHandle> {
        self.check_closed()?;
        let handle = self.next_data_channel_handle;
        let mut dc = RTCDataChannelInternal::new(handle, label, init)?;

        match dc.id {
            Some(id) => {
                if id >= self.configuration.max_data_channels {
                    return Err(Error::ErrMaxDataChannelID);
                }
                if self.is_data_channel_id_in_use(id) {
                    return Err(Error::ErrDataChannelIdInUse(id));
                }
            }
            None => {
                if let Some(is_client) = self.dtls_client {
                    dc.id = Some(allocate_data_channel_id(
                        is_client,
                        self.configuration.max_data_channels,
                        |id| self.is_data_channel_id_in_use(id),
                    )?);
                }
            }
        }

        debug!("created data channel {} with handle {handle}", dc.label);
        self.next_data_channel_handle += 1;
        self.data_channels.insert(handle, dc);

        if self.sctp.is_established() {
            self.dial_data_channel(handle);
        }
        self.update_negotiation_needed();
        Ok(handle)
    }

    /// ids of closed channels are free again, their streams were reset
    fn is_data_channel_id_in_use(&self, id: RTCDataChannelId) -> bool {
        self.data_channels
            .values()
            .any(|dc| dc.id == Some(id) && dc.ready_state() != RTCDataChannelState::Closed)
    }

    /// assign_data_channel_ids gives every channel created before the DTLS
    /// role was known an id of the right parity
    fn assign_data_channel_ids(&mut self) {
        let Some(is_client) = self.dtls_client else {
            return;
        };
        let waiting: Vec<RTCDataChannelHandle> = self
            .data_channels
            .values()
            .filter(|dc| dc.id.is_none() && !dc.closed_early)
            .map(|dc| dc.handle)
            .collect();

        for handle in waiting {
            let result = allocate_data_channel_id(
                is_client,
                self.configuration.max_data_channels,
                |id| self.is_data_channel_id_in_use(id),
            );
            match result {
                Ok(id) => {
                    if let Some(dc) = self.data_channels.get_mut(&handle) {
                        debug!("data channel {} gets id {id}", dc.label);
                        dc.id = Some(id);
                    }
                }
                Err(err) => self.fail_data_channel(handle, err),
            }
        }
    }

    fn fail_data_channel(&mut self, handle: RTCDataChannelHandle, err: Error) {
        let Some(dc) = self.data_channels.get_mut(&handle) else {
            return;
        };
        warn!("data channel {} failed: {err}", dc.label);
        dc.closed_early = true;
        self.events.push(RTCPeerConnectionEvent::OnDataChannel(
            RTCDataChannelEvent::OnError(handle, err.to_string()),
        ));
        self.events.push(RTCPeerConnectionEvent::OnDataChannel(
            RTCDataChannelEvent::OnClose(handle),
        ));
    }

    fn start_sctp(&mut self) -> Result<()> {
        let Some(sctp_transport) = self.sctp_transport.as_mut() else {
            warn!("data channel section negotiated without an sctp transport");
            return Ok(());
        };
        debug!(
            "starting sctp association {} -> {}",
            self.sctp.local_port, self.sctp.remote_port
        );
        sctp_transport.start(
            self.sctp.local_port,
            self.sctp.remote_port,
            self.sctp.max_message_size,
        )?;
        self.sctp.set_state(RTCSctpTransportState::Connecting);
        Ok(())
    }

    fn dial_data_channel(&mut self, handle: RTCDataChannelHandle) {
        let max_message_size = self.sctp.max_message_size;
        let Some(dc) = self.data_channels.get_mut(&handle) else {
            return;
        };
        if !dc.is_dialable() {
            return;
        }
        match dc.dial(max_message_size) {
            Ok(()) => self.flush_data_channel(handle),
            Err(err) => self.fail_data_channel(handle, err),
        }
    }

    pub(crate) fn send_data_channel(
        &mut self,
        handle: RTCDataChannelHandle,
        msg: DataChannelMessage,
    ) -> Result<()> {
        self.check_closed()?;
        let dc = self
            .data_channels
            .get_mut(&handle)
            .ok_or(Error::ErrDataChannelNotExisted)?;
        match dc.data_channel.as_mut() {
            Some(data_channel) => data_channel.handle_write(msg)?,
            None if dc.closed_early => return Err(Error::ErrDataChannelClosed),
            None => return Err(Error::ErrDataChannelNotOpen),
        }
        self.flush_data_channel(handle);
        Ok(())
    }

    pub(crate) fn close_data_channel(&mut self, handle: RTCDataChannelHandle) -> Result<()> {
        self.check_closed()?;
        let dc = self
            .data_channels
            .get_mut(&handle)
            .ok_or(Error::ErrDataChannelNotExisted)?;
        if dc.close()? {
            self.events.push(RTCPeerConnectionEvent::OnDataChannel(
                RTCDataChannelEvent::OnClose(handle),
            ));
        }
        self.flush_data_channel(handle);
        Ok(())
    }

    pub(crate) fn set_buffered_amount_low_threshold(
        &mut self,
        handle: RTCDataChannelHandle,
        threshold: usize,
    ) -> Result<()> {
        self.data_channels
            .get_mut(&handle)
            .ok_or(Error::ErrDataChannelNotExisted)?
            .set_buffered_amount_low_threshold(threshold);
        self.flush_data_channel(handle);
        Ok(())
    }

    /// flush_data_channel moves everything a channel produced to where it
    /// belongs: messages to the SCTP transport, data and state changes to
    /// the application
    fn flush_data_channel(&mut self, handle: RTCDataChannelHandle) {
        let Some(dc) = self.data_channels.get_mut(&handle) else {
            return;
        };
        let Some(data_channel) = dc.data_channel.as_mut() else {
            return;
        };

        while let Some(msg) = data_channel.poll_write() {
            let ppi = msg.ppi;
            let result = match self.sctp_transport.as_mut() {
                Some(sctp_transport) => sctp_transport.send(&msg),
                None => Err(Error::ErrMissingCollaborator("sctp transport".to_owned())),
            };
            let evt = match result {
                Ok(()) => DataChannelTransportEvent::Transmitted(ppi),
                Err(err) => DataChannelTransportEvent::SendFailed(err.to_string()),
            };
            if let Err(err) = data_channel.handle_event(evt) {
                warn!("data channel {handle}: {err}");
            }
        }

        while let Some(msg) = data_channel.poll_read() {
            self.events.push(RTCPeerConnectionEvent::OnDataChannel(
                RTCDataChannelEvent::OnMessage(handle, msg.into()),
            ));
        }

        while let Some(evt) = data_channel.poll_event() {
            let evt = match evt {
                DataChannelEvent::Open => {
                    self.data_channels_opened += 1;
                    RTCDataChannelEvent::OnOpen(handle)
                }
                DataChannelEvent::BufferedAmountLow => {
                    RTCDataChannelEvent::OnBufferedAmountLow(handle)
                }
                DataChannelEvent::Error(err) => RTCDataChannelEvent::OnError(handle, err),
                DataChannelEvent::ResetStream => {
                    let stream_id = data_channel.stream_identifier();
                    if let Some(sctp_transport) = self.sctp_transport.as_mut() {
                        if let Err(err) = sctp_transport.reset_stream(stream_id) {
                            warn!("failed to reset sctp stream {stream_id}: {err}");
                        }
                    }
                    continue;
                }
                DataChannelEvent::Close => {
                    self.data_channels_closed += 1;
                    RTCDataChannelEvent::OnClose(handle)
                }
            };
            self.events.push(RTCPeerConnectionEvent::OnDataChannel(evt));
        }
    }

    fn flush_data_channels(&mut self) {
        let handles: Vec<RTCDataChannelHandle> = self.data_channels.keys().copied().collect();
        for handle in handles {
            self.flush_data_channel(handle);
        }
    }

    fn data_channel_by_stream(&self, stream_id: RTCDataChannelId) -> Option<RTCDataChannelHandle> {
        self.data_channels
            .values()
            .find(|dc| {
                dc.id == Some(stream_id)
                    && dc.data_channel.is_some()
                    && dc.ready_state() != RTCDataChannelState::Closed
            })
            .map(|dc| dc.handle)
    }

    /// handle_transport_event folds a notification of the ICE agent, the
    /// DTLS transports or the SCTP association into the connection state
    pub(crate) fn handle_transport_event(&mut self, evt: RTCTransportEvent) {
        if self.is_closed {
            trace!("connection closed, dropping {evt:?}");
            return;
        }

        match evt {
            RTCTransportEvent::OnCandidate {
                session_id,
                candidate,
            } => {
                let Some(mline_index) = self.mline_for_session(session_id) else {
                    warn!("local candidate for unknown transport stream {session_id}");
                    return;
                };
                self.events.push(RTCPeerConnectionEvent::OnIceCandidateEvent(
                    RTCIceCandidateEvent {
                        mline_index,
                        candidate: normalize_candidate(&candidate),
                    },
                ));
            }
            RTCTransportEvent::OnConnectionStateChange {
                session_id,
                component,
                state,
            } => {
                let changed = self
                    .transport_mut(session_id)
                    .is_some_and(|stream| stream.set_ice_state(component, state));
                if changed {
                    debug!("ice {component} of stream {session_id} is {state}");
                    self.update_ice_connection_state();
                    self.update_connection_state();
                }
            }
            RTCTransportEvent::OnGatheringStateChange {
                session_id,
                component,
                state,
            } => {
                let changed = self
                    .transport_mut(session_id)
                    .is_some_and(|stream| stream.set_gathering_state(component, state));
                if changed {
                    self.update_ice_gathering_state();
                }
            }
            RTCTransportEvent::OnDtlsStateChange {
                session_id,
                component,
                state,
            } => {
                let changed = self
                    .transport_mut(session_id)
                    .is_some_and(|stream| stream.set_dtls_state(component, state));
                if changed {
                    self.update_connection_state();
                }
            }
            RTCTransportEvent::OnKeySet {
                session_id,
                component,
            } => {
                if let Some(stream) = self.transport_mut(session_id) {
                    stream.set_key(component);
                }
            }
            RTCTransportEvent::OnDtlsRoleChange {
                session_id,
                component,
                is_client,
            } => {
                if let Some(stream) = self.transport_mut(session_id) {
                    stream.dtls_mut(component).set_client(is_client);
                }
                if self.sctp.session_id == Some(session_id) && component == RTCIceComponent::Rtp {
                    self.dtls_client = Some(is_client);
                    self.assign_data_channel_ids();
                }
            }
            RTCTransportEvent::OnRemoteCertificate {
                session_id,
                component,
                der,
            } => {
                let result = self
                    .transport_mut(session_id)
                    .map(|stream| stream.dtls_mut(component).set_remote_certificate(der));
                if let Some(Err(err)) = result {
                    warn!("remote certificate of stream {session_id} rejected: {err}");
                    self.update_connection_state();
                }
            }
            RTCTransportEvent::OnAssociationEstablished => {
                self.sctp.set_state(RTCSctpTransportState::Connected);
                let handles: Vec<RTCDataChannelHandle> = self
                    .data_channels
                    .values()
                    .filter(|dc| dc.is_dialable())
                    .map(|dc| dc.handle)
                    .collect();
                for handle in handles {
                    self.dial_data_channel(handle);
                }
            }
            RTCTransportEvent::OnAssociationClosed => {
                self.sctp.set_state(RTCSctpTransportState::Closed);
                for dc in self.data_channels.values_mut() {
                    if let Some(data_channel) = dc.data_channel.as_mut() {
                        if let Err(err) =
                            data_channel.handle_event(DataChannelTransportEvent::AssociationClosed)
                        {
                            warn!("data channel {}: {err}", dc.label);
                        }
                    }
                }
                self.flush_data_channels();
            }
            RTCTransportEvent::OnStreamReset { stream_id } => {
                let Some(handle) = self.data_channel_by_stream(stream_id) else {
                    debug!("reset of unknown sctp stream {stream_id}");
                    return;
                };
                self.with_data_channel(handle, DataChannelTransportEvent::StreamReset);
            }
            RTCTransportEvent::OnSendComplete { stream_id, bytes } => {
                if let Some(handle) = self.data_channel_by_stream(stream_id) {
                    self.with_data_channel(handle, DataChannelTransportEvent::SendComplete(bytes));
                }
            }
            RTCTransportEvent::OnMessage {
                stream_id,
                ppi,
                payload,
            } => self.handle_sctp_message(stream_id, ppi, payload),
        }
    }

    fn with_data_channel(&mut self, handle: RTCDataChannelHandle, evt: DataChannelTransportEvent) {
        if let Some(data_channel) = self
            .data_channels
            .get_mut(&handle)
            .and_then(|dc| dc.data_channel.as_mut())
        {
            if let Err(err) = data_channel.handle_event(evt) {
                warn!("data channel {handle}: {err}");
            }
        }
        self.flush_data_channel(handle);
    }

    fn handle_sctp_message(
        &mut self,
        stream_id: RTCDataChannelId,
        ppi: PayloadProtocolIdentifier,
        payload: BytesMut,
    ) {
        if let Some(handle) = self.data_channel_by_stream(stream_id) {
            if let Some(data_channel) = self
                .data_channels
                .get_mut(&handle)
                .and_then(|dc| dc.data_channel.as_mut())
            {
                let msg = DataChannelMessage {
                    stream_id,
                    ppi,
                    payload,
                    ..Default::default()
                };
                if let Err(err) = data_channel.handle_read(msg) {
                    warn!("data channel {handle} on stream {stream_id}: {err}");
                }
            }
            self.flush_data_channel(handle);
            return;
        }

        if ppi != PayloadProtocolIdentifier::Dcep {
            warn!("dropping message for unknown sctp stream {stream_id}");
            return;
        }
        if self.is_data_channel_id_in_use(stream_id) {
            warn!("{}", Error::ErrDataChannelIdInUse(stream_id));
            return;
        }

        let handle = self.next_data_channel_handle;
        match RTCDataChannelInternal::accept(
            handle,
            stream_id,
            ppi,
            &payload,
            self.sctp.max_message_size,
        ) {
            Ok(dc) => {
                self.next_data_channel_handle += 1;
                self.data_channels.insert(handle, dc);
                self.flush_data_channel(handle);
            }
            Err(err) => warn!("rejected data channel on stream {stream_id}: {err}"),
        }
    }

    fn update_ice_connection_state(&mut self) {
        let state = RTCIceConnectionState::collate(
            self.transports.iter().flat_map(|stream| stream.ice_states()),
            self.is_closed,
        );
        if state != self.ice_connection_state {
            info!("ICE connection state changed: {state}");
            self.ice_connection_state = state;
            self.events
                .push(RTCPeerConnectionEvent::OnIceConnectionStateChangeEvent(state));
        }
    }

    fn update_ice_gathering_state(&mut self) {
        let state = RTCIceGatheringState::collate(
            self.transports
                .iter()
                .flat_map(|stream| stream.gathering_states()),
        );
        if state != self.ice_gathering_state {
            info!("ICE gathering state changed: {state}");
            self.ice_gathering_state = state;
            self.events
                .push(RTCPeerConnectionEvent::OnIceGatheringStateChangeEvent(state));
        }
    }

    fn update_connection_state(&mut self) {
        let ice_states: Vec<_> = self
            .transports
            .iter()
            .flat_map(|stream| stream.ice_states())
            .collect();
        let dtls_states: Vec<_> = self
            .transports
            .iter()
            .flat_map(|stream| stream.dtls_states())
            .collect();
        let state = RTCPeerConnectionState::collate(&ice_states, &dtls_states, self.is_closed);
        if state != self.peer_connection_state {
            info!("peer connection state changed: {state}");
            self.peer_connection_state = state;
            self.events
                .push(RTCPeerConnectionEvent::OnConnectionStateChangeEvent(state));
        }
    }

    /// update_negotiation_needed flags the connection and queues the event
    /// the first time something needs negotiating
    pub(crate) fn update_negotiation_needed(&mut self) {
        if self.is_closed || self.negotiation_needed || !self.check_negotiation_needed() {
            return;
        }
        self.negotiation_needed = true;
        let queued = self.ops.enqueue("negotiation_needed", |pc: &mut PeerConnectionInternal| {
            pc.fire_negotiation_needed();
            None
        });
        if !queued {
            trace!("operation queue closed, negotiation-needed dropped");
        }
    }

    fn fire_negotiation_needed(&mut self) {
        if self.is_closed || !self.negotiation_needed {
            return;
        }
        if self.signaling_state != RTCSignalingState::Stable {
            trace!("negotiation-needed deferred until stable");
            return;
        }
        if !self.check_negotiation_needed() {
            self.negotiation_needed = false;
            return;
        }
        debug!("negotiation needed");
        self.events
            .push(RTCPeerConnectionEvent::OnNegotiationNeededEvent);
    }

    fn check_negotiation_needed(&self) -> bool {
        let (Some(local), Some(remote)) = (
            self.current_local_description.as_ref(),
            self.current_remote_description.as_ref(),
        ) else {
            return true;
        };
        let (Some(local_sdp), Some(remote_sdp)) = (local.parsed(), remote.parsed()) else {
            return true;
        };

        if !self.data_channels.is_empty() && self.application.mline.is_none() {
            return true;
        }

        for t in &self.transceivers {
            let section = t.mline.and_then(|mline| local_sdp.media_descriptions.get(mline));
            if t.stopped {
                if section.is_some_and(|media| !media.is_rejected() && media.mid() == t.mid()) {
                    return true;
                }
                continue;
            }
            let Some(local_media) = section else {
                return true;
            };

            let local_direction = section_direction(local_media);
            let expected = if local.sdp_type == RTCSdpType::Offer {
                t.direction
            } else {
                let offered = t
                    .mline
                    .and_then(|mline| remote_sdp.media_descriptions.get(mline))
                    .map(section_direction)
                    .unwrap_or(RTCRtpTransceiverDirection::Sendrecv);
                intersect_answer_directions(offered, t.direction)
            };
            if expected != local_direction {
                return true;
            }
        }
        false
    }

    pub(crate) fn get_stats(
        &self,
        transceiver: Option<RTCRtpTransceiverId>,
    ) -> Result<RTCStatsReport> {
        let now = SystemTime::now();
        let peer_connection = RTCPeerConnectionStats::new(
            now,
            self.data_channels_opened,
            self.data_channels_closed,
            self.signaling_state,
        );

        let report = match transceiver {
            None => RTCStatsReport {
                peer_connection,
                transports: self
                    .transports
                    .iter()
                    .map(|stream| RTCTransportStats::new(now, stream))
                    .collect(),
                transceivers: self
                    .transceivers
                    .iter()
                    .map(|t| RTCTransceiverStats::new(now, t))
                    .collect(),
                data_channels: self
                    .data_channels
                    .values()
                    .map(|dc| RTCDataChannelStats::new(now, dc))
                    .collect(),
            },
            Some(id) => {
                let t = self
                    .transceivers
                    .get(id)
                    .ok_or(Error::ErrRTPTransceiverNotFound)?;
                RTCStatsReport {
                    peer_connection,
                    transports: self
                        .transports
                        .iter()
                        .filter(|stream| t.session_id == Some(stream.session_id))
                        .map(|stream| RTCTransportStats::new(now, stream))
                        .collect(),
                    transceivers: vec![RTCTransceiverStats::new(now, t)],
                    data_channels: vec![],
                }
            }
        };
        Ok(report)
    }

    /// close tears down every transport and collaborator. Closing twice is
    /// a no-op.
    pub(crate) fn close(&mut self) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }
        info!("closing peer connection");

        for dc in self.data_channels.values_mut() {
            match dc.data_channel.as_mut() {
                Some(data_channel) => {
                    if data_channel.state() != datachannel::data_channel::DataChannelState::Closed
                    {
                        if let Err(err) =
                            data_channel.handle_event(DataChannelTransportEvent::AssociationClosed)
                        {
                            warn!("data channel {}: {err}", dc.label);
                        }
                    }
                }
                None if !dc.closed_early => {
                    dc.closed_early = true;
                    self.events.push(RTCPeerConnectionEvent::OnDataChannel(
                        RTCDataChannelEvent::OnClose(dc.handle),
                    ));
                }
                None => {}
            }
        }
        self.flush_data_channels();

        self.is_closed = true;
        self.set_signaling_state(RTCSignalingState::Closed);
        for t in &mut self.transceivers {
            t.stop();
        }
        for stream in &mut self.transports {
            stream.close();
        }
        self.sctp.set_state(RTCSctpTransportState::Closed);
        self.pending_candidates.take();

        let mut errs = vec![];
        if let Some(sctp_transport) = self.sctp_transport.as_mut() {
            if let Err(err) = sctp_transport.close() {
                errs.push(err);
            }
        }
        if let Err(err) = self.ice_agent.close() {
            errs.push(err);
        }

        self.update_ice_connection_state();
        self.update_connection_state();
        flatten_errs(errs)
    }
}

fn section_direction(media: &MediaDescription) -> RTCRtpTransceiverDirection {
    match RTCRtpTransceiverDirection::from(media.direction()) {
        RTCRtpTransceiverDirection::Unspecified => RTCRtpTransceiverDirection::Sendrecv,
        direction => direction,
    }
}

fn setup_of(desc: &SessionDescription, media: &MediaDescription) -> ConnectionRole {
    match media.connection_role() {
        ConnectionRole::Unspecified => desc
            .attribute(ATTR_KEY_CONNECTION_SETUP)
            .map(|v| ConnectionRole::from(v.as_str()))
            .unwrap_or_default(),
        role => role,
    }
}

fn fingerprint_of(desc: &SessionDescription, media: &MediaDescription) -> Option<RTCDtlsFingerprint> {
    media
        .attribute(ATTR_KEY_FINGERPRINT)
        .flatten()
        .or_else(|| desc.attribute(ATTR_KEY_FINGERPRINT).map(|v| v.as_str()))
        .and_then(RTCDtlsFingerprint::parse)
}

fn remote_ssrcs_of(media: &MediaDescription) -> Vec<SSRC> {
    let mut ssrcs: Vec<SSRC> = vec![];
    for value in media.attributes_with_key(ATTR_KEY_SSRC) {
        let Some(ssrc) = value
            .split_whitespace()
            .next()
            .and_then(|s| s.parse::<SSRC>().ok())
        else {
            continue;
        };
        if !ssrcs.contains(&ssrc) {
            ssrcs.push(ssrc);
        }
    }
    ssrcs
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::peer_connection::operation;
    use crate::peer_connection::transport::ice::IceStreamId;
    use crate::rtp_transceiver::codec::MIME_TYPE_OPUS;

    #[derive(Default)]
    struct RecordingAgent {
        calls: Arc<Mutex<Vec<String>>>,
        next_stream: IceStreamId,
    }

    impl RecordingAgent {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl IceAgent for RecordingAgent {
        fn add_stream(&mut self, session_id: u32) -> Result<IceStreamId> {
            self.record(format!("add_stream {session_id}"));
            self.next_stream += 1;
            Ok(self.next_stream)
        }

        fn find_transport(&mut self, stream: IceStreamId, component: RTCIceComponent) -> Result<()> {
            self.record(format!("find_transport {stream} {component}"));
            Ok(())
        }

        fn gather_candidates(&mut self, stream: IceStreamId) -> Result<()> {
            self.record(format!("gather {stream}"));
            Ok(())
        }

        fn set_local_credentials(&mut self, stream: IceStreamId, _: &str, _: &str) -> Result<()> {
            self.record(format!("local_credentials {stream}"));
            Ok(())
        }

        fn set_remote_credentials(&mut self, stream: IceStreamId, _: &str, _: &str) -> Result<()> {
            self.record(format!("remote_credentials {stream}"));
            Ok(())
        }

        fn add_candidate(&mut self, stream: IceStreamId, candidate: &str) -> Result<()> {
            self.record(format!("candidate {stream} {candidate}"));
            Ok(())
        }

        fn set_is_controller(&mut self, controller: bool) {
            self.record(format!("controller {controller}"));
        }

        fn set_stun_server(&mut self, uri: &str) -> Result<()> {
            self.record(format!("stun {uri}"));
            Ok(())
        }

        fn set_turn_server(&mut self, uri: &str) -> Result<()> {
            self.record(format!("turn {uri}"));
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.record("close".to_owned());
            Ok(())
        }
    }

    fn new_internal(
        configuration: RTCConfiguration,
    ) -> Result<(PeerConnectionInternal, Arc<Mutex<Vec<String>>>)> {
        let agent = RecordingAgent::default();
        let calls = Arc::clone(&agent.calls);
        let (sender, _) = operation::channel();
        let pc = PeerConnectionInternal::new(configuration, Box::new(agent), None, sender)?;
        Ok((pc, calls))
    }

    fn audio(direction: RTCRtpTransceiverDirection) -> RTCRtpTransceiverInit {
        RTCRtpTransceiverInit {
            direction,
            codecs: vec![RTCRtpCodec::new(111, MIME_TYPE_OPUS, 48000, 2)],
            ..Default::default()
        }
    }

    /// negotiate runs a full offer/answer exchange between two connections
    fn negotiate(
        offerer: &mut PeerConnectionInternal,
        answerer: &mut PeerConnectionInternal,
    ) -> Result<()> {
        let offer = offerer.create_offer(None)?;
        offerer.set_description(offer.clone(), StateChangeOp::SetLocal)?;
        answerer.set_description(RTCSessionDescription::offer(offer.sdp)?, StateChangeOp::SetRemote)?;
        let answer = answerer.create_answer()?;
        answerer.set_description(answer.clone(), StateChangeOp::SetLocal)?;
        offerer.set_description(RTCSessionDescription::answer(answer.sdp)?, StateChangeOp::SetRemote)
    }

    #[test]
    fn test_offer_answer_reaches_stable() -> Result<()> {
        let (mut offerer, offerer_calls) = new_internal(RTCConfiguration::default())?;
        let (mut answerer, _) = new_internal(RTCConfiguration::default())?;

        offerer.add_transceiver(
            RtpCodecKind::Audio,
            audio(RTCRtpTransceiverDirection::Sendrecv),
        )?;
        negotiate(&mut offerer, &mut answerer)?;

        assert_eq!(offerer.signaling_state, RTCSignalingState::Stable);
        assert_eq!(answerer.signaling_state, RTCSignalingState::Stable);
        assert!(offerer.pending_local_description.is_none());
        assert!(offerer.current_local_description.is_some());
        assert!(offerer.current_remote_description.is_some());

        // the answerer had no transceiver and receives only
        assert_eq!(answerer.transceivers.len(), 1);
        assert_eq!(
            answerer.transceivers[0].current_direction,
            RTCRtpTransceiverDirection::Recvonly
        );
        assert_eq!(
            offerer.transceivers[0].current_direction,
            RTCRtpTransceiverDirection::Sendonly
        );
        assert_eq!(offerer.transceivers[0].mline, Some(0));

        assert_eq!(offerer.transports.len(), 1);
        assert!(!offerer.transports[0].rtp_dtls.is_client());
        assert!(answerer.transports[0].rtp_dtls.is_client());
        assert!(offerer.transports[0].rtcp_mux);

        let calls = offerer_calls.lock().unwrap().clone();
        assert!(calls.contains(&"controller true".to_owned()));
        assert!(calls.contains(&"add_stream 0".to_owned()));
        assert!(calls.contains(&"gather 1".to_owned()));
        Ok(())
    }

    #[test]
    fn test_illegal_transition_leaves_state_untouched() -> Result<()> {
        let (mut pc, _) = new_internal(RTCConfiguration::default())?;
        pc.add_transceiver(
            RtpCodecKind::Audio,
            audio(RTCRtpTransceiverDirection::Sendrecv),
        )?;
        let offer = pc.create_offer(None)?;

        let result = pc.set_description(
            RTCSessionDescription::answer(offer.sdp.clone())?,
            StateChangeOp::SetRemote,
        );
        assert!(matches!(
            result,
            Err(Error::ErrSignalingStateProposedTransitionInvalid(_))
        ));
        assert_eq!(pc.signaling_state, RTCSignalingState::Stable);
        assert!(pc.remote_description().is_none());

        assert_eq!(pc.create_answer(), Err(Error::ErrIncorrectSignalingState));
        Ok(())
    }

    #[test]
    fn test_rollback_to_stable() -> Result<()> {
        let (mut pc, _) = new_internal(RTCConfiguration::default())?;
        pc.add_transceiver(
            RtpCodecKind::Audio,
            audio(RTCRtpTransceiverDirection::Sendrecv),
        )?;
        let offer = pc.create_offer(None)?;
        pc.set_description(offer, StateChangeOp::SetLocal)?;
        assert_eq!(pc.signaling_state, RTCSignalingState::HaveLocalOffer);

        pc.set_description(RTCSessionDescription::rollback(), StateChangeOp::SetLocal)?;
        assert_eq!(pc.signaling_state, RTCSignalingState::Stable);
        assert!(pc.local_description().is_none());
        assert_eq!(pc.transceivers[0].mid, None);

        pc.take_events();
        pc.set_description(RTCSessionDescription::rollback(), StateChangeOp::SetLocal)?;
        assert_eq!(pc.signaling_state, RTCSignalingState::Stable);
        assert!(pc.take_events().contains(
            &RTCPeerConnectionEvent::OnSignalingStateChangeEvent(RTCSignalingState::Stable)
        ));
        Ok(())
    }

    #[test]
    fn test_candidates_buffered_until_stable() -> Result<()> {
        let (mut offerer, calls) = new_internal(RTCConfiguration::default())?;
        let (mut answerer, _) = new_internal(RTCConfiguration::default())?;
        offerer.add_transceiver(
            RtpCodecKind::Audio,
            audio(RTCRtpTransceiverDirection::Sendrecv),
        )?;

        let candidate = "a=candidate:1 1 UDP 2122252543 192.168.1.2 54321 typ host";
        offerer.add_ice_candidate(0, candidate)?;
        assert_eq!(offerer.pending_candidates.len(), 1);

        negotiate(&mut offerer, &mut answerer)?;
        assert!(offerer.pending_candidates.is_empty());
        assert!(calls.lock().unwrap().contains(
            &"candidate 1 candidate:1 1 UDP 2122252543 192.168.1.2 54321 typ host".to_owned()
        ));
        Ok(())
    }

    #[test]
    fn test_conflicting_setup_is_rejected() -> Result<()> {
        let (mut offerer, _) = new_internal(RTCConfiguration::default())?;
        let (mut answerer, _) = new_internal(RTCConfiguration::default())?;
        offerer.add_transceiver(
            RtpCodecKind::Audio,
            audio(RTCRtpTransceiverDirection::Sendrecv),
        )?;

        let offer = offerer.create_offer(None)?;
        let active_offer = offer.sdp.replace("a=setup:actpass", "a=setup:active");
        offerer.set_description(
            RTCSessionDescription::offer(active_offer.clone())?,
            StateChangeOp::SetLocal,
        )?;
        answerer.set_description(
            RTCSessionDescription::offer(active_offer)?,
            StateChangeOp::SetRemote,
        )?;
        let answer = answerer.create_answer()?;

        let active_answer = answer.sdp.replace("a=setup:passive", "a=setup:active");
        let result = offerer.set_description(
            RTCSessionDescription::answer(active_answer)?,
            StateChangeOp::SetRemote,
        );
        assert!(matches!(
            result,
            Err(Error::ErrSessionDescriptionConflictingSetup(0, _, _))
        ));
        assert_eq!(offerer.signaling_state, RTCSignalingState::HaveLocalOffer);
        assert!(offerer.current_remote_description.is_none());
        assert!(offerer.transports.is_empty());
        Ok(())
    }

    #[test]
    fn test_create_data_channel_errors_do_not_mutate() -> Result<()> {
        let configuration = crate::peer_connection::configuration::RTCConfigurationBuilder::new()
            .with_max_data_channels(16)
            .build();
        let (mut pc, _) = new_internal(configuration)?;

        let tests = vec![
            (
                RTCDataChannelInit {
                    negotiated: true,
                    ..Default::default()
                },
                Error::ErrDataChannelNegotiatedWithoutId,
            ),
            (
                RTCDataChannelInit {
                    max_retransmits: Some(1),
                    max_packet_life_time: Some(1),
                    ..Default::default()
                },
                Error::ErrRetransmitsOrPacketLifeTime,
            ),
            (
                RTCDataChannelInit {
                    negotiated: true,
                    id: Some(16),
                    ..Default::default()
                },
                Error::ErrMaxDataChannelID,
            ),
        ];
        for (init, expected) in tests {
            assert_eq!(pc.create_data_channel("chat".to_owned(), init), Err(expected));
        }
        assert!(pc.data_channels.is_empty());

        let handle = pc.create_data_channel("chat".to_owned(), RTCDataChannelInit::default())?;
        assert_eq!(pc.data_channels[&handle].id, None);
        assert!(pc.negotiation_needed);
        Ok(())
    }

    #[test]
    fn test_data_channel_ids_follow_dtls_role() -> Result<()> {
        let (mut pc, _) = new_internal(RTCConfiguration::default())?;
        let first = pc.create_data_channel("a".to_owned(), RTCDataChannelInit::default())?;
        let second = pc.create_data_channel("b".to_owned(), RTCDataChannelInit::default())?;

        pc.dtls_client = Some(false);
        pc.assign_data_channel_ids();
        assert_eq!(pc.data_channels[&first].id, Some(1));
        assert_eq!(pc.data_channels[&second].id, Some(3));

        let third = pc.create_data_channel("c".to_owned(), RTCDataChannelInit::default())?;
        assert_eq!(pc.data_channels[&third].id, Some(5));
        Ok(())
    }

    #[test]
    fn test_get_stats() -> Result<()> {
        let (mut pc, _) = new_internal(RTCConfiguration::default())?;
        let t = pc.add_transceiver(
            RtpCodecKind::Audio,
            audio(RTCRtpTransceiverDirection::Sendrecv),
        )?;
        pc.create_data_channel("chat".to_owned(), RTCDataChannelInit::default())?;

        let report = pc.get_stats(None)?;
        assert_eq!(report.transceivers.len(), 1);
        assert_eq!(report.data_channels.len(), 1);
        assert_eq!(report.peer_connection.signaling_state, "stable");

        let report = pc.get_stats(Some(t.id()))?;
        assert_eq!(report.transceivers[0].transceiver_id, t.id());
        assert!(report.data_channels.is_empty());

        assert_eq!(pc.get_stats(Some(7)), Err(Error::ErrRTPTransceiverNotFound));
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> Result<()> {
        let (mut pc, calls) = new_internal(RTCConfiguration::default())?;
        let handle = pc.create_data_channel("chat".to_owned(), RTCDataChannelInit::default())?;
        pc.take_events();

        pc.close()?;
        pc.close()?;
        assert_eq!(pc.signaling_state, RTCSignalingState::Closed);
        assert_eq!(pc.ice_connection_state, RTCIceConnectionState::Closed);
        assert_eq!(pc.peer_connection_state, RTCPeerConnectionState::Closed);
        assert_eq!(
            calls.lock().unwrap().iter().filter(|c| *c == "close").count(),
            1
        );

        let events = pc.take_events();
        assert!(events.contains(&RTCPeerConnectionEvent::OnDataChannel(
            RTCDataChannelEvent::OnClose(handle)
        )));
        assert_eq!(pc.create_offer(None), Err(Error::ErrConnectionClosed));
        assert_eq!(
            pc.add_ice_candidate(0, "candidate:1 1 UDP 1 10.0.0.1 9 typ host"),
            Err(Error::ErrConnectionClosed)
        );
        Ok(())
    }
}
