//! Peer connection: the negotiation and transport state machine.
//!
//! An [`RTCPeerConnection`] owns its state behind one lock and runs every
//! mutating call as a task on a dedicated operation thread. Calls return a
//! [`Promise`]; events are handed to the handler set with
//! [`RTCPeerConnection::on_event`] or queued for
//! [`RTCPeerConnection::poll_event`].
//!
//! The ICE agent and the SCTP association are not part of this crate. They
//! are plugged in through the [`transport::IceAgent`] and
//! [`transport::SctpTransport`] traits and report back through an
//! [`RTCTransportEventSender`].

pub mod certificate;
pub mod configuration;
pub mod event;
pub(crate) mod internal;
pub(crate) mod operation;
pub mod promise;
pub mod sdp;
pub mod state;
pub mod transport;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};
use shared::error::{Error, Result};

use crate::data_channel::init::RTCDataChannelInit;
use crate::data_channel::state::RTCDataChannelState;
use crate::data_channel::{RTCDataChannel, RTCDataChannelHandle};
use crate::rtp_transceiver::codec::{PayloadType, RTCRtpCodec, RtpCodecKind, SSRC};
use crate::rtp_transceiver::{
    RTCRtpTransceiver, RTCRtpTransceiverId, RTCRtpTransceiverInit, find_by_mline,
};
use crate::stats::RTCStatsReport;
use configuration::RTCConfiguration;
use configuration::offer_answer_options::RTCOfferOptions;
use event::{
    EventDispatcher, RTCPeerConnectionEvent, RTCPeerConnectionEventHandler, RTCTransportEvent,
};
use internal::PeerConnectionInternal;
use operation::{Completion, OperationReceiver, OperationSender, Operations};
use promise::Promise;
use self::sdp::session_description::RTCSessionDescription;
use state::signaling_state::StateChangeOp;
use state::{RTCIceConnectionState, RTCIceGatheringState, RTCPeerConnectionState, RTCSignalingState};
use transport::{IceAgent, SctpTransport};

/// State shared by a peer connection and the data channels it handed out
pub(crate) struct PeerConnectionShared {
    internal: Arc<Mutex<PeerConnectionInternal>>,
    ops: Operations<PeerConnectionInternal>,
    dispatcher: Arc<EventDispatcher>,
}

impl PeerConnectionShared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PeerConnectionInternal> {
        self.internal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// run queues `f` and returns the promise of its result
    pub(crate) fn run<T, F>(&self, name: &'static str, f: F) -> Promise<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PeerConnectionInternal) -> Result<T> + Send + 'static,
    {
        let (resolver, promise) = promise::channel();
        let queued = self
            .ops
            .sender()
            .enqueue(name, move |pc: &mut PeerConnectionInternal| {
                let result = f(pc);
                if let Err(err) = &result {
                    debug!("{name} failed: {err}");
                }
                let completion: Completion = Box::new(move || resolver.resolve(result));
                Some(completion)
            });

        if queued {
            promise
        } else {
            Promise::rejected(Error::ErrConnectionClosed)
        }
    }
}

/// RTCTransportEventSender is how the ICE agent and the SCTP association
/// report back to the connection. Events are queued behind the tasks
/// already submitted.
#[derive(Clone)]
pub struct RTCTransportEventSender {
    ops: OperationSender<PeerConnectionInternal>,
}

impl RTCTransportEventSender {
    /// send queues `evt`. It returns false once the connection is closed.
    pub fn send(&self, evt: RTCTransportEvent) -> bool {
        trace!("transport event {evt:?}");
        self.ops
            .enqueue("transport_event", move |pc: &mut PeerConnectionInternal| {
                pc.handle_transport_event(evt);
                None
            })
    }
}

/// RTCPeerConnectionBuilder assembles a peer connection with its
/// collaborators.
///
/// The event sender exists before the connection does, so collaborators can
/// be created with it and then handed to the builder:
///
/// ```no_run
/// # use rtc::peer_connection::{RTCPeerConnection, RTCPeerConnectionBuilder};
/// # use rtc::peer_connection::transport::IceAgent;
/// # fn my_agent(_: rtc::peer_connection::RTCTransportEventSender) -> Box<dyn IceAgent> { unimplemented!() }
/// # fn example() -> shared::error::Result<RTCPeerConnection> {
/// let builder = RTCPeerConnectionBuilder::new();
/// let agent = my_agent(builder.event_sender());
/// builder.with_ice_agent(agent).build()
/// # }
/// ```
pub struct RTCPeerConnectionBuilder {
    configuration: RTCConfiguration,
    ice_agent: Option<Box<dyn IceAgent>>,
    sctp_transport: Option<Box<dyn SctpTransport>>,
    sender: OperationSender<PeerConnectionInternal>,
    receiver: OperationReceiver<PeerConnectionInternal>,
}

impl Default for RTCPeerConnectionBuilder {
    fn default() -> Self {
        let (sender, receiver) = operation::channel();
        Self {
            configuration: RTCConfiguration::default(),
            ice_agent: None,
            sctp_transport: None,
            sender,
            receiver,
        }
    }
}

impl RTCPeerConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configuration(mut self, configuration: RTCConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// with_ice_agent sets the ICE agent, which is required
    pub fn with_ice_agent(mut self, ice_agent: Box<dyn IceAgent>) -> Self {
        self.ice_agent = Some(ice_agent);
        self
    }

    /// with_sctp_transport enables data channels
    pub fn with_sctp_transport(mut self, sctp_transport: Box<dyn SctpTransport>) -> Self {
        self.sctp_transport = Some(sctp_transport);
        self
    }

    pub fn event_sender(&self) -> RTCTransportEventSender {
        RTCTransportEventSender {
            ops: self.sender.clone(),
        }
    }

    pub fn build(self) -> Result<RTCPeerConnection> {
        let ice_agent = self
            .ice_agent
            .ok_or_else(|| Error::ErrMissingCollaborator("ice agent".to_owned()))?;
        let internal = PeerConnectionInternal::new(
            self.configuration,
            ice_agent,
            self.sctp_transport,
            self.sender.clone(),
        )?;
        let name = internal.configuration.name.clone();

        let internal = Arc::new(Mutex::new(internal));
        let dispatcher = Arc::new(EventDispatcher::default());
        let ops = Operations::start(
            &name,
            self.sender,
            self.receiver,
            Arc::clone(&internal),
            Arc::clone(&dispatcher),
        )?;
        debug!("peer connection {name} started");

        Ok(RTCPeerConnection {
            shared: Arc::new(PeerConnectionShared {
                internal,
                ops,
                dispatcher,
            }),
        })
    }
}

/// PeerConnection represents a WebRTC connection that establishes a
/// peer-to-peer communications with another PeerConnection instance in a
/// browser, or to another endpoint implementing the required protocols.
///
/// Every method may be called from any thread. Promises must not be waited
/// on from inside the event handler, which runs on the operation thread.
pub struct RTCPeerConnection {
    shared: Arc<PeerConnectionShared>,
}

impl Drop for RTCPeerConnection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close peer connection: {err}");
        }
    }
}

impl RTCPeerConnection {
    /// create_offer generates an offer for every transceiver and, if any
    /// exist, the data channels
    /// <https://w3c.github.io/webrtc-pc/#dom-rtcpeerconnection-createoffer>
    pub fn create_offer(&self, options: Option<RTCOfferOptions>) -> Promise<RTCSessionDescription> {
        self.shared
            .run("create_offer", move |pc| pc.create_offer(options))
    }

    /// create_answer answers the pending remote offer
    pub fn create_answer(&self) -> Promise<RTCSessionDescription> {
        self.shared.run("create_answer", |pc| pc.create_answer())
    }

    /// set_local_description sets the SessionDescription of the local peer.
    /// An offer or answer with an empty sdp stands for the last one created.
    pub fn set_local_description(&self, description: RTCSessionDescription) -> Promise<()> {
        self.shared.run("set_local_description", move |pc| {
            pc.set_description(description, StateChangeOp::SetLocal)
        })
    }

    /// set_remote_description sets the SessionDescription of the remote peer
    pub fn set_remote_description(&self, description: RTCSessionDescription) -> Promise<()> {
        self.shared.run("set_remote_description", move |pc| {
            pc.set_description(description, StateChangeOp::SetRemote)
        })
    }

    /// add_ice_candidate accepts a remote candidate for the media section at
    /// `mline_index`, with or without the `a=` prefix. Candidates that
    /// arrive before both descriptions are in place are held back. An empty
    /// candidate marks the end of candidates.
    pub fn add_ice_candidate(&self, mline_index: usize, candidate: &str) -> Result<()> {
        let candidate = candidate.to_owned();
        let queued = self.shared.ops.sender().enqueue(
            "add_ice_candidate",
            move |pc: &mut PeerConnectionInternal| {
                if let Err(err) = pc.add_ice_candidate(mline_index, &candidate) {
                    warn!("failed to add ice candidate {candidate}: {err}");
                }
                None
            },
        );
        if queued {
            Ok(())
        } else {
            Err(Error::ErrConnectionClosed)
        }
    }

    pub fn add_transceiver(
        &self,
        kind: RtpCodecKind,
        init: RTCRtpTransceiverInit,
    ) -> Promise<RTCRtpTransceiver> {
        self.shared
            .run("add_transceiver", move |pc| pc.add_transceiver(kind, init))
    }

    /// stop_transceiver stops the transceiver for good; its media section
    /// is rejected from the next negotiation on
    pub fn stop_transceiver(&self, id: RTCRtpTransceiverId) -> Promise<()> {
        self.shared
            .run("stop_transceiver", move |pc| pc.stop_transceiver(id))
    }

    /// create_data_channel creates a new DataChannel object with the given label
    /// and optional DataChannelInit used to configure properties of the
    /// underlying channel such as data reliability.
    pub fn create_data_channel(
        &self,
        label: &str,
        options: Option<RTCDataChannelInit>,
    ) -> Promise<RTCDataChannel> {
        let label = label.to_owned();
        let shared = Arc::clone(&self.shared);
        self.shared.run("create_data_channel", move |pc| {
            let handle = pc.create_data_channel(label, options.unwrap_or_default())?;
            Ok(RTCDataChannel { handle, shared })
        })
    }

    /// get_stats snapshots the connection. With a transceiver, the report
    /// only covers it and its transport.
    pub fn get_stats(&self, transceiver: Option<RTCRtpTransceiverId>) -> Promise<RTCStatsReport> {
        self.shared
            .run("get_stats", move |pc| pc.get_stats(transceiver))
    }

    /// on_event sets the handler for every event of the connection and its
    /// data channels. Events raised while no handler is set are kept for
    /// [`poll_event`](Self::poll_event).
    pub fn on_event(&self, handler: Option<RTCPeerConnectionEventHandler>) {
        self.shared.dispatcher.set_handler(handler);
    }

    pub fn poll_event(&self) -> Option<RTCPeerConnectionEvent> {
        self.shared.dispatcher.poll()
    }

    /// transport_event_sender gives another sender to the collaborators
    pub fn transport_event_sender(&self) -> RTCTransportEventSender {
        RTCTransportEventSender {
            ops: self.shared.ops.sender().clone(),
        }
    }

    pub fn configuration(&self) -> RTCConfiguration {
        self.shared.lock().configuration.clone()
    }

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.shared.lock().signaling_state
    }

    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        self.shared.lock().ice_connection_state
    }

    pub fn ice_gathering_state(&self) -> RTCIceGatheringState {
        self.shared.lock().ice_gathering_state
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.shared.lock().peer_connection_state
    }

    /// local_description returns the pending local description if there is
    /// one, else the current one
    pub fn local_description(&self) -> Option<RTCSessionDescription> {
        self.shared.lock().local_description().cloned()
    }

    pub fn remote_description(&self) -> Option<RTCSessionDescription> {
        self.shared.lock().remote_description().cloned()
    }

    pub fn current_local_description(&self) -> Option<RTCSessionDescription> {
        self.shared.lock().current_local_description.clone()
    }

    pub fn pending_local_description(&self) -> Option<RTCSessionDescription> {
        self.shared.lock().pending_local_description.clone()
    }

    pub fn current_remote_description(&self) -> Option<RTCSessionDescription> {
        self.shared.lock().current_remote_description.clone()
    }

    pub fn pending_remote_description(&self) -> Option<RTCSessionDescription> {
        self.shared.lock().pending_remote_description.clone()
    }

    pub fn transceivers(&self) -> Vec<RTCRtpTransceiver> {
        self.shared.lock().transceivers.clone()
    }

    pub fn transceiver(&self, id: RTCRtpTransceiverId) -> Option<RTCRtpTransceiver> {
        self.shared.lock().transceivers.get(id).cloned()
    }

    /// transceiver_for_ssrc routes an incoming SSRC announced by the remote
    /// description on transport `session_id` to its transceiver.
    pub fn transceiver_for_ssrc(&self, session_id: u32, ssrc: SSRC) -> Option<RTCRtpTransceiverId> {
        let pc = self.shared.lock();
        let mline = pc
            .transports
            .iter()
            .find(|stream| stream.session_id == session_id)?
            .mline_for_ssrc(ssrc)?;
        find_by_mline(mline, &pc.transceivers).map(|index| pc.transceivers[index].id())
    }

    /// codec_for_payload_type resolves a payload type received on transport
    /// `session_id` against the codecs the remote side negotiated.
    pub fn codec_for_payload_type(&self, session_id: u32, pt: PayloadType) -> Option<RTCRtpCodec> {
        let pc = self.shared.lock();
        pc.transports
            .iter()
            .find(|stream| stream.session_id == session_id)?
            .codec_for_pt(pt)
            .cloned()
    }

    /// data_channels lists the open and closing channels. A channel still
    /// waiting for its OPEN to go out is pending and only listed once it
    /// opens.
    pub fn data_channels(&self) -> Vec<RTCDataChannel> {
        let handles: Vec<RTCDataChannelHandle> = {
            let pc = self.shared.lock();
            pc.data_channels
                .values()
                .filter(|dc| {
                    matches!(
                        dc.ready_state(),
                        RTCDataChannelState::Open | RTCDataChannelState::Closing
                    )
                })
                .map(|dc| dc.handle)
                .collect()
        };
        handles
            .into_iter()
            .map(|handle| RTCDataChannel {
                handle,
                shared: Arc::clone(&self.shared),
            })
            .collect()
    }

    pub fn data_channel(&self, handle: RTCDataChannelHandle) -> Option<RTCDataChannel> {
        let known = self.shared.lock().data_channels.contains_key(&handle);
        known.then(|| RTCDataChannel {
            handle,
            shared: Arc::clone(&self.shared),
        })
    }

    /// close ends the connection: channels and transports are closed, the
    /// collaborators are shut down, and every later call fails with
    /// [`Error::ErrConnectionClosed`]. Closing twice is a no-op.
    ///
    /// From inside the event handler, close is queued and returns at once.
    pub fn close(&self) -> Result<()> {
        let ops = &self.shared.ops;
        let result = if ops.sender().is_closed() {
            Ok(())
        } else {
            let promise = self.shared.run("close", |pc| pc.close());
            if ops.is_operation_thread() {
                return ops.stop_and_join();
            }
            promise.wait()
        };

        ops.stop_and_join()?;
        self.shared.dispatcher.set_handler(None);
        result
    }
}
