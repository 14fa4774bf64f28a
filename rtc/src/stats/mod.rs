//! Statistics Model
//!
//! A report is a snapshot taken on the operation thread by
//! `RTCPeerConnection::get_stats`. It serializes to the camelCase JSON
//! shape of the W3C stats dictionaries.

use ::serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub mod data_channel;
pub mod peer_connection;
pub mod transceiver;
pub mod transport;

use data_channel::RTCDataChannelStats;
use peer_connection::RTCPeerConnectionStats;
use transceiver::RTCTransceiverStats;
use transport::RTCTransportStats;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCStatsType {
    #[serde(rename = "peer-connection")]
    PeerConnection,
    #[serde(rename = "data-channel")]
    DataChannel,
    #[serde(rename = "transport")]
    Transport,
    #[serde(rename = "transceiver")]
    Transceiver,
}

pub type RTCStatsId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RTCStats {
    pub timestamp: SystemTime,
    #[serde(rename = "type")]
    pub typ: RTCStatsType,
    pub id: RTCStatsId,
}

impl RTCStats {
    pub(crate) fn new(timestamp: SystemTime, typ: RTCStatsType, id: RTCStatsId) -> Self {
        Self { timestamp, typ, id }
    }
}

/// RTCStatsReport is what `get_stats` resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RTCStatsReport {
    pub peer_connection: RTCPeerConnectionStats,
    pub transports: Vec<RTCTransportStats>,
    pub transceivers: Vec<RTCTransceiverStats>,
    pub data_channels: Vec<RTCDataChannelStats>,
}

impl RTCStatsReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn transport(&self, id: &str) -> Option<&RTCTransportStats> {
        self.transports.iter().find(|t| t.stats.id == id)
    }
}
