//! Cluster placement and membership wire types.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placement constraints for a consensus group leader.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// The set of servers backing a stream or consumer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leader: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<PeerInfo>,
}

/// One peer in a consensus group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    /// whether the peer is caught up with the leader
    pub current: bool,
    #[serde(default, skip_serializing_if = "crate::api::is_false")]
    pub offline: bool,
    /// time since the peer was last seen
    #[serde(with = "crate::api::nanos")]
    pub active: Duration,
    #[serde(default, skip_serializing_if = "crate::api::is_zero_u64")]
    pub lag: u64,
}

/// Request payload asking the meta-cluster leader to step down.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LeaderStepdownRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
}

/// Request payload removing a peer from the meta-cluster.
///
/// `peer_id` is preferred by the engine over the server name when both are
/// present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeerRemoveRequest {
    #[serde(rename = "peer")]
    pub server: String,
    #[serde(rename = "peer_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}
