use crate::{
    port::Protocol,
    target::{Policy, Target},
};
use policy_matcher_k8s::labels;
use std::{net::IpAddr, num::NonZeroU16};

/// One endpoint of a connection: an address outside the cluster, or a pod.
#[derive(Clone, Debug, PartialEq)]
pub enum TrafficPeer {
    External { ip: IpAddr },
    Internal(PodPeer),
}

/// An in-cluster endpoint, described by the attributes selectors can see.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PodPeer {
    pub namespace: String,
    pub namespace_labels: labels::Map,
    pub pod_labels: labels::Map,
}

/// A single connection attempt. Named ports are resolved by the caller
/// against the destination pod's container ports; `resolved_port` always
/// carries the numeric port and `resolved_port_name` the name, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct Traffic {
    pub source: TrafficPeer,
    pub destination: TrafficPeer,
    pub resolved_port: NonZeroU16,
    pub resolved_port_name: Option<String>,
    pub protocol: Protocol,
}

/// The decision for one direction of a query.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// No Target applies to the regulated endpoint, or the endpoint is
    /// external; traffic passes by default.
    Unregulated,
    /// At least one applicable Target admits the traffic. Carries the
    /// primary keys of the admitting Targets.
    Allowed { by: Vec<String> },
    /// Targets apply and none of them admits the traffic.
    Denied,
}

/// The combined decision for a connection: both directions must pass.
#[derive(Clone, Debug, PartialEq)]
pub struct AllowedResult {
    pub ingress: Verdict,
    pub egress: Verdict,
}

// === impl Verdict ===

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied)
    }
}

// === impl AllowedResult ===

impl AllowedResult {
    pub fn is_allowed(&self) -> bool {
        self.ingress.is_allowed() && self.egress.is_allowed()
    }
}

// === impl Policy ===

impl Policy {
    /// Answers whether the given traffic is permitted. Ingress rules are
    /// consulted only when the destination is in-cluster, egress rules only
    /// when the source is; each side is the union of its matching Targets'
    /// decisions.
    pub fn is_traffic_allowed(&self, traffic: &Traffic) -> AllowedResult {
        let ingress = match &traffic.destination {
            TrafficPeer::Internal(pod) => {
                direction_verdict(self.ingress.values(), pod, &traffic.source, traffic)
            }
            TrafficPeer::External { .. } => Verdict::Unregulated,
        };
        let egress = match &traffic.source {
            TrafficPeer::Internal(pod) => {
                direction_verdict(self.egress.values(), pod, &traffic.destination, traffic)
            }
            TrafficPeer::External { .. } => Verdict::Unregulated,
        };
        AllowedResult { ingress, egress }
    }
}

fn direction_verdict<'t>(
    targets: impl Iterator<Item = &'t Target>,
    subject: &PodPeer,
    other: &TrafficPeer,
    traffic: &Traffic,
) -> Verdict {
    let mut regulated = false;
    let mut allowed_by = Vec::new();
    for target in targets.filter(|t| t.selects(subject)) {
        regulated = true;
        if target.peer.allows(
            other,
            traffic.resolved_port,
            traffic.resolved_port_name.as_deref(),
            traffic.protocol,
        ) {
            allowed_by.push(target.primary_key());
        }
    }

    if !regulated {
        Verdict::Unregulated
    } else if allowed_by.is_empty() {
        Verdict::Denied
    } else {
        Verdict::Allowed { by: allowed_by }
    }
}
