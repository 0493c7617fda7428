use crate::{peer::PeerMatcher, traffic::PodPeer};
use policy_matcher_k8s::{labels, LabelSelector, NetworkPolicy};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
    sync::Arc,
};

/// The direction a rule set regulates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

/// The scope a compiled rule set applies to: the pods selected by
/// `pod_selector` within `namespace`, together with the peer matcher those
/// pods' traffic is checked against and the source policies that produced
/// it.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub namespace: String,
    pub pod_selector: LabelSelector,

    /// The policies folded into this Target, in insertion order. Held as
    /// shared handles for identification only; never mutated.
    pub source_rules: Vec<Arc<NetworkPolicy>>,

    pub peer: PeerMatcher,
}

/// A compiled set of policies: Targets partitioned by direction, keyed by
/// primary key so traversal is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Policy {
    pub(crate) ingress: BTreeMap<String, Target>,
    pub(crate) egress: BTreeMap<String, Target>,
}

// === impl Direction ===

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => "ingress".fmt(f),
            Self::Egress => "egress".fmt(f),
        }
    }
}

// === impl Target ===

impl Target {
    /// The canonical identity of this Target within its direction.
    pub fn primary_key(&self) -> String {
        format!("{}/{}", self.namespace, labels::canonical(&self.pod_selector))
    }

    /// Folds another Target for the same primary key into this one:
    /// provenance concatenates, peers union.
    fn merge(&mut self, other: Target) {
        self.source_rules.extend(other.source_rules);
        let peer = std::mem::replace(&mut self.peer, PeerMatcher::None);
        self.peer = peer.union(other.peer);
    }

    /// Indicates whether this Target regulates the given pod.
    pub(crate) fn selects(&self, pod: &PodPeer) -> bool {
        self.namespace == pod.namespace && labels::matches(&self.pod_selector, &pod.pod_labels)
    }
}

// === impl Policy ===

impl Policy {
    /// Inserts a Target, merging it with an existing Target of the same
    /// primary key in the same direction.
    pub fn add_target(&mut self, direction: Direction, target: Target) {
        let targets = match direction {
            Direction::Ingress => &mut self.ingress,
            Direction::Egress => &mut self.egress,
        };
        match targets.entry(target.primary_key()) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(target),
            Entry::Vacant(entry) => {
                entry.insert(target);
            }
        }
    }

    /// Returns the ingress and egress Targets, each sorted by primary key.
    pub fn sorted_targets(&self) -> (Vec<&Target>, Vec<&Target>) {
        (
            self.ingress.values().collect(),
            self.egress.values().collect(),
        )
    }
}
