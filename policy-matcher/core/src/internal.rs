use crate::{
    port::{PortMatcher, Protocol},
    traffic::PodPeer,
};
use policy_matcher_k8s::{labels, LabelSelector};
use std::{collections::BTreeMap, num::NonZeroU16};

/// Selects the namespace half of an in-cluster peer.
#[derive(Clone, Debug, PartialEq)]
pub enum NamespaceMatcher {
    /// Any namespace.
    All,
    /// The named namespace only. Produced for peers without a namespace
    /// selector, which are scoped to the policy's own namespace.
    Exact(String),
    /// Namespaces whose labels match the selector.
    Selector(LabelSelector),
}

/// Selects the pod half of an in-cluster peer.
#[derive(Clone, Debug, PartialEq)]
pub enum PodMatcher {
    All,
    Selector(LabelSelector),
}

/// A (namespace, pod, port) conjunction: all three must admit the peer.
#[derive(Clone, Debug, PartialEq)]
pub struct NamespacePodMatcher {
    pub namespace: NamespaceMatcher,
    pub pod: PodMatcher,
    pub port: PortMatcher,
}

/// The `Specific` arm of [`InternalMatcher`]: peers keyed by the canonical
/// forms of their namespace and pod matchers, so that rules naming the same
/// scope merge instead of accumulating.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecificInternalMatcher {
    pub peers: BTreeMap<(String, String), NamespacePodMatcher>,
}

/// Decides whether a same-cluster peer is admitted.
#[derive(Clone, Debug, PartialEq)]
pub enum InternalMatcher {
    None,
    All,
    Specific(SpecificInternalMatcher),
}

// === impl NamespaceMatcher ===

impl NamespaceMatcher {
    pub fn canonical(&self) -> String {
        match self {
            Self::All => "all namespaces".to_string(),
            Self::Exact(namespace) => format!("namespace {}", namespace),
            Self::Selector(selector) => {
                format!("namespaces matching {}", labels::canonical(selector))
            }
        }
    }

    fn matches(&self, namespace: &str, namespace_labels: &labels::Map) -> bool {
        match self {
            Self::All => true,
            Self::Exact(name) => name == namespace,
            Self::Selector(selector) => labels::matches(selector, namespace_labels),
        }
    }
}

// === impl PodMatcher ===

impl PodMatcher {
    pub fn canonical(&self) -> String {
        match self {
            Self::All => "all pods".to_string(),
            Self::Selector(selector) => format!("pods matching {}", labels::canonical(selector)),
        }
    }

    fn matches(&self, pod_labels: &labels::Map) -> bool {
        match self {
            Self::All => true,
            Self::Selector(selector) => labels::matches(selector, pod_labels),
        }
    }
}

// === impl NamespacePodMatcher ===

impl NamespacePodMatcher {
    pub fn key(&self) -> (String, String) {
        (self.namespace.canonical(), self.pod.canonical())
    }

    fn allows(&self, peer: &PodPeer, port: NonZeroU16, name: Option<&str>, protocol: Protocol) -> bool {
        self.namespace.matches(&peer.namespace, &peer.namespace_labels)
            && self.pod.matches(&peer.pod_labels)
            && self.port.allows(port, name, protocol)
    }
}

// === impl InternalMatcher ===

impl InternalMatcher {
    pub fn specific(matcher: NamespacePodMatcher) -> Self {
        Self::Specific(SpecificInternalMatcher {
            peers: Some((matcher.key(), matcher)).into_iter().collect(),
        })
    }

    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, x) | (x, Self::None) => x,
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Specific(a), Self::Specific(b)) => {
                let mut peers = a.peers;
                for (key, matcher) in b.peers {
                    use std::collections::btree_map::Entry;
                    match peers.entry(key) {
                        Entry::Occupied(mut entry) => {
                            let existing = entry.get_mut();
                            let port = std::mem::replace(&mut existing.port, PortMatcher::None);
                            existing.port = port.union(matcher.port);
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(matcher);
                        }
                    }
                }
                Self::Specific(SpecificInternalMatcher { peers })
            }
        }
    }

    pub fn allows(&self, peer: &PodPeer, port: NonZeroU16, name: Option<&str>, protocol: Protocol) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Specific(matcher) => matcher
                .peers
                .values()
                .any(|m| m.allows(peer, port, name, protocol)),
        }
    }
}
