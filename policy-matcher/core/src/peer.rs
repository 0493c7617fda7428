use crate::{
    internal::InternalMatcher,
    ip::IpMatcher,
    port::Protocol,
    traffic::TrafficPeer,
};
use std::num::NonZeroU16;

/// The `Specific` arm of [`PeerMatcher`]: an IP arm for external peers and
/// an internal arm for in-cluster peers. Which arm applies is decided by the
/// kind of the queried peer, never both.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecificPeerMatcher {
    pub ip: IpMatcher,
    pub internal: InternalMatcher,
}

/// The top-level decision for one direction of a Target: is this peer
/// admitted on this port and protocol?
#[derive(Clone, Debug, PartialEq)]
pub enum PeerMatcher {
    None,
    All,
    Specific(SpecificPeerMatcher),
}

// === impl PeerMatcher ===

impl PeerMatcher {
    /// Combines two peer matchers; any admittance on either side survives.
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, x) | (x, Self::None) => x,
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Specific(a), Self::Specific(b)) => Self::Specific(SpecificPeerMatcher {
                ip: a.ip.union(b.ip),
                internal: a.internal.union(b.internal),
            }),
        }
    }

    pub fn allows(
        &self,
        peer: &TrafficPeer,
        port: NonZeroU16,
        port_name: Option<&str>,
        protocol: Protocol,
    ) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Specific(matcher) => match peer {
                TrafficPeer::External { ip } => matcher.ip.allows(ip, port, port_name, protocol),
                TrafficPeer::Internal(pod) => {
                    matcher.internal.allows(pod, port, port_name, protocol)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        internal::{NamespaceMatcher, NamespacePodMatcher, PodMatcher},
        ip::{IpBlockMatcher, IpMatcher},
        port::PortMatcher,
        traffic::PodPeer,
    };

    fn specific() -> PeerMatcher {
        PeerMatcher::Specific(SpecificPeerMatcher {
            ip: IpMatcher::specific(
                PortMatcher::None,
                Some(IpBlockMatcher {
                    cidr: "10.0.0.0/24".parse().unwrap(),
                    except: vec![],
                    port: PortMatcher::All,
                }),
            ),
            internal: InternalMatcher::specific(NamespacePodMatcher {
                namespace: NamespaceMatcher::Exact("ns".to_string()),
                pod: PodMatcher::All,
                port: PortMatcher::All,
            }),
        })
    }

    fn port(n: u16) -> NonZeroU16 {
        NonZeroU16::new(n).unwrap()
    }

    #[test]
    fn lattice() {
        assert_eq!(PeerMatcher::None.union(specific()), specific());
        assert_eq!(specific().union(PeerMatcher::None), specific());
        assert_eq!(PeerMatcher::All.union(specific()), PeerMatcher::All);
        assert_eq!(specific().union(PeerMatcher::All), PeerMatcher::All);
        assert_eq!(specific().union(specific()), specific());
    }

    #[test]
    fn dispatches_on_peer_kind() {
        let matcher = specific();

        let external = TrafficPeer::External {
            ip: "10.0.0.9".parse().unwrap(),
        };
        let outside = TrafficPeer::External {
            ip: "10.1.0.9".parse().unwrap(),
        };
        let internal = TrafficPeer::Internal(PodPeer {
            namespace: "ns".to_string(),
            namespace_labels: Default::default(),
            pod_labels: Default::default(),
        });
        let other_ns = TrafficPeer::Internal(PodPeer {
            namespace: "other".to_string(),
            namespace_labels: Default::default(),
            pod_labels: Default::default(),
        });

        assert!(matcher.allows(&external, port(80), None, Protocol::Tcp));
        assert!(!matcher.allows(&outside, port(80), None, Protocol::Tcp));
        assert!(matcher.allows(&internal, port(80), None, Protocol::Tcp));
        assert!(!matcher.allows(&other_ns, port(80), None, Protocol::Tcp));
    }
}
