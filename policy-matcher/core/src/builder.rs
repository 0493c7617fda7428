//! Compiles NetworkPolicy objects into a [`Policy`].
//!
//! Compilation is a fold: each rule becomes a peer matcher, rules within a
//! direction union into one Target, and Targets sharing a primary key union
//! across policies. Structural violations abort the whole build; no partial
//! Policy is ever returned.

use crate::{
    internal::{InternalMatcher, NamespaceMatcher, NamespacePodMatcher, PodMatcher},
    ip::{Cidr, CidrParseError, IpBlockMatcher, IpMatcher},
    peer::{PeerMatcher, SpecificPeerMatcher},
    port::{Port, PortMatcher, PortProtocol, Protocol, UnknownProtocol},
    target::{Direction, Policy, Target},
};
use policy_matcher_k8s::{self as k8s, labels};
use std::{num::NonZeroU16, sync::Arc};

/// The namespace a policy is scoped to when its metadata carries none.
const DEFAULT_NAMESPACE: &str = "default";

/// A structural precondition the input policies violate.
#[derive(Debug, thiserror::Error)]
pub enum InvalidPolicy {
    #[error("network policy declares no policy types")]
    MissingPolicyType,

    #[error("network policy peer has neither an ipBlock nor any selector")]
    PeerAllNil,

    #[error("network policy peer combines an ipBlock with a namespace or pod selector")]
    PeerMixed,

    #[error("port {0} is outside the range 1-65535")]
    PortOutOfRange(i32),

    #[error(transparent)]
    Protocol(#[from] UnknownProtocol),

    #[error(transparent)]
    Cidr(#[from] CidrParseError),
}

/// Compiles a single policy. Equivalent to a one-element
/// [`build_network_policies`] call.
pub fn build_network_policy(netpol: Arc<k8s::NetworkPolicy>) -> Result<Policy, InvalidPolicy> {
    build_network_policies(Some(netpol))
}

/// Compiles a set of policies into one [`Policy`], merging Targets that
/// share a direction and primary key.
pub fn build_network_policies(
    netpols: impl IntoIterator<Item = Arc<k8s::NetworkPolicy>>,
) -> Result<Policy, InvalidPolicy> {
    let mut policy = Policy::default();
    for netpol in netpols {
        let (ingress, egress) = build_target(&netpol)?;
        if let Some(target) = ingress {
            policy.add_target(Direction::Ingress, target);
        }
        if let Some(target) = egress {
            policy.add_target(Direction::Egress, target);
        }
    }
    Ok(policy)
}

fn policy_namespace(netpol: &k8s::NetworkPolicy) -> String {
    match netpol.metadata.namespace.as_deref() {
        None | Some("") => DEFAULT_NAMESPACE.to_string(),
        Some(namespace) => namespace.to_string(),
    }
}

fn build_target(
    netpol: &Arc<k8s::NetworkPolicy>,
) -> Result<(Option<Target>, Option<Target>), InvalidPolicy> {
    let default_spec = k8s::NetworkPolicySpec::default();
    let spec = netpol.spec.as_ref().unwrap_or(&default_spec);

    let types = spec.policy_types.as_deref().unwrap_or(&[]);
    if types.is_empty() {
        return Err(InvalidPolicy::MissingPolicyType);
    }

    let namespace = policy_namespace(netpol);
    let mk_target = |peer| Target {
        namespace: namespace.clone(),
        pod_selector: spec.pod_selector.clone(),
        source_rules: vec![netpol.clone()],
        peer,
    };

    let mut ingress = None;
    let mut egress = None;
    for policy_type in types {
        match policy_type.as_str() {
            "Ingress" => {
                let rules = spec.ingress.as_deref().unwrap_or(&[]);
                ingress = Some(mk_target(build_ingress_matcher(&namespace, rules)?));
            }
            "Egress" => {
                let rules = spec.egress.as_deref().unwrap_or(&[]);
                egress = Some(mk_target(build_egress_matcher(&namespace, rules)?));
            }
            // Unknown policy types are tolerated; upstream validation owns them.
            _ => {}
        }
    }
    Ok((ingress, egress))
}

fn build_ingress_matcher(
    policy_namespace: &str,
    rules: &[k8s::NetworkPolicyIngressRule],
) -> Result<PeerMatcher, InvalidPolicy> {
    let mut matcher = PeerMatcher::None;
    for rule in rules {
        let ports = rule.ports.as_deref().unwrap_or(&[]);
        let peers = rule.from.as_deref().unwrap_or(&[]);
        matcher = matcher.union(build_peer_matcher(policy_namespace, ports, peers)?);
    }
    Ok(matcher)
}

fn build_egress_matcher(
    policy_namespace: &str,
    rules: &[k8s::NetworkPolicyEgressRule],
) -> Result<PeerMatcher, InvalidPolicy> {
    let mut matcher = PeerMatcher::None;
    for rule in rules {
        let ports = rule.ports.as_deref().unwrap_or(&[]);
        let peers = rule.to.as_deref().unwrap_or(&[]);
        matcher = matcher.union(build_peer_matcher(policy_namespace, ports, peers)?);
    }
    Ok(matcher)
}

fn build_peer_matcher(
    policy_namespace: &str,
    ports: &[k8s::NetworkPolicyPort],
    peers: &[k8s::NetworkPolicyPeer],
) -> Result<PeerMatcher, InvalidPolicy> {
    let port = build_port_matcher(ports)?;

    // An empty peer list allows all peers, restricted only by the rule's
    // ports: all ports means the rule is unconditional.
    if peers.is_empty() {
        if let PortMatcher::All = port {
            return Ok(PeerMatcher::All);
        }
        let all_pods = NamespacePodMatcher {
            namespace: NamespaceMatcher::All,
            pod: PodMatcher::All,
            port: port.clone(),
        };
        return Ok(PeerMatcher::Specific(SpecificPeerMatcher {
            ip: IpMatcher::specific(port, None),
            internal: InternalMatcher::specific(all_pods),
        }));
    }

    let mut ip = IpMatcher::None;
    let mut internal = InternalMatcher::None;
    for peer in peers {
        match build_peer_selection(policy_namespace, peer)? {
            PeerSelection::IpBlock { cidr, except } => {
                let block = IpBlockMatcher {
                    cidr,
                    except,
                    port: port.clone(),
                };
                // The block's ports apply inside the block only; nothing is
                // granted to all IPs.
                ip = ip.union(IpMatcher::specific(PortMatcher::None, Some(block)));
            }
            PeerSelection::NamespacePod(namespace, pod) => {
                if matches!(port, PortMatcher::All)
                    && matches!(namespace, NamespaceMatcher::All)
                    && matches!(pod, PodMatcher::All)
                {
                    // Everything on the internal axis is allowed; All absorbs
                    // whatever later peers contribute.
                    internal = internal.union(InternalMatcher::All);
                }
                internal = internal.union(InternalMatcher::specific(NamespacePodMatcher {
                    namespace,
                    pod,
                    port: port.clone(),
                }));
            }
        }
    }
    Ok(PeerMatcher::Specific(SpecificPeerMatcher { ip, internal }))
}

enum PeerSelection {
    IpBlock { cidr: Cidr, except: Vec<Cidr> },
    NamespacePod(NamespaceMatcher, PodMatcher),
}

fn build_peer_selection(
    policy_namespace: &str,
    peer: &k8s::NetworkPolicyPeer,
) -> Result<PeerSelection, InvalidPolicy> {
    if let Some(ip_block) = peer.ip_block.as_ref() {
        if peer.namespace_selector.is_some() || peer.pod_selector.is_some() {
            return Err(InvalidPolicy::PeerMixed);
        }
        let cidr = ip_block.cidr.parse::<Cidr>()?;
        let mut except = ip_block
            .except
            .iter()
            .flatten()
            .map(|e| e.parse::<Cidr>())
            .collect::<Result<Vec<_>, _>>()?;
        // Canonical order from the start, so merged blocks and rendered
        // output are independent of rule order.
        except.sort_by_key(|c| c.to_string());
        except.dedup();
        return Ok(PeerSelection::IpBlock { cidr, except });
    }

    if peer.namespace_selector.is_none() && peer.pod_selector.is_none() {
        return Err(InvalidPolicy::PeerAllNil);
    }

    let namespace = match peer.namespace_selector.as_ref() {
        // No namespace selector scopes the peer to the policy's namespace.
        None => NamespaceMatcher::Exact(policy_namespace.to_string()),
        Some(selector) if labels::selects_all(selector) => NamespaceMatcher::All,
        Some(selector) => NamespaceMatcher::Selector(selector.clone()),
    };
    let pod = match peer.pod_selector.as_ref() {
        None => PodMatcher::All,
        Some(selector) if labels::selects_all(selector) => PodMatcher::All,
        Some(selector) => PodMatcher::Selector(selector.clone()),
    };
    Ok(PeerSelection::NamespacePod(namespace, pod))
}

fn build_port_matcher(ports: &[k8s::NetworkPolicyPort]) -> Result<PortMatcher, InvalidPolicy> {
    if ports.is_empty() {
        return Ok(PortMatcher::All);
    }

    let mut matchers = Vec::with_capacity(ports.len());
    for p in ports {
        let protocol = match p.protocol.as_deref() {
            None => Protocol::Tcp,
            Some(s) => s.parse::<Protocol>()?,
        };
        let port = p.port.as_ref().map(convert_port).transpose()?;
        let pp = PortProtocol { port, protocol };
        if !matchers.contains(&pp) {
            matchers.push(pp);
        }
    }
    Ok(PortMatcher::Specific(matchers))
}

fn convert_port(port: &k8s::IntOrString) -> Result<Port, InvalidPolicy> {
    match port {
        k8s::IntOrString::Int(n) => u16::try_from(*n)
            .ok()
            .and_then(NonZeroU16::new)
            .map(Port::Number)
            .ok_or(InvalidPolicy::PortOutOfRange(*n)),
        k8s::IntOrString::String(name) => Ok(Port::Name(name.clone())),
    }
}
