//! Renders a compiled [`Policy`] as indented text.
//!
//! Output is deterministic: targets traverse in primary-key order, matcher
//! maps iterate in canonical-key order, and port lists print in source
//! order. Equal Policies render byte-identically.

use crate::{
    internal::InternalMatcher,
    ip::{IpBlockMatcher, IpMatcher},
    peer::{PeerMatcher, SpecificPeerMatcher},
    port::PortMatcher,
    target::{Direction, Policy, Target},
};

/// Produces a multi-line report of every Target in the policy. Targets are
/// separated by a blank line; there is no trailing newline.
pub fn explain(policy: &Policy) -> String {
    let (ingress, egress) = policy.sorted_targets();
    let mut blocks = Vec::new();
    for target in ingress {
        blocks.push(explain_target(target, Direction::Ingress).join("\n"));
    }
    for target in egress {
        blocks.push(explain_target(target, Direction::Egress).join("\n"));
    }
    blocks.join("\n\n")
}

fn explain_target(target: &Target, direction: Direction) -> Vec<String> {
    let mut lines = vec![target.primary_key()];

    if !target.source_rules.is_empty() {
        lines.push("  source rules:".to_string());
        for rule in &target.source_rules {
            lines.push(format!(
                "    {}/{}",
                rule.metadata.namespace.as_deref().unwrap_or("default"),
                rule.metadata.name.as_deref().unwrap_or(""),
            ));
        }
    }

    match &target.peer {
        PeerMatcher::None => lines.push(format!("  all {} blocked", direction)),
        PeerMatcher::All => lines.push(format!("  all {} allowed", direction)),
        PeerMatcher::Specific(peer) => {
            lines.push(format!("  {}:", direction));
            explain_specific_peer(peer, "    ", &mut lines);
        }
    }

    lines
}

fn explain_specific_peer(peer: &SpecificPeerMatcher, indent: &str, lines: &mut Vec<String>) {
    explain_ip(&peer.ip, indent, lines);
    explain_internal(&peer.internal, indent, lines);
}

fn explain_ip(ip: &IpMatcher, indent: &str, lines: &mut Vec<String>) {
    match ip {
        IpMatcher::All => lines.push(format!("{}all ips", indent)),
        IpMatcher::None => lines.push(format!("{}no ips", indent)),
        IpMatcher::Specific(matcher) => {
            lines.push(format!("{}Ports for all IPs", indent));
            explain_ports(&matcher.ports_for_all_ips, &deeper(indent), lines);
            lines.push(format!("{}IPBlock(s):", indent));
            for block in matcher.blocks.values() {
                explain_ip_block(block, &deeper(indent), lines);
            }
        }
    }
}

fn explain_ip_block(block: &IpBlockMatcher, indent: &str, lines: &mut Vec<String>) {
    let except = block
        .except
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("{}IPBlock: cidr {}, except [{}]", indent, block.cidr, except));
    explain_ports(&block.port, &deeper(indent), lines);
}

fn explain_internal(internal: &InternalMatcher, indent: &str, lines: &mut Vec<String>) {
    lines.push(format!("{}Internal:", indent));
    let indent = deeper(indent);
    match internal {
        InternalMatcher::None => lines.push(format!("{}all pods blocked", indent)),
        InternalMatcher::All => lines.push(format!("{}all pods in all namespaces", indent)),
        InternalMatcher::Specific(matcher) => {
            for peer in matcher.peers.values() {
                lines.push(format!("{}Namespace/Pod:", indent));
                let indent = deeper(&indent);
                lines.push(format!("{}{}", indent, peer.namespace.canonical()));
                lines.push(format!("{}{}", indent, peer.pod.canonical()));
                explain_ports(&peer.port, &indent, lines);
            }
        }
    }
}

fn explain_ports(port: &PortMatcher, indent: &str, lines: &mut Vec<String>) {
    lines.push(format!("{}Port(s):", indent));
    let indent = deeper(indent);
    match port {
        PortMatcher::None => lines.push(format!("{}no ports", indent)),
        PortMatcher::All => lines.push(format!("{}all ports all protocols", indent)),
        PortMatcher::Specific(ports) => {
            for pp in ports {
                match &pp.port {
                    Some(port) => {
                        lines.push(format!("{}port {} on protocol {}", indent, port, pp.protocol))
                    }
                    None => lines.push(format!("{}all ports on protocol {}", indent, pp.protocol)),
                }
            }
        }
    }
}

fn deeper(indent: &str) -> String {
    format!("{}  ", indent)
}
