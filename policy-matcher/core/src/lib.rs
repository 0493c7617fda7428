//! A NetworkPolicy matcher engine.
//!
//! Compiles Kubernetes NetworkPolicy objects into a normalized matcher tree
//! and answers, for every (target pod, peer, port/protocol) tuple, whether
//! traffic is permitted. Policies combine as a union of allow rules: each
//! axis of a rule (peer kind, namespace, pod labels, IP block, port) is a
//! three-element lattice of `None`/`Specific`/`All` matchers, and
//! overlapping rules fold together under per-axis union. The compiled tree
//! is immutable, queryable, and renders deterministically via [`explain`].

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod builder;
mod explain;
mod internal;
mod ip;
mod peer;
mod port;
mod target;
mod traffic;


pub use self::{
    builder::{build_network_policies, build_network_policy, InvalidPolicy},
    explain::explain,
    internal::{
        InternalMatcher, NamespaceMatcher, NamespacePodMatcher, PodMatcher,
        SpecificInternalMatcher,
    },
    ip::{Cidr, CidrParseError, IpBlockMatcher, IpMatcher, SpecificIpMatcher},
    peer::{PeerMatcher, SpecificPeerMatcher},
    port::{Port, PortMatcher, PortProtocol, Protocol, UnknownProtocol},
    target::{Direction, Policy, Target},
    traffic::{AllowedResult, PodPeer, Traffic, TrafficPeer, Verdict},
};
pub use ipnet::IpNet;
