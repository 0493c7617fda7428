use crate::port::{PortMatcher, Protocol};
use std::{collections::BTreeMap, fmt, net::IpAddr, num::NonZeroU16, str::FromStr};

/// A network expressed as a bare address or in CIDR notation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cidr {
    Addr(IpAddr),
    Net(ipnet::IpNet),
}

#[derive(Debug, thiserror::Error)]
#[error("not a valid CIDR or IP address: {0}")]
pub struct CidrParseError(String);

/// Matches external IPs inside a CIDR, minus exceptions, on a set of ports.
#[derive(Clone, Debug, PartialEq)]
pub struct IpBlockMatcher {
    pub cidr: Cidr,
    pub except: Vec<Cidr>,
    pub port: PortMatcher,
}

/// The `Specific` arm of [`IpMatcher`].
#[derive(Clone, Debug, PartialEq)]
pub struct SpecificIpMatcher {
    /// Ports admitted for every IP, as contributed by peer-less rules with a
    /// restricted port list. Never absorbs per-block port grants.
    pub ports_for_all_ips: PortMatcher,

    /// At most one block per canonical CIDR.
    pub blocks: BTreeMap<String, IpBlockMatcher>,
}

/// Decides whether an external IP peer is admitted.
#[derive(Clone, Debug, PartialEq)]
pub enum IpMatcher {
    None,
    All,
    Specific(SpecificIpMatcher),
}

// === impl Cidr ===

impl Cidr {
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match self {
            Self::Net(net) => net.contains(addr),
            Self::Addr(a) => a == addr,
        }
    }
}

impl FromStr for Cidr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(net) = s.parse() {
            return Ok(Self::Net(net));
        }

        if let Ok(addr) = s.parse() {
            return Ok(Self::Addr(addr));
        }

        Err(CidrParseError(s.to_string()))
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(addr) => addr.fmt(f),
            Self::Net(net) => net.fmt(f),
        }
    }
}

// === impl IpBlockMatcher ===

impl IpBlockMatcher {
    /// The canonical form of the block's CIDR, keying it within a
    /// [`SpecificIpMatcher`].
    pub fn key(&self) -> String {
        self.cidr.to_string()
    }

    /// Merges a block naming the same CIDR: exceptions accumulate
    /// (deduplicated, canonically ordered) and ports union.
    fn merge(&mut self, other: IpBlockMatcher) {
        for except in other.except {
            if !self.except.contains(&except) {
                self.except.push(except);
            }
        }
        self.except.sort_by_key(|c| c.to_string());
        let port = std::mem::replace(&mut self.port, PortMatcher::None);
        self.port = port.union(other.port);
    }

    fn allows(&self, ip: &IpAddr, port: NonZeroU16, name: Option<&str>, protocol: Protocol) -> bool {
        self.cidr.contains(ip)
            && !self.except.iter().any(|except| except.contains(ip))
            && self.port.allows(port, name, protocol)
    }
}

// === impl IpMatcher ===

impl IpMatcher {
    pub fn specific(
        ports_for_all_ips: PortMatcher,
        blocks: impl IntoIterator<Item = IpBlockMatcher>,
    ) -> Self {
        Self::Specific(SpecificIpMatcher {
            ports_for_all_ips,
            blocks: blocks.into_iter().map(|b| (b.key(), b)).collect(),
        })
    }

    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, x) | (x, Self::None) => x,
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Specific(a), Self::Specific(b)) => {
                let mut blocks = a.blocks;
                for (key, block) in b.blocks {
                    use std::collections::btree_map::Entry;
                    match blocks.entry(key) {
                        Entry::Occupied(mut entry) => entry.get_mut().merge(block),
                        Entry::Vacant(entry) => {
                            entry.insert(block);
                        }
                    }
                }
                Self::Specific(SpecificIpMatcher {
                    ports_for_all_ips: a.ports_for_all_ips.union(b.ports_for_all_ips),
                    blocks,
                })
            }
        }
    }

    pub fn allows(&self, ip: &IpAddr, port: NonZeroU16, name: Option<&str>, protocol: Protocol) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Specific(matcher) => {
                matcher.ports_for_all_ips.allows(port, name, protocol)
                    || matcher
                        .blocks
                        .values()
                        .any(|block| block.allows(ip, port, name, protocol))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortProtocol;

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn port(n: u16) -> NonZeroU16 {
        NonZeroU16::new(n).unwrap()
    }

    fn tcp(n: u16) -> PortMatcher {
        PortMatcher::Specific(vec![PortProtocol {
            port: Some(crate::port::Port::Number(port(n))),
            protocol: Protocol::Tcp,
        }])
    }

    #[test]
    fn cidr_containment() {
        assert!(cidr("10.0.0.0/24").contains(&addr("10.0.0.5")));
        assert!(!cidr("10.0.0.0/24").contains(&addr("10.0.1.5")));
        assert!(cidr("10.0.0.5").contains(&addr("10.0.0.5")));
        assert!(!cidr("10.0.0.5").contains(&addr("10.0.0.6")));
        assert!(cidr("2001:db8::/32").contains(&addr("2001:db8::1")));
    }

    #[test]
    fn block_excepts_deny() {
        let block = IpBlockMatcher {
            cidr: cidr("10.0.0.0/24"),
            except: vec![cidr("10.0.0.5/32")],
            port: PortMatcher::All,
        };
        assert!(block.allows(&addr("10.0.0.4"), port(80), None, Protocol::Tcp));
        assert!(!block.allows(&addr("10.0.0.5"), port(80), None, Protocol::Tcp));
        assert!(!block.allows(&addr("10.1.0.4"), port(80), None, Protocol::Tcp));
    }

    #[test]
    fn union_merges_blocks_by_cidr() {
        let merged = IpMatcher::specific(
            PortMatcher::None,
            Some(IpBlockMatcher {
                cidr: cidr("10.0.0.0/24"),
                except: vec![cidr("10.0.0.5/32")],
                port: tcp(80),
            }),
        )
        .union(IpMatcher::specific(
            PortMatcher::None,
            Some(IpBlockMatcher {
                cidr: cidr("10.0.0.0/24"),
                except: vec![cidr("10.0.0.6/32"), cidr("10.0.0.5/32")],
                port: tcp(81),
            }),
        ));

        let matcher = match merged {
            IpMatcher::Specific(m) => m,
            other => panic!("expected a specific matcher, got {:?}", other),
        };
        assert_eq!(matcher.blocks.len(), 1);
        let block = &matcher.blocks["10.0.0.0/24"];
        assert_eq!(block.except, vec![cidr("10.0.0.5/32"), cidr("10.0.0.6/32")]);
        assert_eq!(block.port, tcp(80).union(tcp(81)));
    }

    #[test]
    fn union_keeps_all_ips_ports_apart_from_blocks() {
        // A peer-less rule's port grant and an ipBlock grant must not bleed
        // into each other when unioned.
        let all_ips_ports = IpMatcher::specific(tcp(80), None);
        let block_only = IpMatcher::specific(
            PortMatcher::None,
            Some(IpBlockMatcher {
                cidr: cidr("172.16.0.0/16"),
                except: vec![],
                port: tcp(443),
            }),
        );

        let merged = all_ips_ports.union(block_only);
        let matcher = match &merged {
            IpMatcher::Specific(m) => m,
            other => panic!("expected a specific matcher, got {:?}", other),
        };
        assert_eq!(matcher.ports_for_all_ips, tcp(80));
        assert_eq!(matcher.blocks["172.16.0.0/16"].port, tcp(443));

        // Port 80 is granted everywhere; 443 only inside the block.
        assert!(merged.allows(&addr("8.8.8.8"), port(80), None, Protocol::Tcp));
        assert!(!merged.allows(&addr("8.8.8.8"), port(443), None, Protocol::Tcp));
        assert!(merged.allows(&addr("172.16.1.1"), port(443), None, Protocol::Tcp));
    }

    #[test]
    fn lattice_identity_and_absorption() {
        let specific = IpMatcher::specific(tcp(80), None);
        assert_eq!(IpMatcher::None.union(specific.clone()), specific);
        assert_eq!(specific.clone().union(IpMatcher::None), specific);
        assert_eq!(IpMatcher::All.union(specific.clone()), IpMatcher::All);
        assert_eq!(specific.union(IpMatcher::All), IpMatcher::All);
    }
}
