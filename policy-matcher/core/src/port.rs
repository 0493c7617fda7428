use std::{fmt, num::NonZeroU16, str::FromStr};

/// Transport protocols a NetworkPolicy port may name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

/// A port referenced by a rule: numeric, or named. Named ports are resolved
/// by the caller against the destination pod's container ports; the matcher
/// compares names verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Port {
    Number(NonZeroU16),
    Name(String),
}

/// One `ports` entry of a rule. An absent port means every port on the
/// protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortProtocol {
    pub port: Option<Port>,
    pub protocol: Protocol,
}

/// Decides whether a (port, protocol) pair is admitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortMatcher {
    /// Admits nothing.
    None,
    /// Admits every port on every protocol.
    All,
    /// Admits pairs matched by some entry. Entries hold no exact duplicates;
    /// source order is preserved for rendering stability.
    Specific(Vec<PortProtocol>),
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized protocol: {0:?}")]
pub struct UnknownProtocol(pub(crate) String);

// === impl Protocol ===

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            "SCTP" => Ok(Self::Sctp),
            s => Err(UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => "TCP".fmt(f),
            Self::Udp => "UDP".fmt(f),
            Self::Sctp => "SCTP".fmt(f),
        }
    }
}

// === impl Port ===

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Name(name) => name.fmt(f),
        }
    }
}

// === impl PortProtocol ===

impl PortProtocol {
    fn allows(&self, port: NonZeroU16, port_name: Option<&str>, protocol: Protocol) -> bool {
        if self.protocol != protocol {
            return false;
        }
        match &self.port {
            None => true,
            Some(Port::Number(n)) => *n == port,
            Some(Port::Name(name)) => port_name == Some(name.as_str()),
        }
    }
}

// === impl PortMatcher ===

impl PortMatcher {
    /// Combines two port matchers: anything either side admits is admitted.
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::None, x) | (x, Self::None) => x,
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Specific(mut ports), Self::Specific(other)) => {
                for pp in other {
                    if !ports.contains(&pp) {
                        ports.push(pp);
                    }
                }
                Self::Specific(ports)
            }
        }
    }

    pub fn allows(&self, port: NonZeroU16, port_name: Option<&str>, protocol: Protocol) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Specific(ports) => ports.iter().any(|pp| pp.allows(port, port_name, protocol)),
        }
    }
}
