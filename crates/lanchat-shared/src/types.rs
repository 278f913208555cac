use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique numeric identity of a peer, chosen once at startup.
///
/// Nick names may collide for a while during conflict resolution, the code
/// never does while the peer is online.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerCode(pub u32);

impl PeerCode {
    /// The placeholder nick used when a peer's announced nick can not be used.
    pub fn as_nick(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for PeerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerCode {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(Self)
    }
}

/// Where a peer can be reached with a unicast datagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
