//! IPv4 CIDR checks for the secondary pod CIDR.

use std::net::Ipv4Addr;

/// Blocks a secondary CIDR may be carved from.
pub const SECONDARY_CIDR_CARRIERS: [(Ipv4Addr, u8); 2] = [
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(198, 19, 0, 0), 16),
];

const MIN_PREFIX: u8 = 16;
const MAX_PREFIX: u8 = 28;

/// A parsed IPv4 network with host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Parse `a.b.c.d/n`.
    pub fn parse(s: &str) -> Option<Self> {
        let (addr, prefix) = s.trim().split_once('/')?;
        let addr: Ipv4Addr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        if prefix > 32 {
            return None;
        }
        Some(Self::new(addr, prefix))
    }

    fn new(addr: Ipv4Addr, prefix: u8) -> Self {
        Self {
            network: u32::from(addr) & mask(prefix),
            prefix,
        }
    }

    /// Prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && other.network & mask(self.prefix) == self.network
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) }
}

/// Why a secondary CIDR was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryCidrError {
    /// Not an IPv4 CIDR
    Malformed,
    /// Prefix outside /16../28
    Size,
    /// Outside the carriers or equal to one
    Range,
}

impl SecondaryCidrError {
    /// Message reported to the user.
    pub fn message(self) -> &'static str {
        match self {
            SecondaryCidrError::Malformed => "must be valid CIDR range",
            SecondaryCidrError::Size => "CIDR block sizes must be between a /16 netmask and /28 netmask",
            SecondaryCidrError::Range => "must be within the 100.64.0.0/10 or 198.19.0.0/16 range",
        }
    }
}

/// Check a secondary CIDR against the carrier blocks and size limits.
pub fn validate_secondary_cidr(raw: &str) -> Result<(), SecondaryCidrError> {
    let cidr = Ipv4Cidr::parse(raw).ok_or(SecondaryCidrError::Malformed)?;
    if !(MIN_PREFIX..=MAX_PREFIX).contains(&cidr.prefix()) {
        return Err(SecondaryCidrError::Size);
    }
    let inside = SECONDARY_CIDR_CARRIERS.iter().any(|(addr, prefix)| {
        let carrier = Ipv4Cidr::new(*addr, *prefix);
        carrier.contains(&cidr) && carrier != cidr
    });
    if inside { Ok(()) } else { Err(SecondaryCidrError::Range) }
}

/// Whether `raw` parses as an IPv4 CIDR.
pub fn is_valid_ipv4_cidr(raw: &str) -> bool {
    Ipv4Cidr::parse(raw).is_some()
}
