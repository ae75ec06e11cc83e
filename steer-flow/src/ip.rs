//! Utilities for dealing with IP prefixes in match predicates.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

/// Compute an IPv4 netmask from a prefix length.
pub fn ipv4_mask(prefix_len: u8) -> Ipv4Addr {
    if prefix_len == 0 {
        return Ipv4Addr::new(0, 0, 0, 0);
    }
    let mask_u32 = u32::MAX << (32 - prefix_len.min(32));
    Ipv4Addr::from(mask_u32)
}

/// Compute an IPv6 netmask from a prefix length.
pub fn ipv6_mask(prefix_len: u8) -> Ipv6Addr {
    if prefix_len == 0 {
        return Ipv6Addr::from(0u128);
    }
    let mask_u128 = u128::MAX << (128 - prefix_len.min(128));
    Ipv6Addr::from(mask_u128)
}

/// A subnet, composed of a base IP address and a netmask.
///
/// Parsed from either a bare address (`2.2.2.2`, host prefix) or CIDR notation (`2.2.2.0/24`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    pub network_address: IpAddr,
    pub netmask: u8,
}

impl Subnet {
    pub fn new(address: IpAddr, mask: u8) -> Self {
        Self { network_address: address, netmask: mask }
    }

    /// A single-address subnet (/32 or /128).
    pub fn host(address: IpAddr) -> Self {
        let mask = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self::new(address, mask)
    }

    pub fn is_ipv4(&self) -> bool {
        self.network_address.is_ipv4()
    }

    /// Returns `true` if `other` lies entirely within this subnet.
    pub fn contains(&self, other: &Self) -> bool {
        if other.netmask < self.netmask {
            return false;
        }

        match (self.network_address, other.network_address) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = u32::from(ipv4_mask(self.netmask));
                u32::from(a) & mask == u32::from(b) & mask
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let mask = u128::from(ipv6_mask(self.netmask));
                u128::from(a) & mask == u128::from(b) & mask
            }
            _ => false,
        }
    }
}

impl From<IpAddr> for Subnet {
    fn from(address: IpAddr) -> Self {
        Self::host(address)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_address, self.netmask)
    }
}

/// Error returned when a string is not an address or a CIDR prefix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid subnet: {0}")]
pub struct SubnetParseError(String);

impl FromStr for Subnet {
    type Err = SubnetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || SubnetParseError(s.to_string());

        let Some((address, mask)) = s.split_once('/') else {
            return s.parse::<IpAddr>().map(Self::host).map_err(|_| err());
        };

        let address = address.parse::<IpAddr>().map_err(|_| err())?;
        let mask = mask.parse::<u8>().map_err(|_| err())?;
        let max = if address.is_ipv4() { 32 } else { 128 };
        if mask > max {
            return Err(err());
        }

        Ok(Self::new(address, mask))
    }
}
