//! CIDR ranges used to classify endpoints as local or external.

use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// An IPv4 network in prefix notation. Local-net lists hold these to
/// decide which endpoints count as "inside".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Builds the network from an address and prefix length; host bits
    /// of `addr` are cleared.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            addr: Self::network_addr(addr, prefix_len),
            prefix_len,
        }
    }

    /// Parses prefix notation (`"10.0.0.0/8"`). Configuration strings
    /// that don't parse are a config error carrying the input.
    pub fn parse(s: &str) -> Result<Self> {
        let (addr, prefix_len) = split_cidr(s)?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::Config(format!("invalid CIDR '{s}'")))?;
        if prefix_len > 32 {
            return Err(Error::Config(format!("invalid CIDR '{s}'")));
        }
        Ok(Self::new(addr, prefix_len))
    }

    /// True if `addr` falls inside this network.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = Self::prefix_to_mask(self.prefix_len);
        (u32::from(self.addr) & mask) == (u32::from(addr) & mask)
    }

    fn network_addr(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(addr) & Self::prefix_to_mask(prefix_len))
    }

    fn prefix_to_mask(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - prefix_len)
        }
    }
}

/// The IPv6 counterpart of [`Ipv4Cidr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Cidr {
    addr: Ipv6Addr,
    prefix_len: u8,
}

impl Ipv6Cidr {
    /// Builds the network from an address and prefix length; host bits
    /// of `addr` are cleared.
    pub fn new(addr: Ipv6Addr, prefix_len: u8) -> Self {
        Self {
            addr: Self::network_addr(addr, prefix_len),
            prefix_len,
        }
    }

    /// Parses prefix notation (`"fd00::/8"`).
    pub fn parse(s: &str) -> Result<Self> {
        let (addr, prefix_len) = split_cidr(s)?;
        let addr: Ipv6Addr = addr
            .parse()
            .map_err(|_| Error::Config(format!("invalid CIDR '{s}'")))?;
        if prefix_len > 128 {
            return Err(Error::Config(format!("invalid CIDR '{s}'")));
        }
        Ok(Self::new(addr, prefix_len))
    }

    /// True if `addr` falls inside this network.
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        let mask = Self::prefix_to_mask(self.prefix_len);
        (u128::from(self.addr) & mask) == (u128::from(addr) & mask)
    }

    fn network_addr(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
        Ipv6Addr::from(u128::from(addr) & Self::prefix_to_mask(prefix_len))
    }

    fn prefix_to_mask(prefix_len: u8) -> u128 {
        if prefix_len == 0 {
            0
        } else {
            !0u128 << (128 - prefix_len)
        }
    }
}

/// A network of either family, as local-net lists mix both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpCidr {
    V4(Ipv4Cidr),
    V6(Ipv6Cidr),
}

impl IpCidr {
    /// Parses prefix notation of either family; a `:` in the input
    /// selects IPv6.
    pub fn parse(s: &str) -> Result<Self> {
        if s.contains(':') {
            Ipv6Cidr::parse(s).map(IpCidr::V6)
        } else {
            Ipv4Cidr::parse(s).map(IpCidr::V4)
        }
    }

    /// True if `addr` falls inside this network. A family mismatch is
    /// never a match, so v4 endpoints are never "inside" a v6 net.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self, addr) {
            (IpCidr::V4(cidr), IpAddr::V4(addr)) => cidr.contains(addr),
            (IpCidr::V6(cidr), IpAddr::V6(addr)) => cidr.contains(addr),
            _ => false,
        }
    }
}

fn split_cidr(s: &str) -> Result<(&str, u8)> {
    let (addr, prefix) = s
        .split_once('/')
        .ok_or_else(|| Error::Config(format!("invalid CIDR '{s}'")))?;
    let prefix_len: u8 = prefix
        .parse()
        .map_err(|_| Error::Config(format!("invalid CIDR '{s}'")))?;
    Ok((addr, prefix_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_cidr_parse() {
        let cidr = Ipv4Cidr::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(cidr.contains(Ipv4Addr::new(192, 168, 1, 254)));
        assert!(!cidr.contains(Ipv4Addr::new(192, 168, 2, 1)));
    }

    #[test]
    fn test_ipv4_cidr_edge_cases() {
        // /32 - single host
        let cidr = Ipv4Cidr::parse("10.0.0.1/32").unwrap();
        assert!(cidr.contains(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 0, 0, 2)));

        // /0 - all addresses
        let cidr = Ipv4Cidr::parse("0.0.0.0/0").unwrap();
        assert!(cidr.contains(Ipv4Addr::new(1, 2, 3, 4)));
        assert!(cidr.contains(Ipv4Addr::new(255, 255, 255, 255)));
    }

    #[test]
    fn test_ipv6_cidr_parse() {
        let cidr = Ipv6Cidr::parse("2001:db8::/32").unwrap();
        assert!(cidr.contains("2001:db8::1".parse().unwrap()));
        assert!(cidr.contains("2001:db8:ffff::1".parse().unwrap()));
        assert!(!cidr.contains("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(Ipv4Cidr::parse("10.0.0.0").is_err());
        assert!(Ipv4Cidr::parse("10.0.0.0/33").is_err());
        assert!(Ipv4Cidr::parse("not-a-net/8").is_err());
        assert!(Ipv6Cidr::parse("2001:db8::/129").is_err());
    }

    #[test]
    fn test_ip_cidr_family_mismatch() {
        let v4 = IpCidr::parse("10.0.0.0/8").unwrap();
        assert!(v4.contains("10.1.2.3".parse().unwrap()));
        assert!(!v4.contains("2001:db8::1".parse().unwrap()));

        let v6 = IpCidr::parse("fd00::/8").unwrap();
        assert!(v6.contains("fd00::1".parse().unwrap()));
        assert!(!v6.contains("10.1.2.3".parse().unwrap()));
    }
}
