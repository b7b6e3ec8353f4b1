//! Address and network matching for host allow-lists.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;

use crate::error::{BotscanError, Result};

/// A single address or a network range, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpEntity {
    Address(IpAddr),
    Network(IpNetwork),
}

impl IpEntity {
    /// Parse a token as an address first, then as a network in either CIDR
    /// (`10.0.0.0/24`) or address/mask (`10.0.0.0/255.255.255.0`) form.
    ///
    /// Networks with host bits set (`10.0.0.5/24`) are rejected.
    pub fn parse(token: &str) -> Result<Self> {
        if let Ok(addr) = token.parse::<IpAddr>() {
            return Ok(Self::Address(addr));
        }

        let network = token
            .parse::<IpNetwork>()
            .map_err(|_| BotscanError::InvalidAddress(token.to_string()))?;
        if network.ip() != network.network() {
            return Err(BotscanError::InvalidAddress(token.to_string()));
        }
        Ok(Self::Network(network))
    }

    /// Check whether `candidate` is this address or falls inside this network.
    ///
    /// An unparsable candidate is a non-match when `ignore_invalid` is set and
    /// an [`BotscanError::InvalidAddress`] otherwise.
    pub fn matches(&self, candidate: &str, ignore_invalid: bool) -> Result<bool> {
        let addr = match candidate.parse::<IpAddr>() {
            Ok(addr) => addr,
            Err(_) if ignore_invalid => return Ok(false),
            Err(_) => return Err(BotscanError::InvalidAddress(candidate.to_string())),
        };
        Ok(self.contains(addr))
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        match self {
            Self::Address(own) => *own == addr,
            Self::Network(net) => net.contains(addr),
        }
    }
}

impl FromStr for IpEntity {
    type Err = BotscanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for IpEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(addr) => write!(f, "address {addr}"),
            Self::Network(net) => write!(f, "network {net}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_address_matches_only_itself() {
        let entity = IpEntity::parse("10.0.0.5").unwrap();
        assert!(matches!(entity, IpEntity::Address(_)));
        assert!(entity.matches("10.0.0.5", false).unwrap());
        assert!(!entity.matches("10.0.0.6", false).unwrap());
        assert!(!entity.matches("10.0.1.5", false).unwrap());
    }

    #[test]
    fn test_cidr_network_matches_whole_range() {
        let entity = IpEntity::parse("10.0.0.0/24").unwrap();
        assert!(matches!(entity, IpEntity::Network(_)));
        for last in [0u8, 1, 128, 255] {
            assert!(entity.matches(&format!("10.0.0.{last}"), false).unwrap());
        }
        assert!(!entity.matches("10.0.1.0", false).unwrap());
        assert!(!entity.matches("9.255.255.255", false).unwrap());
    }

    #[test]
    fn test_netmask_network() {
        let entity = IpEntity::parse("147.32.84.0/255.255.255.0").unwrap();
        assert!(entity.matches("147.32.84.208", false).unwrap());
        assert!(!entity.matches("147.32.85.208", false).unwrap());
    }

    #[test]
    fn test_ipv6() {
        let entity = IpEntity::parse("2001:db8::/32").unwrap();
        assert!(entity.matches("2001:db8::1", false).unwrap());
        assert!(!entity.matches("2001:db9::1", false).unwrap());
        assert!(!entity.matches("10.0.0.1", false).unwrap());
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        for token in ["", "not-an-ip", "10.0.0.256", "10.0.0.0/33", "10.0.0.5/24"] {
            assert!(
                matches!(IpEntity::parse(token), Err(BotscanError::InvalidAddress(_))),
                "{token} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_str_and_display() {
        let addr: IpEntity = "10.0.0.5".parse().unwrap();
        assert_eq!(addr.to_string(), "address 10.0.0.5");

        let net: IpEntity = "147.32.84.0/255.255.255.0".parse().unwrap();
        assert_eq!(net.to_string(), "network 147.32.84.0/24");

        assert!("10.0.0.5/24".parse::<IpEntity>().is_err());
    }

    #[test]
    fn test_invalid_candidate() {
        let entity = IpEntity::parse("10.0.0.0/8").unwrap();
        assert!(!entity.matches("garbage", true).unwrap());
        assert!(matches!(
            entity.matches("garbage", false),
            Err(BotscanError::InvalidAddress(token)) if token == "garbage"
        ));
    }
}
