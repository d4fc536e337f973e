//! Address and subnet values, represented internally as 128-bit values so
//! IPv4 addresses embed into the IPv6 space and subnet prefix decomposition
//! (`spec.md` §4.2) is a single bit-masking operation regardless of family.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(u128);

impl Address {
    pub fn v4(a: Ipv4Addr) -> Self {
        Address(u128::from(a.to_ipv6_mapped()))
    }

    pub fn v6(a: Ipv6Addr) -> Self {
        Address(u128::from(a))
    }

    pub fn bits(&self) -> u128 {
        self.0
    }

    /// The bit at `index`, counting from the most significant bit (0).
    pub fn bit(&self, index: u32) -> bool {
        (self.0 >> (127 - index)) & 1 == 1
    }

    pub fn to_ip(self) -> IpAddr {
        let v6 = Ipv6Addr::from(self.0);
        if let Some(v4) = v6.to_ipv4_mapped() {
            IpAddr::V4(v4)
        } else {
            IpAddr::V6(v6)
        }
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Address::v4(v4),
            IpAddr::V6(v6) => Address::v6(v6),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let ip: IpAddr = s
            .parse()
            .map_err(|_| Error::query(format!("invalid address: {s}")))?;
        Ok(ip.into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ip())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subnet {
    network: Address,
    /// Prefix length in bits, always expressed against the 128-bit space
    /// (an IPv4 `/24` is stored as `96 + 24 = 120`).
    length: u32,
}

impl Subnet {
    pub fn new(network: Address, length: u32) -> Result<Self> {
        if length > 128 {
            return Err(Error::query(format!("invalid subnet length: {length}")));
        }
        Ok(Subnet { network, length })
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn network(&self) -> Address {
        self.network
    }

    pub fn contains(&self, addr: Address) -> bool {
        if self.length == 0 {
            return true;
        }
        let shift = 128 - self.length;
        (addr.bits() >> shift) == (self.network.bits() >> shift)
    }
}

impl FromStr for Subnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr_part, len_part) = s
            .split_once('/')
            .ok_or_else(|| Error::query(format!("invalid subnet: {s}")))?;
        let ip: IpAddr = addr_part
            .parse()
            .map_err(|_| Error::query(format!("invalid subnet address: {s}")))?;
        let user_len: u32 = len_part
            .parse()
            .map_err(|_| Error::query(format!("invalid subnet length: {s}")))?;
        let addr = Address::from(ip);
        let length = match ip {
            IpAddr::V4(_) => {
                if user_len > 32 {
                    return Err(Error::query(format!("invalid subnet length: {s}")));
                }
                96 + user_len
            }
            IpAddr::V6(_) => {
                if user_len > 128 {
                    return Err(Error::query(format!("invalid subnet length: {s}")));
                }
                user_len
            }
        };
        Subnet::new(addr, length)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub number: u16,
    pub proto: Protocol,
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (num_part, proto_part) = s.split_once('/').unwrap_or((s, "?"));
        let number: u16 = num_part
            .parse()
            .map_err(|_| Error::query(format!("invalid port: {s}")))?;
        let proto = match proto_part {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "icmp" => Protocol::Icmp,
            "?" | "unknown" => Protocol::Unknown,
            other => return Err(Error::query(format!("invalid port protocol: {other}"))),
        };
        Ok(Port { number, proto })
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.proto {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Unknown => "?",
        };
        write!(f, "{}/{}", self.number, proto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_contains_v4() {
        let net: Subnet = "10.0.0.0/24".parse().unwrap();
        let inside: Address = "10.0.0.42".parse().unwrap();
        let outside: Address = "10.0.1.1".parse().unwrap();
        assert!(net.contains(inside));
        assert!(!net.contains(outside));
    }

    #[test]
    fn subnet_widening_includes_more() {
        let narrow: Subnet = "10.0.0.0/24".parse().unwrap();
        let wide: Subnet = "10.0.0.0/16".parse().unwrap();
        let addr: Address = "10.0.1.1".parse().unwrap();
        assert!(!narrow.contains(addr));
        assert!(wide.contains(addr));
    }

    #[test]
    fn port_parses_protocol() {
        let p: Port = "995/?".parse().unwrap();
        assert_eq!(p.number, 995);
        assert_eq!(p.proto, Protocol::Unknown);
    }
}
