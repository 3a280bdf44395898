//! UE IPv4 Address Pool

use std::net::Ipv4Addr;

use crate::error::{PoolError, PoolResult};
use crate::idgen::IdGenerator;

/// IPv4 address pool over one subnet.
///
/// The network and broadcast addresses are never handed out.
#[derive(Debug)]
pub struct UeIpPool {
    network: Ipv4Addr,
    prefix_len: u8,
    hosts: IdGenerator,
}

impl UeIpPool {
    /// Build a pool from CIDR notation, e.g. `10.60.0.0/16`
    pub fn from_cidr(cidr: &str) -> PoolResult<Self> {
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| PoolError::InvalidSubnet(cidr.to_string()))?;
        let addr: Ipv4Addr = addr
            .trim()
            .parse()
            .map_err(|_| PoolError::InvalidSubnet(cidr.to_string()))?;
        let prefix_len: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| PoolError::InvalidSubnet(cidr.to_string()))?;
        if prefix_len > 30 {
            return Err(PoolError::InvalidSubnet(cidr.to_string()));
        }

        let host_bits = 32 - u32::from(prefix_len);
        let mask = if host_bits == 32 { 0 } else { u32::MAX << host_bits };
        let network = Ipv4Addr::from(u32::from(addr) & mask);
        let last_host = (1i64 << host_bits) - 2;

        Ok(Self {
            network,
            prefix_len,
            hosts: IdGenerator::new(&format!("ue-ip {}", cidr), 1, last_host)?,
        })
    }

    /// Allocate one host address
    pub fn allocate(&self) -> PoolResult<Ipv4Addr> {
        let offset = self.hosts.allocate()?;
        Ok(Ipv4Addr::from(u32::from(self.network) + offset as u32))
    }

    /// Release an address previously returned by [`allocate`](Self::allocate)
    pub fn free(&self, addr: Ipv4Addr) -> PoolResult<bool> {
        let offset = i64::from(u32::from(addr).wrapping_sub(u32::from(self.network)));
        if offset < self.hosts.min() || offset > self.hosts.max() {
            return Err(PoolError::OutOfSubnet(addr));
        }
        Ok(self.hosts.free(offset))
    }

    /// Subnet network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Subnet prefix length
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of addresses currently allocated
    pub fn in_use(&self) -> usize {
        self.hosts.in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_from_subnet() {
        let pool = UeIpPool::from_cidr("10.60.0.0/16").unwrap();
        assert_eq!(pool.network(), Ipv4Addr::new(10, 60, 0, 0));
        assert_eq!(pool.prefix_len(), 16);
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 60, 0, 1));
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 60, 0, 2));
    }

    #[test]
    fn test_network_is_masked() {
        let pool = UeIpPool::from_cidr("192.168.7.99/24").unwrap();
        assert_eq!(pool.network(), Ipv4Addr::new(192, 168, 7, 0));
    }

    #[test]
    fn test_small_subnet_exhausts() {
        // /30 has two usable hosts
        let pool = UeIpPool::from_cidr("10.0.0.0/30").unwrap();
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 2));
        assert!(matches!(pool.allocate(), Err(PoolError::Exhausted { .. })));

        assert!(pool.free(Ipv4Addr::new(10, 0, 0, 1)).unwrap());
        assert_eq!(pool.allocate().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_free_outside_subnet() {
        let pool = UeIpPool::from_cidr("10.0.0.0/24").unwrap();
        assert_eq!(
            pool.free(Ipv4Addr::new(10, 0, 1, 5)),
            Err(PoolError::OutOfSubnet(Ipv4Addr::new(10, 0, 1, 5)))
        );
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(UeIpPool::from_cidr("10.0.0.0").is_err());
        assert!(UeIpPool::from_cidr("10.0.0/8").is_err());
        assert!(UeIpPool::from_cidr("10.0.0.0/31").is_err());
        assert!(UeIpPool::from_cidr("10.0.0.0/abc").is_err());
    }
}
