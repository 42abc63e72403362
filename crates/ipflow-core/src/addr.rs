//! IPv4 address predicates the standard library type does not provide.
//!
//! The engine works directly with [`std::net::Ipv4Addr`]; this module adds
//! the handful of classification helpers the forwarding plane needs.

use std::net::Ipv4Addr;

/// The limited broadcast address, 255.255.255.255.
pub const LIMITED_BROADCAST: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// The unspecified address, 0.0.0.0.
pub const UNSPECIFIED: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

/// Returns true for the limited broadcast address 255.255.255.255.
pub fn is_limited_broadcast(addr: Ipv4Addr) -> bool {
    addr == LIMITED_BROADCAST
}

/// Returns true for link-local multicast addresses (224.0.0.0/24).
///
/// Datagrams in this range are never forwarded off the local link.
pub fn is_link_local_multicast(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 224 && octets[1] == 0 && octets[2] == 0
}

/// Computes the directed broadcast address of the subnet `addr`/`netmask`.
pub fn subnet_broadcast(addr: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    let addr = u32::from(addr);
    let mask = u32::from(netmask);
    Ipv4Addr::from(addr | !mask)
}

/// Returns true if `addr` and `other` share the subnet given by `netmask`.
pub fn same_subnet(addr: Ipv4Addr, other: Ipv4Addr, netmask: Ipv4Addr) -> bool {
    let mask = u32::from(netmask);
    u32::from(addr) & mask == u32::from(other) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_broadcast() {
        assert!(is_limited_broadcast(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(!is_limited_broadcast(Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn test_link_local_multicast() {
        assert!(is_link_local_multicast(Ipv4Addr::new(224, 0, 0, 1)));
        assert!(is_link_local_multicast(Ipv4Addr::new(224, 0, 0, 251)));
        assert!(!is_link_local_multicast(Ipv4Addr::new(224, 0, 1, 1)));
        assert!(!is_link_local_multicast(Ipv4Addr::new(239, 0, 0, 1)));
    }

    #[test]
    fn test_subnet_broadcast() {
        let bcast = subnet_broadcast(
            Ipv4Addr::new(192, 168, 1, 7),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        assert_eq!(bcast, Ipv4Addr::new(192, 168, 1, 255));
    }

    #[test]
    fn test_same_subnet() {
        let mask = Ipv4Addr::new(255, 255, 255, 0);
        assert!(same_subnet(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 200),
            mask
        ));
        assert!(!same_subnet(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 1, 1),
            mask
        ));
    }
}
