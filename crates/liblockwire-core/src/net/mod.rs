//! Local address resolution
//!
//! A host may be reachable through several local addresses (loopback, VPN
//! adapters, container bridges), and two processes on the same machine do not
//! necessarily agree on which one "localhost" is. The resolver picks the
//! address a listening socket binds to and the ordered list of addresses a
//! peer should try, loopback first.

mod interfaces;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::config::NetworkConfig;

pub use interfaces::{enumerate_interfaces, InterfaceAddress};

/// Source of the local addresses used for same-machine signalling
pub trait AddressResolver: Send + Sync {
    /// Best-effort name of this machine. Never waits on DNS.
    fn hostname(&self) -> String;

    /// Determines if the address can be used to reach this machine
    fn is_communication_address(&self, address: IpAddr) -> bool;

    /// Addresses a peer process may need to target, loopback first. Never empty.
    fn communication_addresses(&self) -> Vec<IpAddr>;

    /// Address a listening socket should bind to
    fn local_binding_address(&self) -> IpAddr;
}

/// Resolver backed by the interface list of the host, read once at construction
#[derive(Debug)]
pub struct InterfaceAddressResolver {
    interfaces: Vec<InterfaceAddress>,
    binding: IpAddr,
    communication: Vec<IpAddr>,
    hostname: OnceLock<String>,
}

impl InterfaceAddressResolver {
    /// Enumerate the host's interfaces
    pub fn new(config: &NetworkConfig) -> Self {
        let interfaces = match enumerate_interfaces() {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to enumerate network interfaces: {}", e);
                Vec::new()
            }
        };
        Self::from_interfaces(interfaces, config.bind_all_interfaces)
    }

    /// Build a resolver from an explicit interface list
    pub fn from_interfaces(interfaces: Vec<InterfaceAddress>, bind_all_interfaces: bool) -> Self {
        let interfaces: Vec<InterfaceAddress> = interfaces
            .into_iter()
            .filter(|i| !is_ipv6_link_local(i.address))
            .collect();

        // Stay in one address family so a socket bound in it can reach every candidate
        let use_ipv4 = interfaces.is_empty() || interfaces.iter().any(|i| i.address.is_ipv4());
        let (canonical_loopback, wildcard) = if use_ipv4 {
            (IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        } else {
            (IpAddr::V6(Ipv6Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::UNSPECIFIED))
        };

        let mut loopback = Vec::new();
        let mut remote = Vec::new();
        for interface in interfaces.iter().filter(|i| i.address.is_ipv4() == use_ipv4) {
            let bucket = if interface.is_loopback {
                &mut loopback
            } else {
                &mut remote
            };
            if !bucket.contains(&interface.address) {
                bucket.push(interface.address);
            }
        }
        // Stable sort keeps interface order among the rest
        loopback.sort_by_key(|address| *address != canonical_loopback);

        let binding = if bind_all_interfaces || loopback.is_empty() {
            wildcard
        } else {
            loopback[0]
        };

        let mut communication = loopback;
        if binding.is_unspecified() {
            communication.extend(remote);
        }
        if communication.is_empty() {
            communication.push(canonical_loopback);
        }

        debug!(
            binding = %binding,
            candidates = ?communication,
            "Resolved local communication addresses"
        );

        Self {
            interfaces,
            binding,
            communication,
            hostname: OnceLock::new(),
        }
    }

    /// Interface addresses this resolver was built from
    pub fn interfaces(&self) -> &[InterfaceAddress] {
        &self.interfaces
    }
}

impl AddressResolver for InterfaceAddressResolver {
    fn hostname(&self) -> String {
        self.hostname
            .get_or_init(|| {
                read_hostname().unwrap_or_else(|| self.communication[0].to_string())
            })
            .clone()
    }

    fn is_communication_address(&self, address: IpAddr) -> bool {
        address.is_loopback() || self.interfaces.iter().any(|i| i.address == address)
    }

    fn communication_addresses(&self) -> Vec<IpAddr> {
        self.communication.clone()
    }

    fn local_binding_address(&self) -> IpAddr {
        self.binding
    }
}

/// Resolver with a fixed address list, for tests and embedders that already know their addresses
#[derive(Debug, Clone)]
pub struct FixedAddressResolver {
    hostname: String,
    binding: IpAddr,
    communication: Vec<IpAddr>,
}

impl FixedAddressResolver {
    /// An empty candidate list falls back to the IPv4 loopback
    pub fn new(binding: IpAddr, communication: Vec<IpAddr>) -> Self {
        let communication = if communication.is_empty() {
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]
        } else {
            communication
        };
        Self {
            hostname: "localhost".to_string(),
            binding,
            communication,
        }
    }

    /// Bind and talk over 127.0.0.1 only
    pub fn loopback() -> Self {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self::new(loopback, vec![loopback])
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }
}

impl AddressResolver for FixedAddressResolver {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn is_communication_address(&self, address: IpAddr) -> bool {
        address.is_loopback() || self.communication.contains(&address)
    }

    fn communication_addresses(&self) -> Vec<IpAddr> {
        self.communication.clone()
    }

    fn local_binding_address(&self) -> IpAddr {
        self.binding
    }
}

fn read_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.trim().is_empty())
}

fn is_ipv6_link_local(address: IpAddr) -> bool {
    match address {
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        IpAddr::V4(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, address: &str) -> InterfaceAddress {
        InterfaceAddress::new(name, address.parse().unwrap())
    }

    fn ip(address: &str) -> IpAddr {
        address.parse().unwrap()
    }

    #[test]
    fn test_prefers_loopback() {
        let resolver = InterfaceAddressResolver::from_interfaces(
            vec![
                iface("eth0", "192.168.1.20"),
                iface("lo", "127.0.0.1"),
                iface("lo", "::1"),
            ],
            false,
        );

        assert_eq!(resolver.local_binding_address(), ip("127.0.0.1"));
        assert_eq!(resolver.communication_addresses(), vec![ip("127.0.0.1")]);
    }

    #[test]
    fn test_canonical_loopback_ordered_first() {
        let resolver = InterfaceAddressResolver::from_interfaces(
            vec![iface("lo", "127.0.1.1"), iface("lo", "127.0.0.1")],
            false,
        );

        assert_eq!(
            resolver.communication_addresses(),
            vec![ip("127.0.0.1"), ip("127.0.1.1")]
        );
        assert_eq!(resolver.local_binding_address(), ip("127.0.0.1"));
    }

    #[test]
    fn test_bind_all_adds_remote_after_loopback() {
        let resolver = InterfaceAddressResolver::from_interfaces(
            vec![
                iface("eth0", "192.168.1.20"),
                iface("lo", "127.0.0.1"),
                iface("docker0", "172.17.0.1"),
            ],
            true,
        );

        assert_eq!(resolver.local_binding_address(), ip("0.0.0.0"));
        assert_eq!(
            resolver.communication_addresses(),
            vec![ip("127.0.0.1"), ip("192.168.1.20"), ip("172.17.0.1")]
        );
    }

    #[test]
    fn test_no_loopback_binds_wildcard() {
        let resolver =
            InterfaceAddressResolver::from_interfaces(vec![iface("eth0", "10.0.0.5")], false);

        assert_eq!(resolver.local_binding_address(), ip("0.0.0.0"));
        assert_eq!(resolver.communication_addresses(), vec![ip("10.0.0.5")]);
    }

    #[test]
    fn test_nothing_found_falls_back_to_loopback() {
        let resolver = InterfaceAddressResolver::from_interfaces(Vec::new(), false);

        assert_eq!(resolver.communication_addresses(), vec![ip("127.0.0.1")]);
        assert!(resolver.local_binding_address().is_unspecified());
    }

    #[test]
    fn test_ipv6_only_host() {
        let resolver = InterfaceAddressResolver::from_interfaces(
            vec![iface("lo", "::1"), iface("eth0", "fe80::1"), iface("eth0", "2001:db8::5")],
            false,
        );

        assert_eq!(resolver.local_binding_address(), ip("::1"));
        assert_eq!(resolver.communication_addresses(), vec![ip("::1")]);
        // Link-local addresses need a scope id and are never candidates
        assert!(!resolver.is_communication_address(ip("fe80::1")));
        assert!(resolver.is_communication_address(ip("2001:db8::5")));
    }

    #[test]
    fn test_is_communication_address() {
        let resolver = InterfaceAddressResolver::from_interfaces(
            vec![iface("lo", "127.0.0.1"), iface("eth0", "192.168.1.20")],
            false,
        );

        assert!(resolver.is_communication_address(ip("127.0.0.1")));
        assert!(resolver.is_communication_address(ip("127.0.0.53")));
        assert!(resolver.is_communication_address(ip("192.168.1.20")));
        assert!(!resolver.is_communication_address(ip("8.8.8.8")));
    }

    #[test]
    fn test_hostname_is_cached_and_non_empty() {
        let resolver =
            InterfaceAddressResolver::from_interfaces(vec![iface("lo", "127.0.0.1")], false);
        let first = resolver.hostname();
        assert!(!first.is_empty());
        assert_eq!(resolver.hostname(), first);
    }

    #[test]
    fn test_fixed_resolver_never_empty() {
        let resolver = FixedAddressResolver::new(ip("127.0.0.1"), Vec::new());
        assert_eq!(resolver.communication_addresses(), vec![ip("127.0.0.1")]);

        let resolver = FixedAddressResolver::loopback().with_hostname("build-host");
        assert_eq!(resolver.hostname(), "build-host");
        assert!(resolver.is_communication_address(ip("127.0.0.1")));
        assert!(!resolver.is_communication_address(ip("10.1.1.1")));
    }

    #[test]
    fn test_host_resolver_is_usable() {
        let resolver = InterfaceAddressResolver::new(&NetworkConfig::default());
        let addresses = resolver.communication_addresses();
        assert!(!addresses.is_empty());
        assert!(addresses
            .iter()
            .all(|a| a.is_ipv4() == resolver.local_binding_address().is_ipv4()));
    }
}
