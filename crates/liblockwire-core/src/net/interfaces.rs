//! Enumeration of the addresses assigned to local network interfaces

use std::io;
use std::net::IpAddr;

/// One address assigned to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// Interface name (e.g., "lo", "eth0")
    pub name: String,
    pub address: IpAddr,
    pub is_loopback: bool,
}

impl InterfaceAddress {
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
            is_loopback: address.is_loopback(),
        }
    }
}

/// List the addresses of every interface that is up
#[cfg(unix)]
pub fn enumerate_interfaces() -> io::Result<Vec<InterfaceAddress>> {
    use std::ffi::CStr;
    use std::net::{Ipv4Addr, Ipv6Addr};

    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut found = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: getifaddrs returned a valid list that stays alive until freeifaddrs
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_addr.is_null() {
            continue;
        }
        let flags = entry.ifa_flags as libc::c_int;
        if flags & libc::IFF_UP == 0 {
            continue;
        }

        // SAFETY: ifa_addr was checked for null and points to a sockaddr header
        let family = unsafe { (*entry.ifa_addr).sa_family } as libc::c_int;
        let address = if family == libc::AF_INET {
            // SAFETY: the family is AF_INET, so the address is a sockaddr_in
            let sin = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
            IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
        } else if family == libc::AF_INET6 {
            // SAFETY: the family is AF_INET6, so the address is a sockaddr_in6
            let sin6 = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in6) };
            IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr))
        } else {
            continue;
        };

        let name = if entry.ifa_name.is_null() {
            String::new()
        } else {
            // SAFETY: ifa_name is a non-null NUL-terminated string owned by the list
            unsafe { CStr::from_ptr(entry.ifa_name) }
                .to_string_lossy()
                .into_owned()
        };

        let mut interface = InterfaceAddress::new(name, address);
        interface.is_loopback |= flags & libc::IFF_LOOPBACK != 0;
        found.push(interface);
    }

    // SAFETY: head came from getifaddrs and no reference into the list outlives this call
    unsafe { libc::freeifaddrs(head) };
    Ok(found)
}

/// Without getifaddrs only the loopback addresses are known
#[cfg(not(unix))]
pub fn enumerate_interfaces() -> io::Result<Vec<InterfaceAddress>> {
    use std::net::{Ipv4Addr, Ipv6Addr};

    Ok(vec![
        InterfaceAddress::new("loopback", IpAddr::V4(Ipv4Addr::LOCALHOST)),
        InterfaceAddress::new("loopback", IpAddr::V6(Ipv6Addr::LOCALHOST)),
    ])
}
