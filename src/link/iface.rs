use std::ffi::CStr;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::{fs, io, mem, ptr};

use tracing::debug;

use crate::error::errno;
use crate::protocol::headers::MacAddr;
use crate::{Error, Result};

const ROUTE_TABLE: &str = "/proc/net/route";

/// Route flag marking an entry whose next hop is a gateway.
const RTF_GATEWAY: u32 = 0x2;

/// A default route read from the kernel routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Interface the route leaves through.
    pub interface: String,
    /// Next hop address.
    pub gateway: Ipv4Addr,
}

/// Returns the default route of the host.
///
/// # Errors
///
/// Returns an error if the routing table cannot be read or has no default
/// gateway entry.
pub fn default_route() -> Result<Route> {
    let table = fs::read_to_string(ROUTE_TABLE)?;

    parse_route_table(&table).ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no default gateway entry in {ROUTE_TABLE}"),
        ))
    })
}

/// Finds the first entry with an all-zero destination and the gateway flag
/// set in the contents of `/proc/net/route`.
///
/// Addresses in the table are hexadecimal in host (little-endian) byte order.
pub fn parse_route_table(table: &str) -> Option<Route> {
    table.lines().skip(1).find_map(|line| {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let [interface, destination, gateway, flags, ..] = columns[..] else {
            return None;
        };

        let flags = u32::from_str_radix(flags, 16).ok()?;
        if destination != "00000000" || flags & RTF_GATEWAY == 0 {
            return None;
        }

        let gateway = u32::from_str_radix(gateway, 16).ok()?;

        Some(Route {
            interface: interface.to_string(),
            gateway: Ipv4Addr::from(gateway.to_le_bytes()),
        })
    })
}

/// A network interface and the addresses the stack sends from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// Kernel interface index.
    pub index: i32,
    /// Primary IPv4 address.
    pub addr: Ipv4Addr,
    /// Hardware address.
    pub mac: MacAddr,
}

impl Interface {
    /// Queries the kernel for the index and addresses of interface `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is too long, the interface does not
    /// exist, or it has no IPv4 address assigned.
    pub fn query(name: &str) -> Result<Self> {
        // The name must be less than `IFNAMSIZ` bytes to stay null-terminated.
        if name.is_empty() || name.len() >= libc::IFNAMSIZ || name.contains('\0') {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid interface name: {name:?}"),
            )));
        }

        let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if raw == -1 {
            return Err(errno!("failed to open control socket"));
        }

        // SAFETY: `raw` is a freshly opened descriptor owned by nothing else.
        let ctl = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut ifr = ifreq(name);

        if unsafe { libc::ioctl(ctl.as_raw_fd(), libc::SIOCGIFINDEX, &mut ifr) } == -1 {
            return Err(errno!("failed to get index of interface {name}"));
        }
        let index = unsafe { ifr.ifr_ifru.ifru_ifindex };

        let mut ifr = ifreq(name);

        if unsafe { libc::ioctl(ctl.as_raw_fd(), libc::SIOCGIFHWADDR, &mut ifr) } == -1 {
            return Err(errno!("failed to get hardware address of interface {name}"));
        }
        let hwaddr = unsafe { ifr.ifr_ifru.ifru_hwaddr };
        let mut mac = [0u8; 6];
        for (dst, src) in mac.iter_mut().zip(hwaddr.sa_data.iter()) {
            *dst = *src as u8;
        }

        let mut ifr = ifreq(name);

        if unsafe { libc::ioctl(ctl.as_raw_fd(), libc::SIOCGIFADDR, &mut ifr) } == -1 {
            return Err(errno!("failed to get IPv4 address of interface {name}"));
        }

        // SAFETY: `SIOCGIFADDR` fills the union with a `sockaddr_in` for
        // `AF_INET` control sockets.
        let addr = unsafe {
            let sin = &ifr.ifr_ifru.ifru_addr as *const libc::sockaddr as *const libc::sockaddr_in;
            Ipv4Addr::from(u32::from_be((*sin).sin_addr.s_addr))
        };

        // SAFETY: `ifr_name` remains null-terminated after copying `name`.
        let name = unsafe {
            CStr::from_ptr(ifr.ifr_name.as_ptr())
                .to_string_lossy()
                .into_owned()
        };

        let iface = Self {
            name,
            index,
            addr,
            mac: MacAddr(mac),
        };

        debug!(
            "interface {} (index {}): {} {}",
            iface.name, iface.index, iface.addr, iface.mac
        );

        Ok(iface)
    }
}

fn ifreq(name: &str) -> libc::ifreq {
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };

    unsafe {
        // SAFETY: `name.len()` is less than `IFNAMSIZ`.
        ptr::copy_nonoverlapping(
            name.as_ptr(),
            ifr.ifr_name.as_mut_ptr() as *mut u8,
            name.len(),
        );
    }

    ifr
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t0010A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0100A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
wlan0\t00000000\t01010A0A\t0003\t0\t0\t600\t00000000\t0\t0\t0
";

    #[test]
    fn first_default_gateway_wins() {
        let route = parse_route_table(TABLE).unwrap();

        assert_eq!(route.interface, "eth0");
        assert_eq!(route.gateway, Ipv4Addr::new(192, 168, 0, 1));
    }

    #[test]
    fn default_destination_without_gateway_flag_is_skipped() {
        let table = "\
Iface\tDestination\tGateway\tFlags
tun0\t00000000\t00000000\t0001
eth1\t00000000\t0101A8C0\t0003
";
        let route = parse_route_table(table).unwrap();

        assert_eq!(route.interface, "eth1");
        assert_eq!(route.gateway, Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn table_without_default_route() {
        let table = "\
Iface\tDestination\tGateway\tFlags
eth0\t0010A8C0\t00000000\t0001
";
        assert_eq!(parse_route_table(table), None);
        assert_eq!(parse_route_table(""), None);
    }

    #[test]
    fn overlong_interface_name_is_rejected() {
        let res = Interface::query("an-interface-name-far-too-long");

        assert!(matches!(
            res,
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::InvalidInput
        ));
    }
}
