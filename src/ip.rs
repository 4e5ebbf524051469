//! Canonical 16-byte IP addresses.
//!
//! Every address is handled as an [`Ipv6Addr`]; IPv4 addresses are stored
//! in IPv4-mapped form (`::ffff:a.b.c.d`) so a single ordering covers both
//! families. `Ipv6Addr`'s `Ord` is lexicographic over the octets, which is
//! the same as comparing the big-endian `u128`.

use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};

/// Convert any address into its canonical 16-byte form.
pub fn to_canonical(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

/// Convert a canonical address back to the natural family.
pub fn from_canonical(ip: Ipv6Addr) -> IpAddr {
    match ip.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(ip),
    }
}

/// Whether a canonical address lies in the IPv4-mapped range.
pub fn is_ipv4(ip: Ipv6Addr) -> bool {
    ip.to_ipv4_mapped().is_some()
}

/// Parse an address string into canonical form.
pub fn parse_ip(s: &str) -> Result<Ipv6Addr> {
    s.trim()
        .parse::<IpAddr>()
        .map(to_canonical)
        .map_err(|_| Error::InvalidIp(s.to_string()))
}

/// The following address, saturating at the all-ones address.
pub fn next_ip(ip: Ipv6Addr) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(ip).saturating_add(1))
}

/// The preceding address, saturating at `::`.
pub fn prev_ip(ip: Ipv6Addr) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(ip).saturating_sub(1))
}

/// The following address, or `None` past the all-ones address.
pub fn checked_next(ip: Ipv6Addr) -> Option<Ipv6Addr> {
    u128::from(ip).checked_add(1).map(Ipv6Addr::from)
}

/// The preceding address, or `None` below `::`.
pub fn checked_prev(ip: Ipv6Addr) -> Option<Ipv6Addr> {
    u128::from(ip).checked_sub(1).map(Ipv6Addr::from)
}

/// Inclusive canonical bounds of a CIDR string. Host bits are masked off.
pub fn cidr_bounds(cidr: &str) -> Result<(Ipv6Addr, Ipv6Addr)> {
    let net: IpNet = cidr
        .trim()
        .parse()
        .map_err(|_| Error::InvalidCidr(cidr.to_string()))?;
    Ok((
        to_canonical(net.network()),
        to_canonical(net.broadcast()),
    ))
}

/// The largest CIDR block contained in `[low, high]` that also contains `ip`.
///
/// IPv4-mapped results are rendered in IPv4 notation.
pub fn enclosing_cidr(ip: Ipv6Addr, low: Ipv6Addr, high: Ipv6Addr) -> String {
    let addr = u128::from(ip);
    let (low, high) = (u128::from(low), u128::from(high));
    let mut prefix = 128u32;
    while prefix > 0 {
        let host_bits = 129 - prefix;
        let mask = if host_bits >= 128 {
            0
        } else {
            !0u128 << host_bits
        };
        let start = addr & mask;
        let end = start | !mask;
        if start < low || end > high {
            break;
        }
        prefix -= 1;
    }

    let base = addr & if prefix == 0 { 0 } else { !0u128 << (128 - prefix) };
    let network = Ipv6Addr::from(base);
    match network.to_ipv4_mapped() {
        Some(v4) if prefix >= 96 => format!("{}/{}", v4, prefix - 96),
        _ => format!("{}/{}", network, prefix),
    }
}

/// Mask an IPv4 address to `prefix` bits.
pub fn mask_v4(ip: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    let bits = u32::from(ip);
    let mask = if prefix == 0 {
        0
    } else {
        !0u32 << (32 - u32::from(prefix.min(32)))
    };
    Ipv4Addr::from(bits & mask)
}

/// Mask an IPv6 address to `prefix` bits.
pub fn mask_v6(ip: Ipv6Addr, prefix: u8) -> Ipv6Addr {
    let bits = u128::from(ip);
    let mask = if prefix == 0 {
        0
    } else {
        !0u128 << (128 - u32::from(prefix.min(128)))
    };
    Ipv6Addr::from(bits & mask)
}
