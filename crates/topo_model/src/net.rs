//! IPv4 address and CIDR arithmetic.
//!
//! All topology addresses are stored as strings so that malformed literals
//! survive deserialization and can be reported by the validators. The
//! helpers here are the single place where those strings become
//! [`Ipv4Addr`] and [`Ipv4Net`] values.

use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;

use crate::error::AddressError;

/// Parse an IPv4 address literal.
pub fn parse_ipv4(literal: &str) -> Result<Ipv4Addr, AddressError> {
    match literal.parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(_)) => Err(AddressError::Ipv6Unsupported(literal.to_string())),
        Err(_) => Err(AddressError::InvalidAddress(literal.to_string())),
    }
}

/// Parse an IPv4 CIDR literal.
///
/// Host bits are accepted and cleared, so `10.0.0.5/24` yields `10.0.0.0/24`.
pub fn parse_cidr(literal: &str) -> Result<Ipv4Net, AddressError> {
    match literal.parse::<Ipv4Net>() {
        Ok(net) => Ok(net.trunc()),
        Err(_) => {
            let looks_v6 = literal
                .split('/')
                .next()
                .map_or(false, |addr| addr.parse::<std::net::Ipv6Addr>().is_ok());
            if looks_v6 {
                Err(AddressError::Ipv6Unsupported(literal.to_string()))
            } else {
                Err(AddressError::InvalidCidr(literal.to_string()))
            }
        }
    }
}

/// Whether `ip` lies inside `cidr`. Malformed input is never inside anything.
pub fn ip_in_subnet(ip: &str, cidr: &str) -> bool {
    match (parse_ipv4(ip), parse_cidr(cidr)) {
        (Ok(addr), Ok(net)) => net.contains(&addr),
        _ => false,
    }
}

/// Whether two subnets share at least one address.
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Whether `addr` is the network or broadcast address of a subnet that
/// reserves them (`/30` and larger).
pub fn is_reserved_host(net: &Ipv4Net, addr: Ipv4Addr) -> bool {
    net.prefix_len() <= 30 && (addr == net.network() || addr == net.broadcast())
}

/// Smallest CIDR block containing every subnet in `nets`.
pub fn enclosing_cidr(nets: &[Ipv4Net]) -> Option<Ipv4Net> {
    let first = nets.first()?.trunc();
    let mut candidate = first;
    while !nets.iter().all(|net| candidate.contains(net)) {
        candidate = candidate.supernet()?;
    }
    Some(candidate)
}

/// Move `addr` from block `from` into block `to`, keeping its offset.
///
/// Returns `None` when `addr` is not inside `from` or the offset does not
/// fit inside `to`.
pub fn translate(addr: Ipv4Addr, from: &Ipv4Net, to: &Ipv4Net) -> Option<Ipv4Addr> {
    if !from.contains(&addr) {
        return None;
    }
    let offset = u32::from(addr) - u32::from(from.network());
    let moved = Ipv4Addr::from(u32::from(to.network()).checked_add(offset)?);
    to.contains(&moved).then_some(moved)
}

/// Move a subnet from block `from` into block `to`, keeping its prefix.
pub fn translate_net(net: &Ipv4Net, from: &Ipv4Net, to: &Ipv4Net) -> Option<Ipv4Net> {
    let moved = translate(net.network(), from, to)?;
    Ipv4Net::new(moved, net.prefix_len()).ok()
}
