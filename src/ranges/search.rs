//! Binary search over sorted, disjoint intervals.

use std::cmp::Ordering;
use std::net::Ipv6Addr;

use super::IpNode;
use crate::error::{Error, Result};

/// Find the index of the interval containing `ip`.
///
/// `get` maps an index in `0..len` to the `(low, high)` bounds of that
/// interval; intervals must be sorted by `low` and disjoint.
pub fn search_by<F>(len: usize, ip: Ipv6Addr, get: F) -> Result<usize>
where
    F: Fn(usize) -> (Ipv6Addr, Ipv6Addr),
{
    let (mut lo, mut hi) = (0usize, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (low, high) = get(mid);
        match compare(ip, low, high) {
            Ordering::Less => hi = mid,
            Ordering::Greater => lo = mid + 1,
            Ordering::Equal => return Ok(mid),
        }
    }
    Err(Error::NodeNotFound(ip.to_string()))
}

/// Find the interval containing `ip` in a sorted node list.
pub fn search<P>(nodes: &[IpNode<P>], ip: Ipv6Addr) -> Result<&IpNode<P>> {
    search_by(nodes.len(), ip, |i| (nodes[i].low, nodes[i].high)).map(|i| &nodes[i])
}

/// Reference scan used to cross-check [`search`].
pub fn linear_search<P>(nodes: &[IpNode<P>], ip: Ipv6Addr) -> Option<&IpNode<P>> {
    nodes.iter().find(|node| node.contains(ip))
}

fn compare(ip: Ipv6Addr, low: Ipv6Addr, high: Ipv6Addr) -> Ordering {
    if ip < low {
        Ordering::Less
    } else if ip > high {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}
