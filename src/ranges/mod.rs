//! Sorted, disjoint IP intervals built from CIDR rows.
//!
//! Datasets are flattened into a list of closed intervals `[low, high]`
//! carrying a payload. The list is sorted by `low` and its intervals never
//! overlap, so a lookup is a plain binary search.
//!
//! ```text
//!   CSV rows (nested CIDRs)          flattened intervals
//!   1.0.0.0/24  payload A      ->    [1.0.0.0,  1.0.0.63 ]  B
//!   1.0.0.0/26  payload B            [1.0.0.64, 1.0.0.255]  A
//! ```

mod builder;
mod search;

pub use builder::{build_nodes, BuildOptions, NodeList, RecordParser};
pub use search::{linear_search, search, search_by};

use std::net::Ipv6Addr;

/// A closed interval of canonical addresses with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IpNode<P> {
    pub low: Ipv6Addr,
    pub high: Ipv6Addr,
    pub payload: P,
}

impl<P> IpNode<P> {
    pub fn new(low: Ipv6Addr, high: Ipv6Addr, payload: P) -> Self {
        Self { low, high, payload }
    }

    /// Whether `ip` lies inside the interval (both ends included).
    pub fn contains(&self, ip: Ipv6Addr) -> bool {
        self.low <= ip && ip <= self.high
    }
}
