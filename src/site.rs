//! Site annotations overlay.
//!
//! Measurement sites are described by a JSON list; addresses inside a
//! site's IPv4 /26 or IPv6 /64 are answered from it without touching the
//! datasets.
//!
//! ```json
//! [{"Name": "lga03",
//!   "Network": {"IPv4": "64.86.148.128/26", "IPv6": "2001:5a0:4300::/64"},
//!   "Annotation": {"Geo": {"city": "New York"}, "Network": {"ASNumber": 6453}}}]
//! ```

use ahash::AHashMap;
use serde::Deserialize;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use crate::api::Annotations;
use crate::error::{Error, Result};
use crate::ip::{from_canonical, mask_v4, mask_v6};

const V4_PREFIX: u8 = 26;
const V6_PREFIX: u8 = 64;

#[derive(Debug, Deserialize)]
struct SiteNetwork {
    #[serde(rename = "IPv4", default)]
    ipv4: String,
    #[serde(rename = "IPv6", default)]
    ipv6: String,
}

#[derive(Debug, Deserialize)]
struct SiteRecord {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Network")]
    network: SiteNetwork,
    #[serde(rename = "Annotation")]
    annotation: Annotations,
}

/// Site overlay keyed by masked network address.
#[derive(Debug, Default)]
pub struct SiteAnnotations {
    v4: AHashMap<Ipv4Addr, Annotations>,
    v6: AHashMap<Ipv6Addr, Annotations>,
}

impl SiteAnnotations {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let records: Vec<SiteRecord> = serde_json::from_slice(data)?;
        let mut sites = Self::default();
        for record in records {
            if !record.network.ipv4.is_empty() {
                match parse_network(&record.network.ipv4, &record.name)? {
                    IpNet::V4(net) if net.prefix_len() == V4_PREFIX => {
                        sites.v4.insert(mask_v4(net.addr(), V4_PREFIX), record.annotation.clone());
                    }
                    net => return Err(mismatch(&record.name, "IPv4", V4_PREFIX, net)),
                }
            }
            if !record.network.ipv6.is_empty() {
                match parse_network(&record.network.ipv6, &record.name)? {
                    IpNet::V6(net) if net.prefix_len() == V6_PREFIX => {
                        sites.v6.insert(mask_v6(net.addr(), V6_PREFIX), record.annotation.clone());
                    }
                    net => return Err(mismatch(&record.name, "IPv6", V6_PREFIX, net)),
                }
            }
        }
        Ok(sites)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let sites = Self::from_json(&std::fs::read(path)?)?;
        log::info!("Loaded {} site networks from {:?}", sites.len(), path);
        Ok(sites)
    }

    /// Annotations of the site holding the canonical address `ip`.
    pub fn lookup(&self, ip: Ipv6Addr) -> Option<&Annotations> {
        match from_canonical(ip) {
            IpAddr::V4(v4) => self.v4.get(&mask_v4(v4, V4_PREFIX)),
            IpAddr::V6(v6) => self.v6.get(&mask_v6(v6, V6_PREFIX)),
        }
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_network(cidr: &str, site: &str) -> Result<IpNet> {
    cidr.trim()
        .parse()
        .map_err(|_| Error::Config(format!("site {}: invalid network {:?}", site, cidr)))
}

fn mismatch(site: &str, family: &str, prefix: u8, net: IpNet) -> Error {
    Error::Config(format!("site {}: {} network must be a /{}, got {}", site, family, prefix, net))
}
