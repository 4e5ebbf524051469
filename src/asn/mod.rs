//! RouteViews prefix-to-AS datasets.
//!
//! Each `routeviews-rv{2,6}-YYYYMMDD-HHMM.pfx2as.gz` file is a TSV of
//! `prefix<TAB>length<TAB>asns`, where `asns` is a comma separated AS set
//! whose elements may be underscore separated multi-origin groups.

mod names;

pub use names::{as_names, init_as_names, init_as_names_from_file, AsNameTable};

use ahash::AHashMap;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Instant;

use crate::api::{Annotations, Annotator, NetworkData, System};
use crate::error::{Error, Result};
use crate::ip::enclosing_cidr;
use crate::ranges::{build_nodes, search, BuildOptions, IpNode, RecordParser};
use crate::store::byte_stream;

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{8})-(\d{4})").unwrap());

/// Address family of a RouteViews dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsnFamily {
    V4,
    V6,
}

impl fmt::Display for AsnFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsnFamily::V4 => write!(f, "ASN-v4"),
            AsnFamily::V6 => write!(f, "ASN-v6"),
        }
    }
}

/// Publication time embedded in a RouteViews object name
/// (`.../routeviews-rv2-20190101-1200.pfx2as.gz`).
pub fn valid_from(name: &str) -> Result<DateTime<Utc>> {
    let caps = DATE_PATTERN
        .captures(name)
        .ok_or_else(|| Error::DateExtraction(name.to_string()))?;
    let stamp = format!("{}{}", &caps[1], &caps[2]);
    let naive = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M")
        .map_err(|_| Error::DateExtraction(name.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Split a RouteViews AS string into its systems.
pub fn parse_systems(asns: &str) -> Result<Vec<System>> {
    asns.split(',')
        .map(|element| {
            let asns = element
                .split('_')
                .map(|asn| {
                    asn.trim()
                        .parse::<u32>()
                        .map_err(|_| Error::BadRecord(format!("AS number {:?}", asn)))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(System { asns })
        })
        .collect()
}

/// pfx2as row handling. Identical AS strings share one allocation.
#[derive(Default)]
pub struct Pfx2AsParser {
    interned: AHashMap<String, Arc<str>>,
}

impl RecordParser for Pfx2AsParser {
    type Payload = Arc<str>;

    fn configure_reader(&self, builder: &mut ReaderBuilder) {
        builder.delimiter(b'\t').has_headers(false).flexible(true);
    }

    fn validate_record(&self, record: &StringRecord) -> Result<()> {
        if record.len() != 3 {
            return Err(Error::BadRecord(format!("{} columns", record.len())));
        }
        Ok(())
    }

    fn extract_cidr(&self, record: &StringRecord) -> Result<String> {
        Ok(format!("{}/{}", record[0].trim(), record[1].trim()))
    }

    fn make_payload(&mut self, record: &StringRecord) -> Result<Arc<str>> {
        let asns = record[2].trim();
        parse_systems(asns)?;
        if let Some(shared) = self.interned.get(asns) {
            return Ok(shared.clone());
        }
        let shared: Arc<str> = Arc::from(asns);
        self.interned.insert(asns.to_string(), shared.clone());
        Ok(shared)
    }
}

/// One RouteViews snapshot for a single address family.
#[derive(Debug)]
pub struct AsnDataset {
    valid_from: DateTime<Utc>,
    family: AsnFamily,
    intervals: Vec<IpNode<Arc<str>>>,
    as_names: Arc<AsNameTable>,
}

impl AsnDataset {
    /// Build a dataset from the (optionally gzipped) pfx2as bytes.
    pub fn from_bytes(
        name: &str,
        family: AsnFamily,
        data: Vec<u8>,
        as_names: Arc<AsNameTable>,
        options: &BuildOptions,
    ) -> Result<Self> {
        let valid_from = valid_from(name)?;
        let started = Instant::now();
        let intervals = build_nodes(byte_stream(data), &mut Pfx2AsParser::default(), options)?;
        log::info!(
            "Loaded {} ({}): {} intervals in {:?}",
            name,
            family,
            intervals.len(),
            started.elapsed()
        );
        Ok(Self {
            valid_from,
            family,
            intervals,
            as_names,
        })
    }

    pub fn family(&self) -> AsnFamily {
        self.family
    }

    pub fn intervals(&self) -> &[IpNode<Arc<str>>] {
        &self.intervals
    }
}

impl Annotator for AsnDataset {
    fn annotate(&self, ip: Ipv6Addr, ann: &mut Annotations) -> Result<()> {
        if ann.network.is_some() {
            return Err(Error::AlreadyPopulated("Network"));
        }
        let node = search(&self.intervals, ip)?;
        let systems = parse_systems(&node.payload)?;

        let as_number = systems
            .first()
            .and_then(|system| system.asns.first())
            .copied()
            .unwrap_or(0);
        let as_name = self
            .as_names
            .get(as_number)
            .map(str::to_string)
            .unwrap_or_default();

        ann.network = Some(NetworkData {
            cidr: enclosing_cidr(ip, node.low, node.high),
            as_number,
            as_name,
            systems,
        });
        Ok(())
    }

    fn annotator_date(&self) -> DateTime<Utc> {
        self.valid_from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::parse_ip;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const NAME_V4: &str = "RouteViewIPv4/2019/01/routeviews-rv2-20190101-1200.pfx2as.gz";

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn dataset(tsv: &str, names: AsNameTable) -> AsnDataset {
        AsnDataset::from_bytes(
            NAME_V4,
            AsnFamily::V4,
            gzip(tsv),
            Arc::new(names),
            &BuildOptions::default(),
        )
        .unwrap()
    }

    fn network(ds: &AsnDataset, ip: &str) -> Result<NetworkData> {
        let mut ann = Annotations::default();
        ds.annotate(parse_ip(ip).unwrap(), &mut ann)?;
        Ok(ann.network.unwrap())
    }

    #[test]
    fn test_valid_from() {
        assert_eq!(
            valid_from(NAME_V4).unwrap(),
            Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap()
        );
        assert!(valid_from("RouteViewIPv4/2019/01/routeviews.pfx2as.gz").is_err());
    }

    #[test]
    fn test_simple_asn() {
        let mut names = AsNameTable::new();
        names.insert(5483, "Magyar Telekom plc.");
        let ds = dataset("84.1.28.0\t24\t5483\n", names);

        let net = network(&ds, "84.1.28.246").unwrap();
        assert_eq!(net.cidr, "84.1.28.0/24");
        assert_eq!(net.as_number, 5483);
        assert_eq!(net.as_name, "Magyar Telekom plc.");
        assert_eq!(net.systems, vec![System { asns: vec![5483] }]);
    }

    #[test]
    fn test_multi_origin() {
        let ds = dataset("1.0.0.0\t24\t4_5\n", AsNameTable::new());
        let net = network(&ds, "1.0.0.9").unwrap();
        assert_eq!(net.as_number, 4);
        assert_eq!(net.as_name, "");
        assert_eq!(net.systems, vec![System { asns: vec![4, 5] }]);
    }

    #[test]
    fn test_as_set() {
        let ds = dataset("1.0.0.0\t24\t701,702\n", AsNameTable::new());
        let net = network(&ds, "1.0.0.9").unwrap();
        assert_eq!(net.as_number, 701);
        assert_eq!(
            net.systems,
            vec![System { asns: vec![701] }, System { asns: vec![702] }]
        );
    }

    #[test]
    fn test_nested_prefix_cidr() {
        let ds = dataset("10.0.0.0\t8\t100\n10.1.0.0\t16\t200\n", AsNameTable::new());
        assert_eq!(network(&ds, "10.1.2.3").unwrap().cidr, "10.1.0.0/16");
        // The /8 is split around the /16; the reported block is the one
        // holding the address.
        assert_eq!(network(&ds, "10.0.0.1").unwrap().cidr, "10.0.0.0/16");
        assert_eq!(network(&ds, "10.128.0.1").unwrap().cidr, "10.128.0.0/9");
        assert!(matches!(network(&ds, "11.0.0.1"), Err(Error::NodeNotFound(_))));
    }

    #[test]
    fn test_plain_tsv_and_bad_rows() {
        let tsv = "1.0.0.0\t24\t13335\nnot-an-ip\t24\t1\n2.0.0.0\t8\tx_y\n";
        let ds = AsnDataset::from_bytes(
            NAME_V4,
            AsnFamily::V4,
            tsv.as_bytes().to_vec(),
            Arc::new(AsNameTable::new()),
            &BuildOptions::default(),
        )
        .unwrap();
        assert_eq!(ds.intervals().len(), 1);
        assert_eq!(network(&ds, "1.0.0.1").unwrap().as_number, 13335);
    }

    #[test]
    fn test_already_populated() {
        let ds = dataset("1.0.0.0\t24\t1\n", AsNameTable::new());
        let mut ann = Annotations {
            geo: None,
            network: Some(NetworkData::default()),
        };
        let result = ds.annotate(parse_ip("1.0.0.1").unwrap(), &mut ann);
        assert!(matches!(result, Err(Error::AlreadyPopulated("Network"))));
    }

    #[test]
    fn test_interned_payloads_merge() {
        let ds = dataset("1.0.0.0\t25\t7\n1.0.0.128\t25\t7\n", AsNameTable::new());
        assert_eq!(ds.intervals().len(), 1);
    }
}
