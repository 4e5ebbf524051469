//! GeoLite2 City datasets.
//!
//! A dataset is one `GeoLite2-City-CSV` zip snapshot: the locations table
//! plus IPv4 and IPv6 block intervals that point into it.

mod blocks;
mod locations;

pub use blocks::{BlockParser, GeoPayload};
pub use locations::{load_locations, LocationEntry, LocationTable};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read, Seek};
use std::net::Ipv6Addr;
use std::time::Instant;
use zip::read::ZipFile;
use zip::ZipArchive;

use crate::api::{Annotations, Annotator, GeoData};
use crate::error::{Error, Result};
use crate::ip::is_ipv4;
use crate::ranges::{build_nodes, search, BuildOptions, IpNode};

static TIMESTAMP_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{8}T\d{6}Z").unwrap());

const LOCATIONS_SUFFIX: &str = "Locations-en.csv";
const BLOCKS_V4_SUFFIX: &str = "Blocks-IPv4.csv";
const BLOCKS_V6_SUFFIX: &str = "Blocks-IPv6.csv";

/// Publication time embedded in a MaxMind object name
/// (`.../20170815T200728Z-GeoLite2-City-CSV.zip`).
pub fn valid_from(name: &str) -> Result<DateTime<Utc>> {
    let stamp = TIMESTAMP_PATTERN
        .find(name)
        .ok_or_else(|| Error::DateExtraction(name.to_string()))?;
    let naive = NaiveDateTime::parse_from_str(stamp.as_str(), "%Y%m%dT%H%M%SZ")
        .map_err(|_| Error::DateExtraction(name.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// One GeoLite2 City snapshot.
#[derive(Debug)]
pub struct GeoDataset {
    valid_from: DateTime<Utc>,
    ipv4: Vec<IpNode<GeoPayload>>,
    ipv6: Vec<IpNode<GeoPayload>>,
    locations: LocationTable,
}

impl GeoDataset {
    /// Build a dataset from the bytes of a GeoLite2-City-CSV zip.
    pub fn from_zip(name: &str, data: Vec<u8>, options: &BuildOptions) -> Result<Self> {
        let valid_from = valid_from(name)?;
        let started = Instant::now();
        let mut archive = ZipArchive::new(Cursor::new(data))?;

        let (locations, geonames) = {
            let file = member(&mut archive, LOCATIONS_SUFFIX)?;
            load_locations(file, options)?
        };

        let mut parser = BlockParser::new(&geonames);
        let ipv4 = {
            let file = member(&mut archive, BLOCKS_V4_SUFFIX)?;
            build_nodes(file, &mut parser, options)?
        };
        let ipv6 = {
            let file = member(&mut archive, BLOCKS_V6_SUFFIX)?;
            build_nodes(file, &mut parser, options)?
        };

        if parser.missing_geonames() > 0 {
            log::warn!(
                "{}: {} blocks without a known geoname",
                name,
                parser.missing_geonames()
            );
        }
        log::info!(
            "Loaded {}: {} locations, {} IPv4 and {} IPv6 intervals in {:?}",
            name,
            locations.len(),
            ipv4.len(),
            ipv6.len(),
            started.elapsed()
        );

        Ok(Self {
            valid_from,
            ipv4,
            ipv6,
            locations,
        })
    }

    /// Assemble a dataset from parts.
    pub fn from_parts(
        valid_from: DateTime<Utc>,
        ipv4: Vec<IpNode<GeoPayload>>,
        ipv6: Vec<IpNode<GeoPayload>>,
        locations: LocationTable,
    ) -> Self {
        Self {
            valid_from,
            ipv4,
            ipv6,
            locations,
        }
    }

    pub fn ipv4_intervals(&self) -> &[IpNode<GeoPayload>] {
        &self.ipv4
    }

    pub fn ipv6_intervals(&self) -> &[IpNode<GeoPayload>] {
        &self.ipv6
    }

    fn geo_data(&self, payload: &GeoPayload) -> GeoData {
        let mut data = GeoData {
            postal_code: payload.postal_code.clone(),
            latitude: payload.latitude,
            longitude: payload.longitude,
            ..GeoData::default()
        };
        if let Some(location) = payload.location_index.and_then(|i| self.locations.get(i)) {
            data.continent_code = location.continent_code.clone();
            data.country_code = location.country_code.clone();
            data.country_name = location.country_name.clone();
            data.region = location.region_code.clone();
            data.metro_code = location.metro_code;
            data.city = location.city_name.clone();
        }
        data
    }
}

impl Annotator for GeoDataset {
    fn annotate(&self, ip: Ipv6Addr, ann: &mut Annotations) -> Result<()> {
        if ann.geo.is_some() {
            return Err(Error::AlreadyPopulated("Geo"));
        }
        let nodes = if is_ipv4(ip) { &self.ipv4 } else { &self.ipv6 };
        let node = search(nodes, ip)?;
        ann.geo = Some(self.geo_data(&node.payload));
        Ok(())
    }

    fn annotator_date(&self) -> DateTime<Utc> {
        self.valid_from
    }
}

/// The archive member whose name ends with `suffix`.
fn member<'a, R: Read + Seek>(archive: &'a mut ZipArchive<R>, suffix: &str) -> Result<ZipFile<'a>> {
    let name = archive
        .file_names()
        .find(|name| name.ends_with(suffix))
        .map(str::to_string)
        .ok_or_else(|| Error::BadRecord(format!("archive has no *{} member", suffix)))?;
    Ok(archive.by_name(&name)?)
}
