//! `GeoLite2-City-Blocks-IPv{4,6}.csv` row handling.

use ahash::AHashMap;
use csv::StringRecord;

use crate::error::{Error, Result};
use crate::ranges::RecordParser;

const NETWORK: usize = 0;
const GEONAME_ID: usize = 1;
const REGISTERED_COUNTRY_GEONAME_ID: usize = 2;
const POSTAL_CODE: usize = 6;
const LATITUDE: usize = 7;
const LONGITUDE: usize = 8;

const MIN_BLOCK_COLUMNS: usize = 9;

/// Payload of a geo interval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoPayload {
    /// Position in the locations table; `None` when neither geoname column
    /// resolves.
    pub location_index: Option<u32>,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Parses block rows against a geoname map.
pub struct BlockParser<'a> {
    geonames: &'a AHashMap<u32, u32>,
    missing_geonames: usize,
}

impl<'a> BlockParser<'a> {
    pub fn new(geonames: &'a AHashMap<u32, u32>) -> Self {
        Self {
            geonames,
            missing_geonames: 0,
        }
    }

    /// Rows whose geoname did not resolve.
    pub fn missing_geonames(&self) -> usize {
        self.missing_geonames
    }

    fn lookup(&self, column: &str) -> Option<u32> {
        let id: u32 = column.trim().parse().ok()?;
        self.geonames.get(&id).copied()
    }
}

impl RecordParser for BlockParser<'_> {
    type Payload = GeoPayload;

    fn validate_record(&self, record: &StringRecord) -> Result<()> {
        if record.len() < MIN_BLOCK_COLUMNS {
            return Err(Error::BadRecord(format!("{} columns", record.len())));
        }
        Ok(())
    }

    fn extract_cidr(&self, record: &StringRecord) -> Result<String> {
        Ok(record[NETWORK].to_string())
    }

    fn make_payload(&mut self, record: &StringRecord) -> Result<GeoPayload> {
        let location_index = self
            .lookup(&record[GEONAME_ID])
            .or_else(|| self.lookup(&record[REGISTERED_COUNTRY_GEONAME_ID]));
        if location_index.is_none() {
            self.missing_geonames += 1;
        }

        Ok(GeoPayload {
            location_index,
            postal_code: record[POSTAL_CODE].to_string(),
            latitude: parse_coordinate(&record[LATITUDE], 90.0)?,
            longitude: parse_coordinate(&record[LONGITUDE], 180.0)?,
        })
    }
}

fn parse_coordinate(value: &str, bound: f64) -> Result<f64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0.0);
    }
    let parsed: f64 = value
        .parse()
        .map_err(|_| Error::BadRecord(format!("coordinate {:?}", value)))?;
    if !parsed.is_finite() || parsed.abs() > bound {
        return Err(Error::BadRecord(format!("coordinate {} out of range", parsed)));
    }
    Ok(parsed)
}
