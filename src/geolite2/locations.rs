//! `GeoLite2-City-Locations-en.csv` parsing.

use ahash::AHashMap;
use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;

use crate::error::{Error, Result};
use crate::ranges::BuildOptions;

/// Fewest columns a location row may have; later exports add
/// `is_in_european_union` as a 14th.
const MIN_LOCATION_COLUMNS: usize = 13;

const GEONAME_ID: usize = 0;
const CONTINENT_CODE: usize = 2;
const COUNTRY_CODE: usize = 4;
const COUNTRY_NAME: usize = 5;
const REGION_CODE: usize = 6;
const REGION_NAME: usize = 7;
const CITY_NAME: usize = 10;
const METRO_CODE: usize = 11;

static CODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Z]*$").unwrap());
static DIGIT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").unwrap());

/// One row of the locations table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationEntry {
    pub geoname_id: u32,
    pub continent_code: String,
    pub country_code: String,
    pub country_name: String,
    pub region_code: String,
    pub region_name: String,
    pub metro_code: i64,
    pub city_name: String,
}

/// Locations indexed by position.
#[derive(Debug, Default)]
pub struct LocationTable {
    entries: Vec<LocationEntry>,
}

impl LocationTable {
    pub fn get(&self, index: u32) -> Option<&LocationEntry> {
        self.entries.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse the locations CSV.
///
/// Returns the table together with the `geoname_id -> position` map that
/// the block parsers join against. The map is only needed while building.
pub fn load_locations<R: Read>(
    reader: R,
    options: &BuildOptions,
) -> Result<(LocationTable, AHashMap<u32, u32>)> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header_len = csv_reader.headers()?.len();
    if header_len < MIN_LOCATION_COLUMNS {
        return Err(Error::BadRecord(format!(
            "locations header has {} columns, want at least {}",
            header_len, MIN_LOCATION_COLUMNS
        )));
    }

    let mut entries = Vec::new();
    let mut index = AHashMap::new();
    let mut record = StringRecord::new();
    let mut bad_records = 0usize;

    loop {
        let entry = match csv_reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => parse_location(&record),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => Err(Error::BadRecord(e.to_string())),
        };

        match entry {
            Ok(entry) => {
                index.insert(entry.geoname_id, entries.len() as u32);
                entries.push(entry);
            }
            Err(e) => {
                bad_records += 1;
                if bad_records > options.max_bad_records {
                    return Err(Error::TooManyBadRecords {
                        count: bad_records,
                        last: e.to_string(),
                    });
                }
                log::warn!("Skipping location {:?}: {}", record.position(), e);
            }
        }
    }

    Ok((LocationTable { entries }, index))
}

fn parse_location(record: &StringRecord) -> Result<LocationEntry> {
    if record.len() < MIN_LOCATION_COLUMNS {
        return Err(Error::BadRecord(format!("{} columns", record.len())));
    }

    let geoname_id = record[GEONAME_ID]
        .parse()
        .map_err(|_| Error::BadRecord(format!("geoname id {:?}", &record[GEONAME_ID])))?;

    let continent_code = &record[CONTINENT_CODE];
    let country_code = &record[COUNTRY_CODE];
    let country_name = &record[COUNTRY_NAME];
    if !CODE_PATTERN.is_match(continent_code) {
        return Err(Error::BadRecord(format!("continent code {:?}", continent_code)));
    }
    if !CODE_PATTERN.is_match(country_code) {
        return Err(Error::BadRecord(format!("country code {:?}", country_code)));
    }
    if DIGIT_PATTERN.is_match(country_name) {
        return Err(Error::BadRecord(format!("country name {:?}", country_name)));
    }

    let metro_code = match record[METRO_CODE].trim() {
        "" => 0,
        code => code
            .parse()
            .map_err(|_| Error::BadRecord(format!("metro code {:?}", code)))?,
    };

    Ok(LocationEntry {
        geoname_id,
        continent_code: continent_code.to_string(),
        country_code: country_code.to_string(),
        country_name: country_name.to_string(),
        region_code: record[REGION_CODE].to_string(),
        region_name: record[REGION_NAME].to_string(),
        metro_code,
        city_name: record[CITY_NAME].to_string(),
    })
}
