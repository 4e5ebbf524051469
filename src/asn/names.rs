//! AS number to organisation name table.

use ahash::AHashMap;
use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::OnceCell;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Global AS name table.
static AS_NAMES: OnceCell<Arc<AsNameTable>> = OnceCell::new();

/// Initialize the global AS name table.
///
/// This should be called once at startup.
pub fn init_as_names(table: AsNameTable) -> Result<()> {
    AS_NAMES
        .set(Arc::new(table))
        .map_err(|_| Error::Config("AS names already initialized".to_string()))
}

/// Initialize the global AS name table from a CSV file.
pub fn init_as_names_from_file(path: &Path) -> Result<usize> {
    let table = AsNameTable::from_reader(std::fs::File::open(path)?)?;
    let len = table.len();
    init_as_names(table)?;
    Ok(len)
}

/// The global AS name table, or an empty one if none was loaded.
pub fn as_names() -> Arc<AsNameTable> {
    AS_NAMES
        .get_or_init(|| Arc::new(AsNameTable::default()))
        .clone()
}

/// AS number to name.
#[derive(Debug, Default, Clone)]
pub struct AsNameTable {
    names: AHashMap<u32, String>,
}

impl AsNameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `AS<n>,name` or `<n>,name` rows. A header row, or any other
    /// row without a leading AS number, is skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut table = Self::new();
        let mut record = StringRecord::new();
        let mut skipped = 0usize;
        while csv_reader.read_record(&mut record)? {
            match parse_row(&record) {
                Some((asn, name)) => table.insert(asn, name),
                None => skipped += 1,
            }
        }
        if skipped > 1 {
            log::warn!("Skipped {} AS name rows", skipped);
        }
        Ok(table)
    }

    pub fn insert(&mut self, asn: u32, name: impl Into<String>) {
        self.names.insert(asn, name.into());
    }

    pub fn get(&self, asn: u32) -> Option<&str> {
        self.names.get(&asn).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn parse_row(record: &StringRecord) -> Option<(u32, String)> {
    let number = record.get(0)?.trim();
    let number = number
        .strip_prefix("AS")
        .or_else(|| number.strip_prefix("as"))
        .unwrap_or(number);
    let asn = number.parse().ok()?;
    let name = record.get(1)?.trim();
    if name.is_empty() {
        return None;
    }
    Some((asn, name.to_string()))
}
