//! Dataset catalog built from an object store listing.
//!
//! Object names are classified by pattern, dated from the timestamp in the
//! name, and bucketed per publication day.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::asn;
use crate::config::geolite2_start;
use crate::error::Result;
use crate::geolite2;
use crate::store::ObjectStore;

/// Kind of a dataset object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetKind {
    /// GeoLite2 City CSV zip
    GeoLite2,
    /// Legacy GeoLiteCity.dat (IPv4)
    LegacyV4,
    /// Legacy GeoLiteCityv6.dat
    LegacyV6,
    /// RouteViews pfx2as (IPv4)
    RouteViewsV4,
    /// RouteViews pfx2as (IPv6)
    RouteViewsV6,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::GeoLite2,
        DatasetKind::LegacyV4,
        DatasetKind::LegacyV6,
        DatasetKind::RouteViewsV4,
        DatasetKind::RouteViewsV6,
    ];

    fn pattern(self) -> &'static Regex {
        match self {
            DatasetKind::GeoLite2 => &GEOLITE2_PATTERN,
            DatasetKind::LegacyV4 => &LEGACY_V4_PATTERN,
            DatasetKind::LegacyV6 => &LEGACY_V6_PATTERN,
            DatasetKind::RouteViewsV4 => &ROUTEVIEWS_V4_PATTERN,
            DatasetKind::RouteViewsV6 => &ROUTEVIEWS_V6_PATTERN,
        }
    }

    /// Classify an object name.
    pub fn classify(name: &str) -> Option<DatasetKind> {
        Self::ALL.into_iter().find(|kind| kind.pattern().is_match(name))
    }

    pub fn is_legacy(self) -> bool {
        matches!(self, DatasetKind::LegacyV4 | DatasetKind::LegacyV6)
    }

    fn valid_from(self, name: &str) -> Result<DateTime<Utc>> {
        match self {
            DatasetKind::RouteViewsV4 | DatasetKind::RouteViewsV6 => asn::valid_from(name),
            _ => geolite2::valid_from(name),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatasetKind::GeoLite2 => "GeoLite2-City-CSV",
            DatasetKind::LegacyV4 => "GeoLiteCity",
            DatasetKind::LegacyV6 => "GeoLiteCityv6",
            DatasetKind::RouteViewsV4 => "RouteViewIPv4",
            DatasetKind::RouteViewsV6 => "RouteViewIPv6",
        };
        write!(f, "{}", s)
    }
}

static GEOLITE2_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Maxmind/\d{4}/\d{2}/\d{2}/\d{8}T\d{6}Z-GeoLite2-City-CSV\.zip$").unwrap()
});
static LEGACY_V4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Maxmind/\d{4}/\d{2}/\d{2}/\d{8}T\d{6}Z-GeoLiteCity\.dat\.gz$").unwrap()
});
static LEGACY_V6_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Maxmind/\d{4}/\d{2}/\d{2}/\d{8}T\d{6}Z-GeoLiteCityv6\.dat\.gz$").unwrap()
});
static ROUTEVIEWS_V4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^RouteViewIPv4/\d{4}/\d{2}/routeviews-rv2-\d{8}-\d{4}\.pfx2as(\.gz)?$").unwrap()
});
static ROUTEVIEWS_V6_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^RouteViewIPv6/\d{4}/\d{2}/routeviews-rv6-\d{8}-\d{4}\.pfx2as(\.gz)?$").unwrap()
});

/// One classified, dated object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub name: String,
    pub kind: DatasetKind,
    pub valid_from: DateTime<Utc>,
}

impl DatasetFile {
    /// Publication day.
    pub fn date(&self) -> NaiveDate {
        self.valid_from.date_naive()
    }
}

/// Classified view of the object store.
#[derive(Debug, Default, Clone)]
pub struct DatasetCatalog {
    buckets: BTreeMap<NaiveDate, Vec<DatasetFile>>,
    archived: Vec<DatasetFile>,
}

impl DatasetCatalog {
    /// List `store` and classify every object.
    pub fn scan(store: &dyn ObjectStore) -> Result<Self> {
        let names = store.list("")?;
        let catalog = Self::from_names(names.iter().map(String::as_str));
        log::info!(
            "Scanned {} objects: {} datasets over {} days, {} archived",
            names.len(),
            catalog.len(),
            catalog.buckets.len(),
            catalog.archived.len()
        );
        Ok(catalog)
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let cutoff = geolite2_start();
        let mut catalog = Self::default();

        for name in names {
            let Some(kind) = DatasetKind::classify(name) else {
                continue;
            };
            let valid_from = match kind.valid_from(name) {
                Ok(date) => date,
                Err(e) => {
                    log::warn!("Ignoring {}: {}", name, e);
                    continue;
                }
            };
            let file = DatasetFile {
                name: name.to_string(),
                kind,
                valid_from,
            };
            if kind.is_legacy() && file.date() >= cutoff {
                catalog.archived.push(file);
                continue;
            }
            catalog.buckets.entry(file.date()).or_default().push(file);
        }

        for bucket in catalog.buckets.values_mut() {
            bucket.sort_by(|a, b| (a.valid_from, &a.name).cmp(&(b.valid_from, &b.name)));
        }
        catalog
    }

    /// Number of usable datasets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Most recent publication day.
    pub fn latest(&self) -> Option<NaiveDate> {
        self.buckets.keys().next_back().copied()
    }

    /// Publication days, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.buckets.keys().copied()
    }

    /// Datasets published on `date`.
    pub fn bucket(&self, date: NaiveDate) -> &[DatasetFile] {
        self.buckets.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Legacy datasets published after the GeoLite2 switch.
    pub fn archived(&self) -> &[DatasetFile] {
        &self.archived
    }

    /// Usable datasets of one kind in publication order.
    pub fn files(&self, kind: DatasetKind) -> impl Iterator<Item = &DatasetFile> + '_ {
        self.buckets
            .values()
            .flatten()
            .filter(move |file| file.kind == kind)
    }

    /// Newest dataset of one kind.
    pub fn latest_of(&self, kind: DatasetKind) -> Option<&DatasetFile> {
        self.files(kind).last()
    }

    /// The dataset of `kind` serving requests dated `date`: the newest one
    /// published on or before that day, or the earliest one for dates that
    /// precede every dataset.
    pub fn last_before(&self, kind: DatasetKind, date: DateTime<Utc>) -> Option<&DatasetFile> {
        let day = date.date_naive();
        let mut earliest = None;
        let mut best = None;
        for file in self.files(kind) {
            if earliest.is_none() {
                earliest = Some(file);
            }
            if file.date() > day {
                break;
            }
            best = Some(file);
        }
        best.or(earliest)
    }
}
