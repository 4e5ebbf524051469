//! Service constants and environment configuration.

use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Request type accepted by the batch endpoint.
pub const REQUEST_TYPE: &str = "Annotate v2.0";

/// First day GeoLite2 datasets are used; legacy files from this day on are
/// archived only.
pub const GEOLITE2_START_DATE: (i32, u32, u32) = (2017, 8, 15);

/// Malformed rows tolerated per dataset file.
pub const MAX_BAD_RECORDS: usize = 50;

/// Resident GeoLite2 datasets.
pub const GEO_CACHE_CAPACITY: usize = 5;

/// Resident datasets per RouteViews family.
pub const ASN_CACHE_CAPACITY: usize = 6;

/// Dataset loads running at the same time, process-wide.
pub const MAX_CONCURRENT_LOADS: usize = 2;

/// Timeout of a single annotation POST.
pub const POST_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between POST attempts answered with 503.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Interval between scheduled object-store rescans.
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Project used when `GCLOUD_PROJECT` is unset.
pub const DEFAULT_PROJECT: &str = "local";

/// Default listen address of the HTTP server.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// GeoLite2 start date as a `NaiveDate`.
pub fn geolite2_start() -> NaiveDate {
    let (y, m, d) = GEOLITE2_START_DATE;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cloud project; the dataset bucket is `downloader-<project>`.
    pub project: String,
    /// Directory holding the buckets of the local object store.
    pub data_root: PathBuf,
    /// AS number to name sidecar file.
    pub asnames_path: Option<PathBuf>,
    /// Site annotations overlay.
    pub site_annotations_path: Option<PathBuf>,
    /// HTTP listen address.
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            data_root: PathBuf::from("."),
            asnames_path: None,
            site_annotations_path: None,
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

impl Config {
    /// Creates a configuration by reading environment variables.
    /// Missing or empty variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            project: non_empty_var("GCLOUD_PROJECT").unwrap_or(defaults.project),
            data_root: non_empty_var("ANNOTATOR_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_root),
            asnames_path: non_empty_var("ANNOTATOR_ASNAMES").map(PathBuf::from),
            site_annotations_path: non_empty_var("ANNOTATOR_SITE_ANNOTATIONS").map(PathBuf::from),
            listen: non_empty_var("ANNOTATOR_LISTEN").unwrap_or(defaults.listen),
        }
    }

    /// Name of the bucket holding the datasets.
    pub fn bucket(&self) -> String {
        format!("downloader-{}", self.project)
    }

    /// Filesystem location of the dataset bucket.
    pub fn bucket_path(&self) -> PathBuf {
        self.data_root.join(self.bucket())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
