//! geoannotate - historical IP geolocation and ASN annotation.
//!
//! Given a date and a batch of IP addresses, the service answers with the
//! location and network of each address as they were on that date, taken
//! from the GeoLite2 City and RouteViews pfx2as snapshots that were current
//! then.
//!
//! # Features
//!
//! - **Interval index**: nested CIDR rows flattened into sorted, disjoint
//!   ranges searched by bisection
//! - **Historical selection**: every request date maps to the snapshot of
//!   each dataset family published on or before it
//! - **Lazy loading**: datasets load in the background on first use, with
//!   bounded memory and least-recently-used eviction
//! - **Hot swap**: the date directory is rebuilt and published atomically
//!   as datasets come and go
//! - **Retrying client**: remote batch annotation that waits out loading
//!
//! # Quick Start
//!
//! ```ignore
//! use geoannotate::{as_names, AnnotatorManager, LocalStore, Request};
//! use std::sync::Arc;
//!
//! let store = Arc::new(LocalStore::new("/data/downloader-example"));
//! let manager = AnnotatorManager::new(store, as_names(), tokio::runtime::Handle::current());
//! manager.update()?;
//! manager.load_latest();
//!
//! let request = Request::new(chrono::Utc::now(), vec!["8.8.8.8".into()], "example");
//! let response = geoannotate::handler::annotate_batch(&manager, &Default::default(), &request)?;
//! ```
//!
//! # Remote Annotation
//!
//! ```ignore
//! use geoannotate::AnnotationClient;
//! use std::time::Duration;
//!
//! let client = AnnotationClient::new("http://annotator:8080/annotate")?;
//! let response = client
//!     .annotate(chrono::Utc::now(), vec!["8.8.8.8".into()], "example", Duration::from_secs(30))
//!     .await?;
//! ```

mod error;

pub mod annotator;
pub mod api;
pub mod asn;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod geolite2;
pub mod handler;
pub mod ip;
pub mod manager;
pub mod metrics;
pub mod ranges;
pub mod site;
pub mod store;

// Re-export core types
pub use error::{Error, Result};

// Re-export the annotation API
pub use api::{AnnotationClient, Annotations, Annotator, GeoData, NetworkData, Request, Response, System};

// Re-export datasets
pub use asn::{as_names, init_as_names, init_as_names_from_file, AsNameTable, AsnDataset, AsnFamily};
pub use geolite2::GeoDataset;

// Re-export the serving stack
pub use annotator::{AnnotatorDirectory, CompositeAnnotator};
pub use catalog::{DatasetCatalog, DatasetKind};
pub use config::Config;
pub use manager::{AnnotatorManager, ManagerConfig};
pub use site::SiteAnnotations;
pub use store::{LocalStore, MemoryStore, ObjectStore};
