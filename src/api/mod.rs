//! Wire types of the annotation API and the annotator interface.

pub mod client;

pub use client::AnnotationClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv6Addr;

use crate::config::REQUEST_TYPE;
use crate::error::{Error, Result};

/// Anything that can fill in part of an [`Annotations`] record.
pub trait Annotator: Send + Sync {
    /// Annotate the canonical address `ip` into `ann`.
    ///
    /// Fails with `AlreadyPopulated` if the field this annotator owns is
    /// already set, and with `NodeNotFound` if the address is not covered.
    fn annotate(&self, ip: Ipv6Addr, ann: &mut Annotations) -> Result<()>;

    /// Date from which the underlying data is valid.
    fn annotator_date(&self) -> DateTime<Utc>;
}

/// Geolocation of one address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoData {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub continent_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_code3: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub metro_code: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub area_code: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One element of an AS set: a single AS or a multi-origin group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    #[serde(rename = "ASNs")]
    pub asns: Vec<u32>,
}

/// Network association of one address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkData {
    #[serde(rename = "CIDR", skip_serializing_if = "String::is_empty")]
    pub cidr: String,
    #[serde(rename = "ASNumber")]
    pub as_number: u32,
    #[serde(rename = "ASName", skip_serializing_if = "String::is_empty")]
    pub as_name: String,
    #[serde(rename = "Systems", skip_serializing_if = "Vec::is_empty")]
    pub systems: Vec<System>,
}

/// Everything known about one address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    #[serde(rename = "Geo")]
    pub geo: Option<GeoData>,
    #[serde(rename = "Network")]
    pub network: Option<NetworkData>,
}

/// Batch annotation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "RequestType", alias = "requestType")]
    pub request_type: String,
    #[serde(rename = "RequestInfo", alias = "requestInfo", default)]
    pub request_info: String,
    #[serde(rename = "Date", alias = "date")]
    pub date: DateTime<Utc>,
    #[serde(rename = "IPs", alias = "ips")]
    pub ips: Vec<String>,
}

impl Request {
    pub fn new(date: DateTime<Utc>, ips: Vec<String>, info: impl Into<String>) -> Self {
        Self {
            request_type: REQUEST_TYPE.to_string(),
            request_info: info.into(),
            date,
            ips,
        }
    }

    /// Decode a request body, rejecting unknown request types.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let request: Request = serde_json::from_slice(body)
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        if request.request_type != REQUEST_TYPE {
            return Err(Error::InvalidRequest(format!(
                "unsupported request type {:?}",
                request.request_type
            )));
        }
        Ok(request)
    }
}

/// Batch annotation response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "AnnotatorDate")]
    pub annotator_date: DateTime<Utc>,
    #[serde(rename = "Annotations")]
    pub annotations: HashMap<String, Annotations>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}
