//! One geo layer plus one ASN layer per address family.

use chrono::{DateTime, Utc};
use std::net::Ipv6Addr;
use std::sync::Arc;

use crate::api::{Annotations, Annotator};
use crate::error::Result;
use crate::ip::is_ipv4;

/// Annotates with `geo` first, then the ASN layer of the address family.
#[derive(Clone)]
pub struct CompositeAnnotator {
    geo: Arc<dyn Annotator>,
    asn_v4: Arc<dyn Annotator>,
    asn_v6: Arc<dyn Annotator>,
    valid_from: DateTime<Utc>,
}

impl CompositeAnnotator {
    pub fn new(geo: Arc<dyn Annotator>, asn_v4: Arc<dyn Annotator>, asn_v6: Arc<dyn Annotator>) -> Self {
        let valid_from = geo
            .annotator_date()
            .max(asn_v4.annotator_date())
            .max(asn_v6.annotator_date());
        Self {
            geo,
            asn_v4,
            asn_v6,
            valid_from,
        }
    }
}

impl Annotator for CompositeAnnotator {
    fn annotate(&self, ip: Ipv6Addr, ann: &mut Annotations) -> Result<()> {
        self.geo.annotate(ip, ann)?;
        if is_ipv4(ip) {
            self.asn_v4.annotate(ip, ann)
        } else {
            self.asn_v6.annotate(ip, ann)
        }
    }

    fn annotator_date(&self) -> DateTime<Utc> {
        self.valid_from
    }
}

impl std::fmt::Debug for CompositeAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeAnnotator")
            .field("valid_from", &self.valid_from)
            .field("geo", &self.geo.annotator_date())
            .field("asn_v4", &self.asn_v4.annotator_date())
            .field("asn_v6", &self.asn_v6.annotator_date())
            .finish()
    }
}
