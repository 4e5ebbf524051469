//! Day-indexed set of composite annotators.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use super::composite::CompositeAnnotator;
use crate::api::Annotator;
use crate::error::{Error, Result};

/// Layers of a directory build: geo, ASN-v4 and ASN-v6 annotators, each
/// sorted by date.
pub struct Layers {
    pub geo: Vec<Arc<dyn Annotator>>,
    pub asn_v4: Vec<Arc<dyn Annotator>>,
    pub asn_v6: Vec<Arc<dyn Annotator>>,
}

/// Immutable mapping from request date to composite annotator.
#[derive(Debug)]
pub struct AnnotatorDirectory {
    earliest: NaiveDate,
    composites: Vec<Arc<CompositeAnnotator>>,
    /// Index into `composites` for each day since `earliest`.
    by_day: Vec<usize>,
}

impl AnnotatorDirectory {
    /// Merge the layers into one composite per date at which any layer
    /// changes.
    pub fn build(layers: Layers) -> Result<Self> {
        let mut lists = [layers.geo, layers.asn_v4, layers.asn_v6];
        if lists.iter().any(Vec::is_empty) {
            return Err(Error::NoAnnotator);
        }
        for list in lists.iter_mut() {
            list.sort_by_key(|annotator| annotator.annotator_date());
        }

        let composites = merge(&lists);
        let earliest = composites[0].annotator_date().date_naive();
        let latest = composites[composites.len() - 1].annotator_date().date_naive();
        let days = (latest - earliest).num_days() as usize + 1;

        let mut by_day = Vec::with_capacity(days);
        let mut current = 0;
        for day in earliest.iter_days().take(days) {
            while current + 1 < composites.len()
                && composites[current + 1].annotator_date().date_naive() <= day
            {
                current += 1;
            }
            by_day.push(current);
        }

        Ok(Self {
            earliest,
            composites,
            by_day,
        })
    }

    /// The composite serving requests dated `date`. Dates outside the
    /// covered range get the first or last composite.
    pub fn get_annotator(&self, date: DateTime<Utc>) -> Arc<CompositeAnnotator> {
        let days = (date.date_naive() - self.earliest).num_days();
        let index = days.clamp(0, self.by_day.len() as i64 - 1) as usize;
        self.composites[self.by_day[index]].clone()
    }

    pub fn composites(&self) -> &[Arc<CompositeAnnotator>] {
        &self.composites
    }

    pub fn len(&self) -> usize {
        self.composites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composites.is_empty()
    }
}

/// Cursor merge: emit the current element of every list, then advance each
/// list whose next element carries the smallest upcoming date.
fn merge(lists: &[Vec<Arc<dyn Annotator>>; 3]) -> Vec<Arc<CompositeAnnotator>> {
    let mut cursors = [0usize; 3];
    let mut composites = Vec::new();
    loop {
        composites.push(Arc::new(CompositeAnnotator::new(
            lists[0][cursors[0]].clone(),
            lists[1][cursors[1]].clone(),
            lists[2][cursors[2]].clone(),
        )));

        let next = |i: usize| lists[i].get(cursors[i] + 1).map(|a| a.annotator_date());
        let Some(min) = (0..3).filter_map(next).min() else {
            break;
        };
        let advance: Vec<usize> = (0..3).filter(|&i| next(i) == Some(min)).collect();
        for i in advance {
            cursors[i] += 1;
        }
    }
    composites
}
