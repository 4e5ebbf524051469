//! Process-wide counters, rendered in the Prometheus text format.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics registry.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

/// Counters of the annotation service.
#[derive(Debug, Default)]
pub struct Metrics {
    pub requests: AtomicU64,
    pub requests_rejected: AtomicU64,
    pub requests_loading: AtomicU64,
    pub ips_annotated: AtomicU64,
    pub site_annotations: AtomicU64,
    pub rescans: AtomicU64,
    pub rescan_failures: AtomicU64,
    pub directory_builds: AtomicU64,
    ip_failures: Mutex<AHashMap<&'static str, u64>>,
    dataset_loads: Mutex<AHashMap<String, u64>>,
    dataset_failures: Mutex<AHashMap<String, u64>>,
    dataset_evictions: Mutex<AHashMap<String, u64>>,
}

impl Metrics {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ip_failure(&self, kind: &'static str) {
        *self.ip_failures.lock().entry(kind).or_insert(0) += 1;
    }

    pub fn dataset_loaded(&self, family: &str) {
        bump(&self.dataset_loads, family);
    }

    pub fn dataset_failed(&self, family: &str) {
        bump(&self.dataset_failures, family);
    }

    pub fn dataset_evicted(&self, family: &str) {
        bump(&self.dataset_evictions, family);
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let mut out = String::new();
        counter(&mut out, "annotator_requests_total", "Annotation requests received.", &self.requests);
        counter(
            &mut out,
            "annotator_requests_rejected_total",
            "Annotation requests rejected as malformed.",
            &self.requests_rejected,
        );
        counter(
            &mut out,
            "annotator_requests_loading_total",
            "Annotation requests answered 503 while datasets load.",
            &self.requests_loading,
        );
        counter(&mut out, "annotator_ips_annotated_total", "Addresses annotated.", &self.ips_annotated);
        counter(
            &mut out,
            "annotator_site_annotations_total",
            "Addresses answered from the site overlay.",
            &self.site_annotations,
        );
        counter(&mut out, "annotator_rescans_total", "Object store rescans.", &self.rescans);
        counter(
            &mut out,
            "annotator_rescan_failures_total",
            "Object store rescans that failed.",
            &self.rescan_failures,
        );
        counter(
            &mut out,
            "annotator_directory_builds_total",
            "Annotator directory rebuilds.",
            &self.directory_builds,
        );

        let ip_failures: Vec<(String, u64)> = self
            .ip_failures
            .lock()
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        labeled(&mut out, "annotator_ip_failures_total", "Addresses left unannotated.", "kind", ip_failures);
        labeled(&mut out, "annotator_dataset_loads_total", "Datasets loaded.", "family", snapshot(&self.dataset_loads));
        labeled(
            &mut out,
            "annotator_dataset_load_failures_total",
            "Dataset loads that failed.",
            "family",
            snapshot(&self.dataset_failures),
        );
        labeled(
            &mut out,
            "annotator_dataset_evictions_total",
            "Datasets evicted from memory.",
            "family",
            snapshot(&self.dataset_evictions),
        );
        out
    }
}

fn bump(map: &Mutex<AHashMap<String, u64>>, key: &str) {
    let mut map = map.lock();
    match map.get_mut(key) {
        Some(count) => *count += 1,
        None => {
            map.insert(key.to_string(), 1);
        }
    }
}

fn snapshot(map: &Mutex<AHashMap<String, u64>>) -> Vec<(String, u64)> {
    map.lock().iter().map(|(k, v)| (k.clone(), *v)).collect()
}

fn counter(out: &mut String, name: &str, help: &str, value: &AtomicU64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value.load(Ordering::Relaxed));
}

fn labeled(out: &mut String, name: &str, help: &str, label: &str, mut values: Vec<(String, u64)>) {
    values.sort();
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    for (key, value) in values {
        let _ = writeln!(out, "{}{{{}=\"{}\"}} {}", name, label, key, value);
    }
}
