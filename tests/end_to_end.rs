//! Manager and HTTP service over an in-memory dataset store.

use chrono::{DateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use geoannotate::handler::{self, annotate_batch, AppState};
use geoannotate::ip::parse_ip;
use geoannotate::{
    Annotations, Annotator, AnnotatorManager, AsNameTable, CompositeAnnotator, Error, MemoryStore,
    ObjectStore, Request, Response, SiteAnnotations,
};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const GEO_JAN: &str = "Maxmind/2019/01/01/20190101T000000Z-GeoLite2-City-CSV.zip";
const GEO_MAR: &str = "Maxmind/2019/03/01/20190301T000000Z-GeoLite2-City-CSV.zip";
const RV4_JAN: &str = "RouteViewIPv4/2019/01/routeviews-rv2-20190101-1200.pfx2as.gz";
const RV4_MAR: &str = "RouteViewIPv4/2019/03/routeviews-rv2-20190301-1200.pfx2as.gz";
const RV6_JAN: &str = "RouteViewIPv6/2019/01/routeviews-rv6-20190101-1200.pfx2as.gz";

const LOCATIONS: &str = "geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,subdivision_1_iso_code,subdivision_1_name,subdivision_2_iso_code,subdivision_2_name,city_name,metro_code,time_zone,is_in_european_union
2643743,en,EU,Europe,GB,\"United Kingdom\",ENG,England,,,London,,Europe/London,1
6252001,en,NA,\"North America\",US,\"United States\",,,,,,,America/Chicago,0
";

const BLOCKS_HEADER: &str = "network,geoname_id,registered_country_geoname_id,represented_country_geoname_id,is_anonymous_proxy,is_satellite_provider,postal_code,latitude,longitude,accuracy_radius\n";

fn geolite2_zip(blocks_v4: &str, blocks_v6: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (file, content) in [
        ("GeoLite2-City-Locations-en.csv", LOCATIONS.to_string()),
        ("GeoLite2-City-Blocks-IPv4.csv", format!("{}{}", BLOCKS_HEADER, blocks_v4)),
        ("GeoLite2-City-Blocks-IPv6.csv", format!("{}{}", BLOCKS_HEADER, blocks_v6)),
    ] {
        writer.start_file(format!("GeoLite2-City-CSV/{}", file), options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        GEO_JAN,
        geolite2_zip(
            "4.0.0.0/8,6252001,6252001,,0,0,,37.751,-97.822,1000\n\
             12.0.0.0/8,6252001,6252001,,0,0,,37.751,-97.822,1000\n\
             84.1.0.0/16,2643743,2643743,,0,0,EC1A,51.5142,-0.0931,100\n",
            "2001:db8::/32,2643743,2643743,,0,0,,51.5,-0.12,100\n",
        ),
    );
    store.insert(
        GEO_MAR,
        geolite2_zip(
            "84.1.0.0/16,6252001,6252001,,0,0,,37.751,-97.822,1000\n",
            "2001:db8::/32,2643743,2643743,,0,0,,51.5,-0.12,100\n",
        ),
    );
    store.insert(
        RV4_JAN,
        gzip("84.1.28.0\t24\t5483\n4.0.0.0\t9\t4_5\n12.0.0.0\t8\t701,702\n"),
    );
    store.insert(RV4_MAR, gzip("84.1.0.0\t16\t5484\n"));
    store.insert(RV6_JAN, gzip("2001:db8::\t32\t64496\n"));
    // Not a dataset; ignored by the catalog.
    store.insert("README.txt", b"hello".to_vec());
    store
}

fn as_names() -> Arc<AsNameTable> {
    let mut names = AsNameTable::new();
    names.insert(5483, "Magyar Telekom");
    Arc::new(names)
}

fn manager() -> Arc<AnnotatorManager> {
    let store: Arc<dyn ObjectStore> = store();
    let manager = AnnotatorManager::new(store, as_names(), Handle::current());
    manager.update().unwrap();
    Arc::new(manager)
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// Poll until the datasets for `date` are loaded.
async fn ready(manager: &AnnotatorManager, date: DateTime<Utc>) -> Arc<CompositeAnnotator> {
    for _ in 0..400 {
        match manager.get_annotator(date) {
            Ok(annotator) => return annotator,
            Err(Error::Loading) => tokio::time::sleep(Duration::from_millis(10)).await,
            Err(e) => panic!("annotator for {}: {}", date, e),
        }
    }
    panic!("datasets for {} never loaded", date);
}

fn request(date: DateTime<Utc>, ips: &[&str]) -> Request {
    Request::new(date, ips.iter().map(|ip| ip.to_string()).collect(), "test")
}

#[tokio::test]
async fn test_catalog_scan() {
    let manager = manager();
    let catalog = manager.catalog();
    assert_eq!(catalog.len(), 5);
    assert_eq!(catalog.dates().count(), 2);
}

#[tokio::test]
async fn test_first_request_reports_loading() {
    let manager = manager();
    assert!(matches!(manager.get_annotator(at(2019, 2, 1)), Err(Error::Loading)));
    ready(&manager, at(2019, 2, 1)).await;
}

#[tokio::test]
async fn test_batch_annotation() {
    let manager = manager();
    let date = at(2019, 2, 1);
    ready(&manager, date).await;

    let response = annotate_batch(
        &manager,
        &SiteAnnotations::default(),
        &request(date, &["84.1.28.246", "4.3.2.1", "12.1.2.3", "2001:db8::1", "not-an-ip", "9.9.9.9"]),
    )
    .unwrap();

    assert_eq!(response.annotator_date, Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap());
    // The malformed and the uncovered address are dropped.
    assert_eq!(response.annotations.len(), 4);

    let ann = &response.annotations["84.1.28.246"];
    let geo = ann.geo.as_ref().unwrap();
    assert_eq!(geo.country_code, "GB");
    assert_eq!(geo.city, "London");
    assert_eq!(geo.postal_code, "EC1A");
    let network = ann.network.as_ref().unwrap();
    assert_eq!(network.cidr, "84.1.28.0/24");
    assert_eq!(network.as_number, 5483);
    assert_eq!(network.as_name, "Magyar Telekom");

    let network = response.annotations["4.3.2.1"].network.as_ref().unwrap();
    assert_eq!(network.as_number, 4);
    assert_eq!(network.systems.len(), 2);
    assert_eq!(network.systems[1].asns, vec![5]);

    let network = response.annotations["12.1.2.3"].network.as_ref().unwrap();
    assert_eq!(network.systems.len(), 1);
    assert_eq!(network.systems[0].asns, vec![701, 702]);

    let network = response.annotations["2001:db8::1"].network.as_ref().unwrap();
    assert_eq!(network.cidr, "2001:db8::/32");
    assert_eq!(network.as_number, 64496);
}

#[tokio::test]
async fn test_historical_selection() {
    let manager = manager();

    let jan = ready(&manager, at(2019, 2, 1)).await;
    let mut ann = Annotations::default();
    jan.annotate(parse_ip("84.1.28.246").unwrap(), &mut ann).unwrap();
    assert_eq!(ann.network.unwrap().as_number, 5483);

    let response = {
        ready(&manager, at(2019, 4, 1)).await;
        annotate_batch(&manager, &SiteAnnotations::default(), &request(at(2019, 4, 1), &["84.1.28.246"]))
            .unwrap()
    };
    let ann = &response.annotations["84.1.28.246"];
    assert_eq!(ann.network.as_ref().unwrap().as_number, 5484);
    assert_eq!(ann.network.as_ref().unwrap().cidr, "84.1.0.0/16");
    assert_eq!(ann.geo.as_ref().unwrap().country_code, "US");

    // Dates before the first snapshot use the earliest one.
    let response = {
        ready(&manager, at(2015, 6, 1)).await;
        annotate_batch(&manager, &SiteAnnotations::default(), &request(at(2015, 6, 1), &["84.1.28.246"]))
            .unwrap()
    };
    assert_eq!(response.annotations["84.1.28.246"].network.as_ref().unwrap().as_number, 5483);
}

#[tokio::test]
async fn test_site_overlay_takes_precedence() {
    let manager = manager();
    let date = at(2019, 2, 1);
    ready(&manager, date).await;

    let sites = SiteAnnotations::from_json(
        br#"[{"Name": "bud01",
              "Network": {"IPv4": "84.1.28.192/26"},
              "Annotation": {"Geo": {"city": "Budapest", "country_code": "HU"}}}]"#,
    )
    .unwrap();

    let response = annotate_batch(&manager, &sites, &request(date, &["84.1.28.200", "84.1.28.10"])).unwrap();
    assert_eq!(response.annotations["84.1.28.200"].geo.as_ref().unwrap().city, "Budapest");
    assert!(response.annotations["84.1.28.200"].network.is_none());
    assert_eq!(response.annotations["84.1.28.10"].geo.as_ref().unwrap().city, "London");
}

#[tokio::test]
async fn test_empty_store_has_no_annotator() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let manager = AnnotatorManager::new(store, as_names(), Handle::current());
    manager.update().unwrap();
    assert!(matches!(manager.get_annotator(at(2019, 2, 1)), Err(Error::NoAnnotator)));
}

#[tokio::test]
async fn test_broken_dataset_reports_loading_until_retried() {
    const RV4_APR: &str = "RouteViewIPv4/2019/04/routeviews-rv2-20190401-1200.pfx2as.gz";
    let store = store();
    store.insert(RV4_APR, "not a pfx2as row\n".repeat(60).into_bytes());
    let dyn_store: Arc<dyn ObjectStore> = store.clone();
    let manager = AnnotatorManager::new(dyn_store, as_names(), Handle::current());
    manager.update().unwrap();

    ready(&manager, at(2019, 3, 15)).await;

    // The April file fails to load; May is never answered from March.
    let date = at(2019, 5, 1);
    for _ in 0..30 {
        let result = annotate_batch(&manager, &SiteAnnotations::default(), &request(date, &["84.1.28.246"]));
        assert!(matches!(result, Err(Error::Loading)));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    store.insert(RV4_APR, gzip("84.1.0.0\t16\t5485\n"));
    let mut cleared = 0;
    for _ in 0..400 {
        cleared = manager.retry_failed();
        if cleared > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(cleared, 1);

    ready(&manager, date).await;
    let response = annotate_batch(&manager, &SiteAnnotations::default(), &request(date, &["84.1.28.246"])).unwrap();
    assert_eq!(response.annotations["84.1.28.246"].network.as_ref().unwrap().as_number, 5485);
}

async fn spawn_server(manager: Arc<AnnotatorManager>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(handler::serve(listener, AppState::new(manager, SiteAnnotations::default())));
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_annotate() {
    let manager = manager();
    let base = spawn_server(manager.clone()).await;
    let client = reqwest::Client::new();
    let body = serde_json::to_vec(&request(at(2019, 2, 1), &["84.1.28.246"])).unwrap();

    // Nothing is loaded yet.
    let response = client
        .post(format!("{}/annotate", base))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    ready(&manager, at(2019, 2, 1)).await;
    let response = client
        .post(format!("{}/annotate", base))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let response: Response = response.json().await.unwrap();
    assert_eq!(
        response.annotations["84.1.28.246"].network.as_ref().unwrap().cidr,
        "84.1.28.0/24"
    );
}

#[tokio::test]
async fn test_http_rejects_bad_requests() {
    let base = spawn_server(manager()).await;
    let client = reqwest::Client::new();

    let mut bad = serde_json::to_value(request(at(2019, 2, 1), &["84.1.28.246"])).unwrap();
    bad["RequestType"] = "Annotate v1.0".into();
    let response = client
        .post(format!("{}/annotate", base))
        .json(&bad)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/annotate", base))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_http_metrics_and_cron() {
    let base = spawn_server(manager()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/cron/update_maxmind_datasets", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = client.get(format!("{}/metrics", base)).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let text = response.text().await.unwrap();
    assert!(text.contains("annotator_rescans_total"));
}
