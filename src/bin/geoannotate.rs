//! geoannotate: annotation server and command line client.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use geoannotate::config::{DEFAULT_LISTEN, DEFAULT_PROJECT, RESCAN_INTERVAL};
use geoannotate::handler::{self, AppState};
use geoannotate::{
    as_names, init_as_names_from_file, AnnotationClient, AnnotatorManager, Config, LocalStore,
    SiteAnnotations,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "geoannotate")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Historical IP geolocation and ASN annotation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve annotation requests over HTTP
    Serve {
        /// Cloud project; datasets are read from the downloader-<project> bucket
        #[arg(long, env = "GCLOUD_PROJECT", default_value = DEFAULT_PROJECT)]
        project: String,

        /// Directory holding the dataset buckets
        #[arg(long, env = "ANNOTATOR_DATA_ROOT", default_value = ".")]
        data_root: PathBuf,

        /// AS number to name CSV
        #[arg(long, env = "ANNOTATOR_ASNAMES")]
        asnames: Option<PathBuf>,

        /// Site annotations JSON
        #[arg(long, env = "ANNOTATOR_SITE_ANNOTATIONS")]
        site_annotations: Option<PathBuf>,

        /// Listen address
        #[arg(long, env = "ANNOTATOR_LISTEN", default_value = DEFAULT_LISTEN)]
        listen: String,
    },

    /// Annotate addresses through a running server
    Annotate {
        /// Annotation endpoint
        #[arg(short, long, default_value = "http://localhost:8080/annotate")]
        url: String,

        /// Date of the measurement (RFC 3339); defaults to now
        #[arg(short, long)]
        date: Option<DateTime<Utc>>,

        /// Give up after this many seconds
        #[arg(short, long, default_value_t = 60)]
        timeout: u64,

        /// Addresses to annotate
        #[arg(required = true)]
        ips: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            project,
            data_root,
            asnames,
            site_annotations,
            listen,
        } => {
            let config = Config {
                project,
                data_root,
                asnames_path: asnames,
                site_annotations_path: site_annotations,
                listen,
            };
            serve(config).await
        }
        Commands::Annotate {
            url,
            date,
            timeout,
            ips,
        } => annotate(&url, date.unwrap_or_else(Utc::now), ips, timeout).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &config.asnames_path {
        let count = init_as_names_from_file(path)?;
        log::info!("Loaded {} AS names from {:?}", count, path);
    }
    let sites = match &config.site_annotations_path {
        Some(path) => SiteAnnotations::from_file(path)?,
        None => SiteAnnotations::default(),
    };

    let bucket = config.bucket_path();
    log::info!("Reading datasets from {:?}", bucket);
    let store = Arc::new(LocalStore::new(&bucket));
    let manager = Arc::new(AnnotatorManager::new(
        store,
        as_names(),
        tokio::runtime::Handle::current(),
    ));

    handler::rescan(manager.clone()).await?;
    manager.load_latest();

    let rescans = manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RESCAN_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            // Failures are logged by `rescan`; the next tick tries again.
            let _ = handler::rescan(rescans.clone()).await;
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    handler::serve(listener, AppState::new(manager, sites)).await?;
    Ok(())
}

async fn annotate(
    url: &str,
    date: DateTime<Utc>,
    ips: Vec<String>,
    timeout: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = AnnotationClient::new(url)?;
    let response = client
        .annotate(date, ips, "geoannotate-cli", Duration::from_secs(timeout))
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
