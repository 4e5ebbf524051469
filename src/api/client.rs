//! Client for remote batch annotation with retry on 503.
//!
//! The server answers 503 while the datasets for a date are still loading.
//! The client keeps retrying those, one second apart, until the caller's
//! deadline; every other non-200 answer fails immediately with the body.

use chrono::{DateTime, Utc};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::{Request, Response};
use crate::config::{POST_TIMEOUT, RETRY_DELAY};
use crate::error::{Error, Result};

/// Remote annotation client.
///
/// # Example
///
/// ```ignore
/// use geoannotate::AnnotationClient;
/// use std::time::Duration;
///
/// let client = AnnotationClient::new("http://localhost:8080/annotate")?;
/// let response = client
///     .annotate(chrono::Utc::now(), vec!["8.8.8.8".into()], "example", Duration::from_secs(10))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct AnnotationClient {
    client: Client,
    url: String,
    post_timeout: Duration,
    retry_delay: Duration,
}

impl AnnotationClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            post_timeout: POST_TIMEOUT,
            retry_delay: RETRY_DELAY,
        })
    }

    /// Set the pause between attempts answered with 503.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Annotate `ips` as of `date`, retrying 503 answers until `deadline`
    /// has elapsed.
    pub async fn annotate(
        &self,
        date: DateTime<Utc>,
        ips: Vec<String>,
        info: &str,
        deadline: Duration,
    ) -> Result<Response> {
        let body = serde_json::to_vec(&Request::new(date, ips, info))?;

        let response = self.post_with_retry(body, deadline).await?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if status != StatusCode::OK {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// POST `body`, retrying while the server answers 503.
    async fn post_with_retry(&self, body: Vec<u8>, deadline: Duration) -> Result<reqwest::Response> {
        let attempts = async {
            let mut attempt = 1u32;
            loop {
                let result = self
                    .client
                    .post(&self.url)
                    .timeout(self.post_timeout)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone())
                    .send()
                    .await;

                match result {
                    Ok(response) if response.status() == StatusCode::SERVICE_UNAVAILABLE => {
                        log::debug!("Annotator busy (attempt {}), retrying", attempt);
                        attempt += 1;
                        sleep(self.retry_delay).await;
                    }
                    Ok(response) => return Ok(response),
                    Err(e) if e.is_timeout() => return Err(Error::Timeout),
                    Err(e) => return Err(Error::Transport(e.to_string())),
                }
            }
        };

        timeout(deadline, attempts).await.map_err(|_| Error::Timeout)?
    }
}
