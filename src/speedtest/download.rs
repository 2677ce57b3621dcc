use crate::errors::SpeedTestError;
use crate::speedtest::ProbeMeasurement;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use tokio::time::Instant;
use url::Url;

/// Time one GET transfer.
///
/// The clock starts once the response headers have arrived and stops
/// when the body stream ends, so connection setup is not counted as
/// transfer time. Non-success statuses are protocol failures.
pub(crate) async fn download(
    client: &Client,
    url: Url,
) -> Result<ProbeMeasurement, SpeedTestError> {
    info!("Beginning download transfer: {}", url);

    let response =
        client.get(url.clone()).headers(download_headers()).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SpeedTestError::protocol(format!(
            "{} answered HTTP {}",
            url.host_str().unwrap_or("endpoint"),
            status
        )));
    }

    let mut response = response;
    let started = Instant::now();
    let mut bytes: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        bytes += chunk.len() as u64;
    }

    let elapsed = started.elapsed();
    debug!("Downloaded {} bytes in {:?} from {}", bytes, elapsed, url);

    Ok(ProbeMeasurement::new(bytes, elapsed))
}

fn download_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers
}
