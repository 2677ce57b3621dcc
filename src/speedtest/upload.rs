use crate::errors::SpeedTestError;
use crate::speedtest::ProbeMeasurement;
use bytes::Bytes;
use log::{debug, info};
use rand::RngCore;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use tokio::time::Instant;
use url::Url;

/// Size of the random block repeated through large payloads.
pub(crate) const PAYLOAD_BLOCK_SIZE: usize = 64 * 1024;

/// Build an upload payload of `bytes` bytes.
///
/// Payloads up to `random_limit` are fully random. Larger payloads repeat
/// one random block so generation stays cheap; the content is still
/// incompressible per block.
pub(crate) fn payload(bytes: u64, random_limit: u64) -> Bytes {
    let size = bytes as usize;
    let mut data = vec![0u8; size];
    let mut rng = rand::rng();

    if bytes <= random_limit {
        rng.fill_bytes(&mut data);
        return Bytes::from(data);
    }

    let mut block = vec![0u8; PAYLOAD_BLOCK_SIZE];
    rng.fill_bytes(&mut block);

    for chunk in data.chunks_mut(PAYLOAD_BLOCK_SIZE) {
        chunk.copy_from_slice(&block[..chunk.len()]);
    }

    Bytes::from(data)
}

/// Time one POST transfer of a prepared payload.
///
/// Payload generation happens before this is called. The clock runs from
/// just before the request is sent until the response status is known.
pub(crate) async fn upload(
    client: &Client,
    url: Url,
    data: Bytes,
) -> Result<ProbeMeasurement, SpeedTestError> {
    let bytes = data.len() as u64;
    info!("Beginning upload transfer: {} bytes to {}", bytes, url);

    let request = client.post(url.clone()).headers(upload_headers()).body(data);

    let started = Instant::now();
    let response = request.send().await?;
    let elapsed = started.elapsed();

    let status = response.status();
    if !status.is_success() {
        return Err(SpeedTestError::protocol(format!(
            "{} answered HTTP {}",
            url.host_str().unwrap_or("endpoint"),
            status
        )));
    }

    debug!("Uploaded {} bytes in {:?} to {}", bytes, elapsed, url);

    Ok(ProbeMeasurement::new(bytes, elapsed))
}

fn upload_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}
