//! HTTP probe execution.
//!
//! A probe is one timed transfer of a given size. Large probes are split
//! into concurrent sub-transfers so a single slow connection does not cap
//! the reading; the combined throughput is the successful bytes over the
//! wall time of the whole split.

use crate::config::ProbeConfig;
use crate::errors::{ErrorKind, SpeedTestError};
use crate::fallback::first_success;
use crate::speedtest::download::download;
use crate::speedtest::upload::{payload, upload};
use crate::speedtest::{Direction, ProbeExecutor, ProbeMeasurement, UA};
use bytes::Bytes;
use futures::future::join_all;
use log::{debug, warn};
use reqwest::Client;
use std::future::Future;
use tokio::time::Instant;

/// One transfer with everything it needs prepared up front, so payload
/// generation is never inside a timed span.
#[derive(Debug, Clone)]
enum Transfer {
    Download(u64),
    Upload(Bytes),
}

impl Transfer {
    fn direction(&self) -> Direction {
        match self {
            Transfer::Download(_) => Direction::Download,
            Transfer::Upload(_) => Direction::Upload,
        }
    }

    fn bytes(&self) -> u64 {
        match self {
            Transfer::Download(bytes) => *bytes,
            Transfer::Upload(data) => data.len() as u64,
        }
    }
}

/// Probe executor backed by a shared reqwest client.
pub struct HttpProbeExecutor {
    client: Client,
    config: ProbeConfig,
}

impl HttpProbeExecutor {
    pub fn new(config: ProbeConfig) -> Result<Self, SpeedTestError> {
        let client = Client::builder()
            .user_agent(UA)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Prepare one transfer per entry of `sizes`.
    ///
    /// Upload parts share a single generated payload; each part is a view
    /// of its first `size` bytes.
    fn prepare(&self, direction: Direction, sizes: &[u64]) -> Vec<Transfer> {
        match direction {
            Direction::Download => {
                sizes.iter().map(|size| Transfer::Download(*size)).collect()
            }
            Direction::Upload => {
                let largest = sizes.iter().copied().max().unwrap_or(0);
                let data = payload(largest, self.config.random_payload_limit);

                sizes
                    .iter()
                    .map(|size| Transfer::Upload(data.slice(..*size as usize)))
                    .collect()
            }
        }
    }

    /// One transfer through the endpoint fallback chain.
    async fn transfer(
        &self,
        transfer: Transfer,
    ) -> Result<ProbeMeasurement, SpeedTestError> {
        let direction = transfer.direction();
        let bytes = transfer.bytes();
        let operation = format!("{} probe ({} bytes)", direction, bytes);
        let endpoints = self.config.endpoints(direction);
        let client = &self.client;

        let result = match transfer {
            Transfer::Download(bytes) => {
                first_success(endpoints, &operation, |endpoint| {
                    let url = endpoint.resolve(bytes);
                    async move { download(client, url?).await }
                })
                .await
            }
            Transfer::Upload(data) => {
                first_success(endpoints, &operation, |endpoint| {
                    let url = endpoint.resolve(bytes);
                    let data = data.clone();
                    async move { upload(client, url?, data).await }
                })
                .await
            }
        };

        let measurement = result.into_result(&operation)?;
        if measurement.bytes < bytes {
            debug!(
                "{}: endpoint delivered {} of {} bytes",
                operation, measurement.bytes, bytes
            );
        }

        Ok(measurement)
    }

    fn should_split(&self, direction: Direction, bytes: u64) -> bool {
        self.config.split_parts > 1
            && bytes >= self.config.split_threshold(direction)
    }
}

impl ProbeExecutor for HttpProbeExecutor {
    fn run_probe(
        &self,
        direction: Direction,
        bytes: u64,
    ) -> impl Future<Output = Result<ProbeMeasurement, SpeedTestError>> + Send
    {
        async move {
            let sizes = if self.should_split(direction, bytes) {
                debug!(
                    "Splitting {} probe of {} bytes into {} parts",
                    direction, bytes, self.config.split_parts
                );
                split_sizes(bytes, self.config.split_parts)
            } else {
                vec![bytes]
            };

            let transfers = self.prepare(direction, &sizes);

            let measurement = match <[Transfer; 1]>::try_from(transfers) {
                Ok([single]) => self.transfer(single).await?,
                Err(parts) => {
                    split_transfer(
                        bytes,
                        parts,
                        self.config.split_min_successes,
                        |part| self.transfer(part),
                    )
                    .await?
                }
            };

            measurement.validate()
        }
    }
}

/// Sizes of the sub-transfers of a split probe.
///
/// Every part gets `total / parts` bytes and the last one also carries the
/// remainder, so the sizes always add up to `total`.
pub fn split_sizes(total: u64, parts: usize) -> Vec<u64> {
    let parts = parts.max(1);
    let base = total / parts as u64;
    let remainder = total % parts as u64;

    let mut sizes = vec![base; parts];
    if let Some(last) = sizes.last_mut() {
        *last += remainder;
    }
    sizes
}

/// Run the prepared parts of a split probe concurrently and combine them.
///
/// The result covers the successful parts only and is timed over the wall
/// span of the whole group, which starts once every part is prepared.
/// Fewer than `min_successes` successful parts fail the probe.
pub async fn split_transfer<T, F, Fut>(
    total: u64,
    parts: Vec<T>,
    min_successes: usize,
    transfer: F,
) -> Result<ProbeMeasurement, SpeedTestError>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<ProbeMeasurement, SpeedTestError>>,
{
    let count = parts.len();
    let started = Instant::now();

    let results = join_all(parts.into_iter().map(transfer)).await;
    let span = started.elapsed();

    let mut bytes = 0;
    let mut succeeded = 0;
    let mut last_error = None;

    for result in results {
        match result {
            Ok(measurement) => {
                bytes += measurement.bytes;
                succeeded += 1;
            }
            Err(error) => {
                debug!("Sub-transfer failed: {}", error.message);
                last_error = Some(error);
            }
        }
    }

    if succeeded < min_successes {
        warn!(
            "Split probe of {} bytes: only {} of {} sub-transfers succeeded",
            total, succeeded, count
        );
        let error = SpeedTestError::new(
            ErrorKind::Network,
            format!(
                "only {} of {} sub-transfers succeeded, {} required",
                succeeded, count, min_successes
            ),
        );
        return Err(match last_error {
            Some(last) => error.with_source(last),
            None => error,
        });
    }

    Ok(ProbeMeasurement::new(bytes, span))
}
