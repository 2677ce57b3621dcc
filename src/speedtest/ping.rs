//! Latency sampling.
//!
//! Each sample times one request against every ping endpoint at once,
//! drops implausible values and reports the median. When nothing
//! plausible is left the sample is a flagged synthetic value.

use crate::config::PingConfig;
use crate::errors::SpeedTestError;
use crate::speedtest::endpoints::Endpoint;
use crate::speedtest::{PingReading, PingSource, UA};
use crate::stats::median_f64;
use futures::future::join_all;
use log::{debug, warn};
use rand::Rng;
use reqwest::header::{HeaderValue, CACHE_CONTROL};
use reqwest::Client;
use std::ops::Range;
use tokio::time::Instant;

/// Range synthetic ping values are drawn from, in ms.
pub const SIMULATED_PING_RANGE_MS: Range<f64> = 20.0..80.0;

/// HTTP round-trip sampler.
pub struct PingSampler {
    client: Client,
    config: PingConfig,
}

impl PingSampler {
    pub fn new(config: PingConfig) -> Result<Self, SpeedTestError> {
        let client =
            Client::builder().user_agent(UA).timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    /// Time one request. Any HTTP response counts, whatever its status.
    async fn time_request(
        &self,
        endpoint: &Endpoint,
    ) -> Result<f64, SpeedTestError> {
        let url = endpoint.resolve(0)?;

        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!(
            "Ping {} answered {} in {:.1} ms",
            endpoint.host(),
            response.status(),
            elapsed_ms
        );

        Ok(elapsed_ms)
    }
}

impl PingSource for PingSampler {
    async fn measure_ping(&self) -> PingReading {
        let requests = self
            .config
            .endpoints
            .iter()
            .map(|endpoint| self.time_request(endpoint));

        let samples = join_all(requests)
            .await
            .into_iter()
            .zip(&self.config.endpoints)
            .filter_map(|(result, endpoint)| match result {
                Ok(ms) => Some(ms),
                Err(error) => {
                    debug!("Ping to {} failed: {}", endpoint.host(), error.message);
                    None
                }
            })
            .collect();

        reduce_ping_samples(samples, &self.config)
    }
}

/// Reduce raw round-trip times to one reading.
pub fn reduce_ping_samples(samples: Vec<f64>, config: &PingConfig) -> PingReading {
    let mut plausible: Vec<f64> = samples
        .into_iter()
        .filter(|ms| {
            ms.is_finite()
                && *ms >= config.min_plausible_ms
                && *ms <= config.max_plausible_ms
        })
        .collect();

    match median_f64(&mut plausible) {
        Some(ms) => PingReading { ms, simulated: false },
        None => {
            let ms = rand::rng().random_range(SIMULATED_PING_RANGE_MS);
            warn!("No plausible ping sample, using synthetic {:.1} ms", ms);
            PingReading { ms, simulated: true }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::test_server::TestServer;
    use std::time::Duration;

    #[test]
    fn test_median_of_plausible_samples() {
        let reading =
            reduce_ping_samples(vec![30.0, 10.0, 20.0], &PingConfig::default());
        assert_eq!(reading, PingReading { ms: 20.0, simulated: false });
    }

    #[test]
    fn test_implausible_samples_are_discarded() {
        // 1ms is below and 9000ms above the plausible range
        let reading = reduce_ping_samples(
            vec![1.0, 42.0, 9000.0, 48.0],
            &PingConfig::default(),
        );
        assert_eq!(reading, PingReading { ms: 45.0, simulated: false });
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let config = PingConfig::default();
        assert_eq!(reduce_ping_samples(vec![5.0], &config).ms, 5.0);
        assert_eq!(reduce_ping_samples(vec![5000.0], &config).ms, 5000.0);
    }

    #[test]
    fn test_no_plausible_samples_yields_flagged_value() {
        for samples in [vec![], vec![0.5, 12_000.0, f64::NAN]] {
            let reading = reduce_ping_samples(samples, &PingConfig::default());
            assert!(reading.simulated);
            assert!(SIMULATED_PING_RANGE_MS.contains(&reading.ms));
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_yield_flagged_value() {
        let config = PingConfig {
            endpoints: vec![Endpoint::new("http://127.0.0.1:9/favicon.ico").unwrap()],
            timeout: Duration::from_millis(500),
            ..PingConfig::default()
        };
        let sampler = PingSampler::new(config).unwrap();

        let reading = sampler.measure_ping().await;
        assert!(reading.simulated);
    }

    #[tokio::test]
    async fn test_endpoints_are_timed_together() {
        let server = TestServer::start().await;
        let config = PingConfig {
            endpoints: vec![server.endpoint("/slow/200"); 3],
            ..PingConfig::default()
        };
        let sampler = PingSampler::new(config).unwrap();

        let started = Instant::now();
        let reading = sampler.measure_ping().await;

        assert!(!reading.simulated);
        assert!(reading.ms >= 200.0);
        // One at a time would take at least 600ms.
        assert!(started.elapsed() < Duration::from_millis(550));
    }
}
