//! Ordered endpoint fallback for probe and ping requests.
//!
//! An operation is attempted against each endpoint in order until one
//! succeeds. Transport and protocol failures move on to the next
//! endpoint; any other failure ends the chain immediately.

use crate::errors::SpeedTestError;
use log::{debug, warn};
use std::future::Future;

/// Result of running an operation through a fallback chain.
#[derive(Debug)]
pub enum FallbackResult<T> {
    /// An endpoint succeeded.
    Success {
        value: T,
        /// Position of the endpoint that succeeded.
        endpoint: usize,
    },
    /// An endpoint failed in a way another endpoint would not fix.
    Rejected(SpeedTestError),
    /// Every endpoint failed.
    Exhausted {
        /// The failure of the last endpoint tried.
        last_error: SpeedTestError,
        /// Number of endpoints tried.
        attempts: u32,
    },
}

impl<T> FallbackResult<T> {
    /// Converts to Result, wrapping exhaustion in an `Exhausted` error.
    pub fn into_result(self, operation: &str) -> Result<T, SpeedTestError> {
        match self {
            FallbackResult::Success { value, .. } => Ok(value),
            FallbackResult::Rejected(error) => Err(error),
            FallbackResult::Exhausted { last_error, attempts } => {
                Err(SpeedTestError::exhausted(
                    format!(
                        "{} failed on all {} endpoints: {}",
                        operation, attempts, last_error.message
                    ),
                    last_error,
                ))
            }
        }
    }
}

/// Run `f` against each endpoint in order and return the first success.
///
/// An empty endpoint list is reported as exhausted after zero attempts.
pub async fn first_success<E, T, F, Fut>(
    endpoints: &[E],
    operation_name: &str,
    mut f: F,
) -> FallbackResult<T>
where
    F: FnMut(&E) -> Fut,
    Fut: Future<Output = Result<T, SpeedTestError>>,
{
    let mut last_error: Option<SpeedTestError> = None;
    let mut attempts = 0;

    for (position, endpoint) in endpoints.iter().enumerate() {
        attempts += 1;

        match f(endpoint).await {
            Ok(value) => {
                if position > 0 {
                    debug!(
                        "{}: succeeded on fallback endpoint {}",
                        operation_name,
                        position + 1
                    );
                }
                return FallbackResult::Success { value, endpoint: position };
            }
            Err(error) if !error.kind.should_fall_back() => {
                debug!("{}: not falling back: {}", operation_name, error);
                return FallbackResult::Rejected(error);
            }
            Err(error) => {
                if position + 1 < endpoints.len() {
                    warn!(
                        "{}: endpoint {} failed, trying next: {}",
                        operation_name,
                        position + 1,
                        error.message
                    );
                } else {
                    warn!(
                        "{}: all {} endpoints failed. Last error: {}",
                        operation_name, attempts, error.message
                    );
                }
                last_error = Some(error);
            }
        }
    }

    FallbackResult::Exhausted {
        last_error: last_error.unwrap_or_else(|| {
            SpeedTestError::config(format!(
                "{}: no endpoints configured",
                operation_name
            ))
        }),
        attempts,
    }
}
