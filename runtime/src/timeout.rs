//! Bounded calls into external collaborators.
//!
//! Every call that leaves the process gets a deadline. A stalled call is
//! converted into a [`TimeoutError`] carrying the operation name, which the
//! caller's error type absorbs through `From<TimeoutError>`.

use crate::metrics::IdentityCallMetrics;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A bounded call did not complete in time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{operation} timed out after {after:?}")]
pub struct TimeoutError {
    /// Name of the operation that timed out.
    pub operation: &'static str,
    /// The deadline that elapsed.
    pub after: Duration,
}

/// Run `call` with a deadline of `limit`.
///
/// The call's own error passes through unchanged; an elapsed deadline becomes
/// `E::from(TimeoutError)`. Duration and outcome are recorded under
/// `operation`.
///
/// # Errors
///
/// Returns the call's error, or a converted [`TimeoutError`] if the deadline
/// elapses first.
///
/// # Example
///
/// ```rust
/// use ballotbox_runtime::timeout::{TimeoutError, bounded};
/// use std::time::Duration;
///
/// # async fn example() {
/// let result: Result<u32, TimeoutError> =
///     bounded("lookup", Duration::from_secs(1), async { Ok(7) }).await;
/// assert_eq!(result, Ok(7));
/// # }
/// ```
pub async fn bounded<F, T, E>(operation: &'static str, limit: Duration, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    let started = tokio::time::Instant::now();
    let outcome = tokio::time::timeout(limit, call).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(Ok(value)) => {
            IdentityCallMetrics::record(operation, "ok", elapsed);
            Ok(value)
        }
        Ok(Err(err)) => {
            IdentityCallMetrics::record(operation, "error", elapsed);
            Err(err)
        }
        Err(_) => {
            IdentityCallMetrics::record(operation, "timeout", elapsed);
            tracing::warn!(
                operation,
                timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                "External call timed out"
            );
            Err(E::from(TimeoutError {
                operation,
                after: limit,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let result: Result<&str, TimeoutError> =
            bounded("session_lookup", Duration::from_secs(8), async { Ok("ok") }).await;
        assert_eq!(result, Ok("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_error_is_not_converted() {
        #[derive(Debug, PartialEq)]
        enum CallError {
            Rejected,
            TimedOut(&'static str),
        }
        impl From<TimeoutError> for CallError {
            fn from(err: TimeoutError) -> Self {
                Self::TimedOut(err.operation)
            }
        }

        let result: Result<(), CallError> =
            bounded("sign_in", Duration::from_secs(8), async { Err(CallError::Rejected) }).await;
        assert_eq!(result, Err(CallError::Rejected));

        let result: Result<(), CallError> = bounded("sign_in", Duration::from_secs(8), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(CallError::TimedOut("sign_in")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_call_times_out() {
        let result: Result<(), TimeoutError> = bounded("refresh", Duration::from_secs(8), async {
            futures::future::pending::<()>().await;
            Ok(())
        })
        .await;

        assert_eq!(
            result,
            Err(TimeoutError {
                operation: "refresh",
                after: Duration::from_secs(8),
            })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "refresh timed out after 8s"
        );
    }
}
