use std::error::Error;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retry schedule. The operation is attempted once, then once more
/// after each delay, so `delays.len() + 1` attempts in total.
///
/// # Examples
///
/// ```
/// use tally_common::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
        }
    }
}

/// Runs `f` until it succeeds, fails with an error `is_transient` rejects,
/// or the policy runs out of delays. The last error is returned unchanged.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    is_transient: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delays = policy.delays.iter();
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => match delays.next() {
                Some(delay) => {
                    tracing::info!(
                        op,
                        attempt,
                        error = %e,
                        retry_in = ?delay,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                    attempt += 1;
                }
                None => {
                    tracing::warn!(op, attempt, error = %e, "Retries exhausted");
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}

/// True if any error in the `source()` chain is an I/O connection-refused.
pub fn is_connection_refused(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}
