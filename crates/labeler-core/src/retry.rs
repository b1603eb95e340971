//! Bounded retry around a label store
//!
//! [`RetryPolicy`] is a plain value handed to [`RetryingLabelStore`]. The
//! wrapper retries only errors the store marks retryable, applies an optional
//! per-attempt timeout and gives up after `max_attempts` tries.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::warn;

use crate::directory::DirectoryObject;
use crate::labels::{LabelSet, LabelStore, LabelStoreError};

/// Capped exponential backoff with a fixed attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first one
    pub max_attempts: u32,
    /// Delay before the second try
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A policy that never retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Label store wrapper that applies a [`RetryPolicy`] to every call
#[derive(Debug, Clone)]
pub struct RetryingLabelStore<S> {
    inner: S,
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl<S: LabelStore> RetryingLabelStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            attempt_timeout: None,
        }
    }

    /// Treat an attempt that runs longer than `timeout` as rejected
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn run<T, F, Fut>(
        &self,
        operation: &str,
        object: &DirectoryObject,
        mut call: F,
    ) -> Result<T, LabelStoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LabelStoreError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = self.attempt_timeout;
        let mut attempt = 0u32;

        backoff::future::retry_notify(
            self.policy.backoff(),
            || {
                attempt += 1;
                let current = attempt;
                let fut = call();
                async move {
                    let result = match timeout {
                        Some(limit) => match tokio::time::timeout(limit, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(LabelStoreError::Rejected(format!(
                                "timed out after {:?}",
                                limit
                            ))),
                        },
                        None => fut.await,
                    };

                    result.map_err(|e| {
                        if e.is_retryable() && current < max_attempts {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |err: LabelStoreError, delay: Duration| {
                warn!(
                    asset = %object,
                    operation,
                    error = %err,
                    ?delay,
                    "Label store call failed, retrying"
                );
            },
        )
        .await
    }
}

#[async_trait]
impl<S: LabelStore> LabelStore for RetryingLabelStore<S> {
    async fn get_labels(&self, object: &DirectoryObject) -> Result<LabelSet, LabelStoreError> {
        self.run("get_labels", object, || self.inner.get_labels(object))
            .await
    }

    async fn set_labels(
        &self,
        object: &DirectoryObject,
        delta: &LabelSet,
    ) -> Result<(), LabelStoreError> {
        self.run("set_labels", object, || self.inner.set_labels(object, delta))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with the given error
    struct Flaky {
        failures: u32,
        error: LabelStoreError,
        calls: AtomicU32,
        writes: Mutex<Vec<LabelSet>>,
    }

    impl Flaky {
        fn new(failures: u32, error: LabelStoreError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                writes: Mutex::new(Vec::new()),
            }
        }

        fn check(&self) -> Result<(), LabelStoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl LabelStore for Flaky {
        async fn get_labels(&self, _: &DirectoryObject) -> Result<LabelSet, LabelStoreError> {
            self.check().map(|_| LabelSet::new())
        }

        async fn set_labels(
            &self,
            _: &DirectoryObject,
            delta: &LabelSet,
        ) -> Result<(), LabelStoreError> {
            self.check()?;
            self.writes.lock().unwrap().push(delta.clone());
            Ok(())
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    fn host() -> DirectoryObject {
        DirectoryObject::new("CN=host1,OU=Servers,DC=corp", "host1")
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        use backoff::backoff::Backoff;

        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(300));
        let mut backoff = policy.backoff();
        let delays: Vec<u128> = (0..4)
            .map(|_| backoff.next_backoff().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 300, 300]);
    }

    #[test]
    fn test_default_policy_has_three_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts, 3);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_rejection_is_retried() {
        let store = RetryingLabelStore::new(
            Flaky::new(2, LabelStoreError::Rejected("503".into())),
            fast_policy(3),
        );
        let delta = LabelSet::from([("Tier".to_string(), "Gold".to_string())]);

        store.set_labels(&host(), &delta).await.unwrap();

        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner().writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = RetryingLabelStore::new(
            Flaky::new(10, LabelStoreError::Rejected("429".into())),
            fast_policy(3),
        );

        let err = store.get_labels(&host()).await.unwrap_err();

        assert_eq!(err, LabelStoreError::Rejected("429".into()));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_fast() {
        let store = RetryingLabelStore::new(
            Flaky::new(10, LabelStoreError::AuthExpired("401".into())),
            fast_policy(3),
        );

        let err = store.get_labels(&host()).await.unwrap_err();

        assert!(matches!(err, LabelStoreError::AuthExpired(_)));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }

    struct Slow;

    #[async_trait]
    impl LabelStore for Slow {
        async fn get_labels(&self, _: &DirectoryObject) -> Result<LabelSet, LabelStoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(LabelSet::new())
        }

        async fn set_labels(&self, _: &DirectoryObject, _: &LabelSet) -> Result<(), LabelStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_rejection() {
        let store = RetryingLabelStore::new(Slow, fast_policy(2))
            .with_attempt_timeout(Some(Duration::from_millis(5)));

        let err = store.get_labels(&host()).await.unwrap_err();

        assert!(matches!(err, LabelStoreError::Rejected(msg) if msg.contains("timed out")));
    }
}
