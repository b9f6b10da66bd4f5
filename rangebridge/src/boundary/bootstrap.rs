//! One-time producer bootstrap and readiness polling.
//!
//! # State Machine
//!
//! ```text
//! Uninitialized --[is_ready]--> Ready
//! Uninitialized --[inject, poll x N]--> Ready
//! Uninitialized --[inject, N polls not ready]--> Uninitialized (InitializationTimeout)
//! ```
//!
//! A failed attempt leaves the state uninitialized; the next call starts over.

use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::Producer;
use crate::error::{BridgeError, BridgeResult};

/// Default number of readiness polls after injection.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 25;

/// Default delay between readiness polls (100ms).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Readiness polling configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Polls to attempt before giving up.
    pub poll_attempts: u32,
    /// Delay between polls.
    pub poll_interval: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Guards producer initialization so it succeeds at most once.
#[derive(Debug, Default)]
pub struct Bootstrapper {
    config: BootstrapConfig,
    ready: OnceCell<()>,
}

impl Bootstrapper {
    /// Create a bootstrapper with the given polling configuration.
    pub fn new(config: BootstrapConfig) -> Self {
        Self {
            config,
            ready: OnceCell::new(),
        }
    }

    /// Returns true once initialization has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.ready.initialized()
    }

    /// Make sure the producer is ready, bootstrapping it if needed.
    pub async fn ensure_initialized(&self, producer: &dyn Producer) -> BridgeResult<()> {
        self.ready
            .get_or_try_init(|| self.initialize(producer))
            .await
            .map(|_| ())
    }

    async fn initialize(&self, producer: &dyn Producer) -> BridgeResult<()> {
        if producer.is_ready().await {
            debug!("producer already ready");
            return Ok(());
        }

        info!("injecting producer bootstrap");
        producer.inject_bootstrap().await?;

        let attempts = self.config.poll_attempts;
        for attempt in 1..=attempts {
            if producer.is_ready().await {
                info!(attempt, "producer ready");
                return Ok(());
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        warn!(attempts, "producer never reported ready");
        Err(BridgeError::InitializationTimeout { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackProducer;

    fn fast_config(attempts: u32) -> BootstrapConfig {
        BootstrapConfig {
            poll_attempts: attempts,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_ready_producer_skips_injection() {
        let producer = LoopbackProducer::new();
        let bootstrap = Bootstrapper::new(fast_config(3));

        bootstrap.ensure_initialized(&producer).await.unwrap();
        assert!(bootstrap.is_initialized());
        assert_eq!(producer.bootstrap_injections(), 0);
    }

    #[tokio::test]
    async fn test_injects_and_polls_until_ready() {
        let producer = LoopbackProducer::new();
        producer.ready_after_polls(3);
        let bootstrap = Bootstrapper::new(fast_config(5));

        bootstrap.ensure_initialized(&producer).await.unwrap();
        assert_eq!(producer.bootstrap_injections(), 1);

        // Second call is a no-op.
        bootstrap.ensure_initialized(&producer).await.unwrap();
        assert_eq!(producer.bootstrap_injections(), 1);
    }

    #[tokio::test]
    async fn test_times_out_and_can_retry() {
        let producer = LoopbackProducer::new();
        producer.never_ready();
        let bootstrap = Bootstrapper::new(fast_config(4));

        let err = bootstrap.ensure_initialized(&producer).await.unwrap_err();
        assert_eq!(err, BridgeError::InitializationTimeout { attempts: 4 });
        assert!(!bootstrap.is_initialized());

        producer.ready_after_polls(0);
        bootstrap.ensure_initialized(&producer).await.unwrap();
        assert!(bootstrap.is_initialized());
    }
}
