//! Startup gate on network reachability

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::indicator::StatusIndicator;
use crate::{Error, Result};

/// Pause between failed probes
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// A lightweight reachability check
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Succeeds if the network is reachable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connectivity`] if the probe fails
    async fn check(&self) -> Result<()>;
}

/// GET against a well-known host; any HTTP response counts as online
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Create a probe for `url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> Result<()> {
        self.client
            .get(&self.url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Error::Connectivity(e.to_string()))
    }
}

/// Blocks until the probe succeeds, blinking the ready light meanwhile
pub struct Watchdog<P> {
    probe: P,
    indicator: Arc<dyn StatusIndicator>,
    retry_interval: Duration,
}

impl<P: ConnectivityProbe> Watchdog<P> {
    pub fn new(probe: P, indicator: Arc<dyn StatusIndicator>) -> Self {
        Self {
            probe,
            indicator,
            retry_interval: RETRY_INTERVAL,
        }
    }

    /// Override the pause between failed probes
    #[must_use]
    pub const fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Probe until the network answers; retries forever
    ///
    /// Returns the number of failed probes before success.
    pub async fn wait_for_connectivity(&self) -> u32 {
        let mut failures = 0u32;
        loop {
            match self.probe.check().await {
                Ok(()) => {
                    self.indicator.ready();
                    if failures > 0 {
                        tracing::info!(failures, "network reachable");
                    }
                    return failures;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    if failures == 1 {
                        tracing::warn!(error = %e, "network unreachable, waiting");
                    } else {
                        tracing::debug!(error = %e, failures, "network still unreachable");
                    }
                    tokio::time::sleep(self.retry_interval).await;
                    self.indicator.connectivity_lost_pulse();
                }
            }
        }
    }

    /// Run a single probe without retrying
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connectivity`] if the probe fails
    pub async fn check_once(&self) -> Result<()> {
        self.probe.check().await
    }
}
