//! Resource decorators
//!
//! Every resource in a resource set is wrapped, outermost first, with a
//! metrics decorator and a retry decorator. Retries cover whole
//! `ensure_created`/`ensure_deleted` calls; resources never retry the
//! individual API calls they make.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{error, warn};

use super::context::ControllerContext;
use super::metrics;
use super::resource::Resource;
use crate::crd::AWSConfig;
use crate::error::{Error, Result};

/// Bounded retry with exponential backoff and jitter.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retries retriable failures of the wrapped resource.
pub struct RetryResource {
    inner: Arc<dyn Resource>,
    config: RetryConfig,
}

impl RetryResource {
    pub fn new(inner: Arc<dyn Resource>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn backoff(&self, attempt: u32, delay: Duration, err: &Error) -> Duration {
        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
        warn!(
            resource = self.inner.name(),
            attempt,
            error = %err,
            delay_ms = jittered.as_millis() as u64,
            "Resource failed, retrying"
        );
        tokio::time::sleep(jittered).await;
        Duration::from_secs_f64(delay.as_secs_f64() * self.config.backoff_multiplier)
            .min(self.config.max_delay)
    }
}

macro_rules! retry_loop {
    ($self:ident, $call:expr) => {{
        let mut attempt = 0u32;
        let mut delay = $self.config.initial_delay;
        loop {
            attempt += 1;
            match $call.await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_retriable() || attempt >= $self.config.max_attempts.max(1) => {
                    if e.is_retriable() {
                        error!(
                            resource = $self.inner.name(),
                            attempt,
                            error = %e,
                            "Resource failed after max retries"
                        );
                    }
                    return Err(e);
                }
                Err(e) => {
                    delay = $self.backoff(attempt, delay, &e).await;
                }
            }
        }
    }};
}

#[async_trait]
impl Resource for RetryResource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        retry_loop!(self, self.inner.ensure_created(obj, ctx))
    }

    async fn ensure_deleted(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        retry_loop!(self, self.inner.ensure_deleted(obj, ctx))
    }
}

/// Records duration and error count of the wrapped resource.
pub struct MetricsResource {
    inner: Arc<dyn Resource>,
}

impl MetricsResource {
    pub fn new(inner: Arc<dyn Resource>) -> Self {
        Self { inner }
    }

    fn record(&self, operation: &str, started: Instant, result: &Result<()>) {
        let name = self.inner.name();
        metrics::observe_resource_duration_seconds(
            name,
            operation,
            started.elapsed().as_secs_f64(),
        );
        if let Err(e) = result {
            metrics::inc_resource_error(name, operation, e.kind());
        }
    }
}

#[async_trait]
impl Resource for MetricsResource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.ensure_created(obj, ctx).await;
        self.record("create", started, &result);
        result
    }

    async fn ensure_deleted(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.ensure_deleted(obj, ctx).await;
        self.record("delete", started, &result);
        result
    }
}

/// Wrap each resource with metrics (outermost) and retry (innermost).
pub fn wrap(resources: Vec<Arc<dyn Resource>>, retry: &RetryConfig) -> Vec<Arc<dyn Resource>> {
    resources
        .into_iter()
        .map(|resource| {
            let retried: Arc<dyn Resource> = Arc::new(RetryResource::new(resource, retry.clone()));
            Arc::new(MetricsResource::new(retried)) as Arc<dyn Resource>
        })
        .collect()
}
