//! Throttling transport that paces requests before handing them to a delegate.

use async_trait::async_trait;
use reqwest::{Request, Response};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ThrottleConfig;
use crate::error::{Result, SendError};

use super::backend::Transport;
use super::bucket::TokenBucketLimiter;
use super::policy::ThrottlingPolicy;

/// A transport that applies a [`ThrottlingPolicy`] in front of another one.
///
/// Clones share the same limiter, so every clone counts against one rate.
#[derive(Debug, Clone)]
pub struct ThrottlingTransport<T> {
    /// The transport requests are forwarded to
    delegate: T,
    policy: ThrottlingPolicy,
    limiter: Arc<TokenBucketLimiter>,
}

impl<T: Transport> ThrottlingTransport<T> {
    /// Wrap `delegate` with an already compiled policy.
    pub fn new(delegate: T, policy: ThrottlingPolicy) -> Self {
        let limiter = Arc::new(TokenBucketLimiter::new(policy.events_per_second()));
        Self {
            delegate,
            policy,
            limiter,
        }
    }

    /// Wrap `delegate` with the policy described by `config`.
    ///
    /// Fails if the configuration is invalid or a prefix pattern does not compile.
    pub fn from_config(delegate: T, config: &ThrottleConfig) -> Result<Self> {
        Ok(Self::new(delegate, config.into_policy()?))
    }

    pub fn policy(&self) -> &ThrottlingPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.limiter
    }

    pub fn delegate(&self) -> &T {
        &self.delegate
    }

    /// Send a request, waiting for a slot as long as it takes.
    pub async fn send(&self, request: Request) -> std::result::Result<Response, SendError<T::Error>> {
        self.send_until(request, std::future::pending()).await
    }

    /// Send a request, giving up if no slot is reached within `timeout`.
    pub async fn send_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> std::result::Result<Response, SendError<T::Error>> {
        self.send_until(request, tokio::time::sleep(timeout)).await
    }

    /// Send a request, giving up if `cancel` resolves while it is waiting.
    ///
    /// Only the wait for a slot is cancellable; once forwarded, the request
    /// runs to completion. A cancelled request keeps its reserved slot.
    pub async fn send_until<F>(
        &self,
        request: Request,
        cancel: F,
    ) -> std::result::Result<Response, SendError<T::Error>>
    where
        F: Future<Output = ()> + Send,
    {
        if !self.policy.filter().applies_to(&request) {
            return self.forward(request).await;
        }

        if !self.policy.allow_overqueue() {
            if self.limiter.try_acquire_now() {
                return self.forward(request).await;
            }
            debug!(
                path = %request.url().path(),
                method = %request.method(),
                "Rejecting throttled request, no slot available"
            );
            return Err(SendError::OverqueueRejected);
        }

        let delay = self.limiter.reserve_delay();
        if !delay.is_zero() {
            debug!(
                path = %request.url().path(),
                method = %request.method(),
                delay_ms = saturating_millis(delay),
                "Delaying throttled request"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel => {
                    debug!(
                        path = %request.url().path(),
                        method = %request.method(),
                        "Throttled request cancelled while waiting"
                    );
                    return Err(SendError::Cancelled);
                }
            }
        }

        self.forward(request).await
    }

    async fn forward(&self, request: Request) -> std::result::Result<Response, SendError<T::Error>> {
        self.delegate.send(request).await.map_err(SendError::Delegate)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl<T: Transport> Transport for ThrottlingTransport<T> {
    type Error = SendError<T::Error>;

    async fn send(&self, request: Request) -> std::result::Result<Response, Self::Error> {
        ThrottlingTransport::send(self, request).await
    }
}
