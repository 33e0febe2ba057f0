//! Transport trait for abstracting the component that actually sends requests.

use async_trait::async_trait;
use reqwest::{Request, Response};
use std::sync::Arc;

/// Trait for anything that can send an HTTP request.
///
/// The throttler wraps one of these and implements it in turn, so it can be
/// used wherever the wrapped transport was.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Error produced by a failed send.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a request and return its response.
    async fn send(&self, request: Request) -> Result<Response, Self::Error>;
}

#[async_trait]
impl Transport for reqwest::Client {
    type Error = reqwest::Error;

    async fn send(&self, request: Request) -> Result<Response, Self::Error> {
        self.execute(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    type Error = T::Error;

    async fn send(&self, request: Request) -> Result<Response, Self::Error> {
        (**self).send(request).await
    }
}
