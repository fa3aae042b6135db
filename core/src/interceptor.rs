//! Request hooks and the chain that runs them.
//!
//! An `Interceptor` receives the request and a `Next` handle for the rest of
//! the chain. It may rewrite the request, short-circuit with its own response
//! or error, or inspect the response on the way back. The last link of every
//! chain is a `Transport`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// A hook in the request chain.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, TransportError>;
}

/// Performs the physical exchange at the bottom of a chain.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// The remainder of an interceptor chain.
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn new(interceptors: &'a [Arc<dyn Interceptor>], transport: &'a dyn Transport) -> Self {
        Self {
            interceptors,
            transport,
        }
    }

    /// Hand the request to the next interceptor, or to the transport once the
    /// chain is exhausted.
    pub async fn proceed(self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        match self.interceptors.split_first() {
            Some((head, rest)) => {
                head.intercept(request, Next::new(rest, self.transport))
                    .await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Interceptor that only transforms the outgoing request.
pub struct FnHook<F> {
    transform: F,
}

/// Build an interceptor from a request-transform function.
pub fn hook_fn<F>(transform: F) -> FnHook<F>
where
    F: Fn(HttpRequest) -> HttpRequest + Send + Sync,
{
    FnHook { transform }
}

#[async_trait]
impl<F> Interceptor for FnHook<F>
where
    F: Fn(HttpRequest) -> HttpRequest + Send + Sync,
{
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, TransportError> {
        next.proceed((self.transform)(request)).await
    }
}
