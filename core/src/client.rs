//! Client factory: turns a `NetworkConfig` into a ready `HttpClient`.
//!
//! # Design
//! A request travels through two chains separated by the follow-up stage:
//!
//! ```text
//! logging? -> inspection? -> static parameters -> application hooks
//!     -> follow-ups -> (per attempt) transport hooks -> transport
//! ```
//!
//! Application hooks therefore run once per logical call, while transport
//! hooks run once per physical attempt, including every redirect hop. The
//! reqwest client never follows redirects itself so that each hop is visible
//! to the transport chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use futures::stream::{self, Stream};
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use tokio::sync::oneshot;
use tokio::time::error::Elapsed;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::{ConfigError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::inspect::{InspectionInterceptor, PlatformContext};
use crate::interceptor::{Interceptor, Next, Transport};
use crate::logging::HttpLoggingInterceptor;

/// Maximum number of redirects followed for one logical call.
pub const MAX_FOLLOW_UPS: usize = 20;

/// A configured HTTP client. Cloning is cheap and shares the chains.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    application: Vec<Arc<dyn Interceptor>>,
    follow_ups: FollowUps,
}

impl HttpClient {
    /// Build a client backed by reqwest.
    pub fn build(config: &NetworkConfig, context: &PlatformContext) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(config)?;
        Self::with_transport(config, context, Arc::new(transport))
    }

    /// Build a client on top of an arbitrary transport.
    pub fn with_transport(
        config: &NetworkConfig,
        context: &PlatformContext,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let mut application: Vec<Arc<dyn Interceptor>> = Vec::new();
        if config.logging_enabled() {
            application.push(Arc::new(HttpLoggingInterceptor::new(config.log_level())));
        }
        if config.inspection_enabled() {
            application.push(Arc::new(InspectionInterceptor::new(context)));
        }
        application.push(Arc::new(StaticParameters::from_config(config)?));
        application.extend(config.application_hooks().iter().cloned());

        let follow_ups = FollowUps {
            enabled: config.follow_redirects(),
            network: config.transport_hooks().to_vec(),
            transport,
        };

        debug!(
            app = context.app_name(),
            logging = config.logging_enabled(),
            inspection = config.inspection_enabled(),
            application_interceptors = application.len(),
            transport_interceptors = follow_ups.network.len(),
            "http client built"
        );
        Ok(Self {
            inner: Arc::new(ClientInner {
                application,
                follow_ups,
            }),
        })
    }

    /// Run one logical call through the whole chain.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Next::new(&self.inner.application, &self.inner.follow_ups)
            .proceed(request)
            .await
    }
}

/// Appends the configured static query parameters and headers to every
/// request, never replacing what is already there.
struct StaticParameters {
    headers: Vec<(HeaderName, HeaderValue)>,
    query: Vec<(String, String)>,
}

impl StaticParameters {
    fn from_config(config: &NetworkConfig) -> Result<Self, ConfigError> {
        let headers = config
            .headers()
            .iter()
            .map(|(name, value)| {
                let invalid = |source: http::Error| ConfigError::InvalidHeader {
                    name: name.clone(),
                    source,
                };
                let header_name =
                    HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.into()))?;
                let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.into()))?;
                Ok((header_name, header_value))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            headers,
            query: config.query_parameters().to_vec(),
        })
    }
}

#[async_trait]
impl Interceptor for StaticParameters {
    async fn intercept(
        &self,
        mut request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, TransportError> {
        if !self.query.is_empty() {
            request.url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        for (name, value) in &self.headers {
            request.headers.append(name.clone(), value.clone());
        }
        next.proceed(request).await
    }
}

/// Follows redirects, sending each attempt through the transport chain.
struct FollowUps {
    enabled: bool,
    network: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl Transport for FollowUps {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut request = request;
        let mut follow_ups = 0;
        loop {
            let response = Next::new(&self.network, self.transport.as_ref())
                .proceed(request.clone())
                .await?;
            if !self.enabled || !response.is_redirect() {
                return Ok(response);
            }
            let Some(next_request) = follow_up(&request, &response) else {
                return Ok(response);
            };
            follow_ups += 1;
            if follow_ups > MAX_FOLLOW_UPS {
                return Err(TransportError::TooManyFollowUps(follow_ups));
            }
            debug!(
                status = %response.status,
                from = %request.url,
                to = %next_request.url,
                follow_ups,
                "following redirect"
            );
            request = next_request;
        }
    }
}

/// The request that answers a redirect, or `None` when the redirect cannot be
/// followed (no usable `Location`).
fn follow_up(request: &HttpRequest, response: &HttpResponse) -> Option<HttpRequest> {
    let location = response.headers.get(LOCATION)?.to_str().ok()?;
    let url = request.url.join(location).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let mut next = request.clone();
    if !matches!(
        response.status,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
    ) {
        if next.method != Method::HEAD {
            next.method = Method::GET;
        }
        next.body = None;
        next.headers.remove(CONTENT_TYPE);
        next.headers.remove(CONTENT_LENGTH);
        next.headers.remove(TRANSFER_ENCODING);
    }
    if url.origin() != request.url.origin() {
        next.headers.remove(AUTHORIZATION);
    }
    next.url = url;
    Some(next)
}

/// Physical exchange over reqwest.
pub struct ReqwestTransport {
    client: reqwest::Client,
    write_timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(config: &NetworkConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = non_zero(config.connection_timeout()) {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = non_zero(config.read_timeout()) {
            builder = builder.read_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            write_timeout: non_zero(config.write_timeout()),
        })
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut outgoing = reqwest::Request::new(request.method, request.url);
        *outgoing.headers_mut() = request.headers;

        let mut upload = None;
        if let Some(body) = request.body {
            match self.write_timeout {
                Some(limit) => {
                    if !outgoing.headers().contains_key(CONTENT_LENGTH) {
                        outgoing
                            .headers_mut()
                            .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
                    }
                    let (stream, progress) = tracked_upload(body);
                    *outgoing.body_mut() = Some(reqwest::Body::wrap_stream(stream));
                    upload = Some(upload_deadline(limit, progress));
                }
                None => *outgoing.body_mut() = Some(reqwest::Body::from(body)),
            }
        }

        let pending = self.client.execute(outgoing);
        let response = match upload {
            Some(deadline) => {
                tokio::select! {
                    result = pending => result.map_err(TransportError::from_reqwest)?,
                    elapsed = deadline => return Err(TransportError::Timeout(Box::new(elapsed))),
                }
            }
            None => pending.await.map_err(TransportError::from_reqwest)?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Chunk size the request body is streamed in when a write timeout applies.
const UPLOAD_CHUNK: usize = 16 * 1024;

struct UploadProgress {
    started: oneshot::Receiver<()>,
    finished: oneshot::Receiver<()>,
}

/// Stream `body` in chunks, signalling when the first chunk is pulled and
/// when the last one is handed over.
fn tracked_upload(
    body: Bytes,
) -> (
    impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    UploadProgress,
) {
    let (started_tx, started) = oneshot::channel();
    let (finished_tx, finished) = oneshot::channel();
    let stream = stream::unfold(
        (body, Some(started_tx), Some(finished_tx)),
        |(mut rest, mut started, mut finished)| async move {
            if let Some(tx) = started.take() {
                let _ = tx.send(());
            }
            if rest.is_empty() {
                return None;
            }
            let chunk = rest.split_to(rest.len().min(UPLOAD_CHUNK));
            if rest.is_empty() {
                if let Some(tx) = finished.take() {
                    let _ = tx.send(());
                }
            }
            Some((Ok::<_, std::io::Error>(chunk), (rest, started, finished)))
        },
    );
    (stream, UploadProgress { started, finished })
}

/// Resolves with the elapsed error only if an upload that has begun is not
/// finished within `limit`. Otherwise it never resolves.
async fn upload_deadline(limit: Duration, progress: UploadProgress) -> Elapsed {
    // A dropped sender means the body was discarded or fully consumed.
    if progress.started.await.is_ok() {
        if let Err(elapsed) = tokio::time::timeout(limit, progress.finished).await {
            return elapsed;
        }
    }
    future::pending().await
}
