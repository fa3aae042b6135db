//! Diagnostic logging of HTTP traffic through `tracing`.

use std::time::Instant;

use async_trait::async_trait;
use http::HeaderMap;
use tracing::{info, warn};

use crate::config::LogLevel;
use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::interceptor::{Interceptor, Next};

/// Bodies larger than this are summarised instead of printed.
const MAX_LOGGED_BODY: usize = 64 * 1024;

/// Writes one line per request and per response at the configured level.
#[derive(Debug, Clone)]
pub struct HttpLoggingInterceptor {
    level: LogLevel,
}

impl HttpLoggingInterceptor {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn log_headers(&self, direction: &str, headers: &HeaderMap) {
        if self.level < LogLevel::Headers {
            return;
        }
        for (name, value) in headers {
            info!(
                direction,
                header = %name,
                value = value.to_str().unwrap_or("<binary>"),
                "http header"
            );
        }
    }

    fn log_body(&self, direction: &str, body: Option<&[u8]>) {
        if self.level < LogLevel::Body {
            return;
        }
        match body {
            None | Some([]) => {}
            Some(bytes) if bytes.len() > MAX_LOGGED_BODY => {
                info!(direction, size = bytes.len(), "http body omitted (too large)");
            }
            Some(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => info!(direction, body = text, "http body"),
                Err(_) => info!(direction, size = bytes.len(), "http body omitted (binary)"),
            },
        }
    }
}

#[async_trait]
impl Interceptor for HttpLoggingInterceptor {
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, TransportError> {
        if self.level == LogLevel::None {
            return next.proceed(request).await;
        }

        let method = request.method.clone();
        let url = request.url.clone();
        info!(
            %method,
            %url,
            body_size = request.body.as_ref().map_or(0, |b| b.len()),
            "--> request"
        );
        self.log_headers("request", &request.headers);
        self.log_body("request", request.body.as_deref());

        let started = Instant::now();
        let result = next.proceed(request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => {
                info!(
                    status = %response.status,
                    %url,
                    elapsed_ms,
                    body_size = response.body.len(),
                    "<-- response"
                );
                self.log_headers("response", &response.headers);
                self.log_body("response", Some(response.body.as_ref()));
            }
            Err(err) => warn!(%method, %url, elapsed_ms, error = %err, "<-- HTTP FAILED"),
        }
        result
    }
}
