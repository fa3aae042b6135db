//! In-process traffic inspection.
//!
//! `InspectionInterceptor` records every exchange into the `TransactionStore`
//! owned by the host's `PlatformContext`, where a debug screen or a test can
//! read it back. Recording never changes the exchange itself.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::interceptor::{Interceptor, Next};

pub const DEFAULT_TRANSACTION_CAPACITY: usize = 100;

/// One recorded exchange.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub started_at: SystemTime,
    pub duration: Duration,
    pub method: Method,
    pub url: Url,
    pub request_headers: HeaderMap,
    pub request_body_size: usize,
    pub status: Option<StatusCode>,
    pub response_headers: HeaderMap,
    pub response_body_size: usize,
    pub error: Option<String>,
}

/// Bounded, shared log of recent transactions. Oldest entries are evicted
/// first.
#[derive(Debug, Clone)]
pub struct TransactionStore {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<Transaction>>>,
}

impl TransactionStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn record(&self, transaction: Transaction) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(transaction);
    }

    /// Recorded transactions, oldest first.
    pub fn snapshot(&self) -> Vec<Transaction> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRANSACTION_CAPACITY)
    }
}

/// Host environment handed to the client factory.
#[derive(Debug, Clone)]
pub struct PlatformContext {
    app_name: String,
    transactions: TransactionStore,
}

impl PlatformContext {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            transactions: TransactionStore::default(),
        }
    }

    pub fn with_transactions(mut self, store: TransactionStore) -> Self {
        self.transactions = store;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn transactions(&self) -> &TransactionStore {
        &self.transactions
    }
}

impl Default for PlatformContext {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

#[derive(Debug, Clone)]
pub struct InspectionInterceptor {
    store: TransactionStore,
}

impl InspectionInterceptor {
    pub fn new(context: &PlatformContext) -> Self {
        Self {
            store: context.transactions().clone(),
        }
    }
}

#[async_trait]
impl Interceptor for InspectionInterceptor {
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, TransportError> {
        let started_at = SystemTime::now();
        let clock = Instant::now();
        let method = request.method.clone();
        let url = request.url.clone();
        let request_headers = request.headers.clone();
        let request_body_size = request.body.as_ref().map_or(0, |b| b.len());

        let result = next.proceed(request).await;

        let (status, response_headers, response_body_size, error) = match &result {
            Ok(response) => (
                Some(response.status),
                response.headers.clone(),
                response.body.len(),
                None,
            ),
            Err(err) => (None, HeaderMap::new(), 0, Some(err.to_string())),
        };
        self.store.record(Transaction {
            started_at,
            duration: clock.elapsed(),
            method,
            url,
            request_headers,
            request_body_size,
            status,
            response_headers,
            response_body_size,
            error,
        });
        result
    }
}
