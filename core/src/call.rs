//! Pending calls.
//!
//! `Call<T>` is a plain pending call: it resolves to a decoded `Response<T>`
//! or a `CallError`. `ResultCall<T>` is the adapted form returned by outcome
//! endpoints: it proxies a `Call<T>` and folds every completion or transport
//! failure into a `NetworkResult<T>`.
//!
//! A call executes at most once. Cancelling aborts the in-flight exchange and
//! suppresses any outcome, even one that was already on its way.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::HttpClient;
use crate::error::{CallError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::outcome::NetworkResult;

/// A decoded HTTP response.
///
/// `body` is only set for 2xx responses with content; `error_body` only for
/// non-2xx responses with content.
#[derive(Debug)]
pub struct Response<T> {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<T>,
    error_body: Option<Bytes>,
}

impl<T> Response<T> {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Option<T>,
        error_body: Option<Bytes>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            error_body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    pub fn error_body(&self) -> Option<&Bytes> {
        self.error_body.as_ref()
    }

    pub fn into_parts(self) -> (Option<T>, Option<Bytes>) {
        (self.body, self.error_body)
    }
}

impl<T: DeserializeOwned> Response<T> {
    /// Decode a raw response with the JSON codec. A 2xx body that is present
    /// but does not decode is a transport-level serialization failure.
    pub fn decode(raw: HttpResponse) -> Result<Self, TransportError> {
        let HttpResponse {
            status,
            headers,
            body,
        } = raw;
        if !status.is_success() {
            let error_body = has_content(&body).then_some(body);
            return Ok(Self::new(status, headers, None, error_body));
        }

        let decoded = if status == StatusCode::NO_CONTENT
            || status == StatusCode::RESET_CONTENT
            || !has_content(&body)
        {
            None
        } else {
            serde_json::from_slice::<Option<T>>(&body)?
        };
        Ok(Self::new(status, headers, decoded, None))
    }
}

fn has_content(body: &[u8]) -> bool {
    !body.iter().all(u8::is_ascii_whitespace)
}

struct CallState {
    executed: AtomicBool,
    canceled: AtomicBool,
    abort: AbortHandle,
    registration: Mutex<Option<AbortRegistration>>,
}

impl CallState {
    fn new() -> Arc<Self> {
        let (abort, registration) = AbortHandle::new_pair();
        Arc::new(Self {
            executed: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            abort,
            registration: Mutex::new(Some(registration)),
        })
    }

    fn begin(&self) -> Result<AbortRegistration, CallError> {
        let registration = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CallError::AlreadyExecuted)?;
        self.executed.store(true, Ordering::SeqCst);
        if self.canceled.load(Ordering::SeqCst) {
            return Err(CallError::Canceled);
        }
        Ok(registration)
    }
}

/// A plain pending call.
pub struct Call<T> {
    client: HttpClient,
    request: HttpRequest,
    state: Arc<CallState>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Call<T> {
    pub fn new(client: HttpClient, request: HttpRequest) -> Self {
        Self {
            client,
            request,
            state: CallState::new(),
            _payload: PhantomData,
        }
    }

    /// The request this call will send, as built from the endpoint.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn is_executed(&self) -> bool {
        self.state.executed.load(Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::SeqCst);
        self.state.abort.abort();
    }

    /// A new, unexecuted call for the same request.
    pub fn duplicate(&self) -> Self {
        Self::new(self.client.clone(), self.request.clone())
    }

    /// Another handle on this same call, sharing its lifecycle.
    fn share(&self) -> Self {
        Self {
            client: self.client.clone(),
            request: self.request.clone(),
            state: self.state.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Call<T> {
    pub async fn send(&self) -> Result<Response<T>, CallError> {
        let registration = self.state.begin()?;
        let exchange = Abortable::new(self.client.execute(self.request.clone()), registration);
        let raw = match exchange.await {
            Ok(result) => result?,
            Err(_aborted) => return Err(CallError::Canceled),
        };
        if self.is_canceled() {
            return Err(CallError::Canceled);
        }
        Ok(Response::decode(raw)?)
    }
}

/// A pending call whose completion is a `NetworkResult`.
pub struct ResultCall<T> {
    call: Call<T>,
}

impl<T> ResultCall<T> {
    pub fn adapt(call: Call<T>) -> Self {
        Self { call }
    }

    pub fn request(&self) -> &HttpRequest {
        self.call.request()
    }

    pub fn is_executed(&self) -> bool {
        self.call.is_executed()
    }

    pub fn is_canceled(&self) -> bool {
        self.call.is_canceled()
    }

    pub fn cancel(&self) {
        self.call.cancel();
    }

    pub fn duplicate(&self) -> Self {
        Self::adapt(self.call.duplicate())
    }

    /// Adapted calls only complete asynchronously.
    pub fn execute(&self) -> Result<NetworkResult<T>, CallError> {
        Err(CallError::NotImplemented(
            "synchronous execution; use outcome() or enqueue()",
        ))
    }

    fn share(&self) -> Self {
        Self::adapt(self.call.share())
    }
}

impl<T: DeserializeOwned> ResultCall<T> {
    /// Run the call and normalise its result.
    ///
    /// Only lifecycle errors (`AlreadyExecuted`, `Canceled`) are returned as
    /// `Err`; every transport failure becomes `NetworkResult::Exception`.
    pub async fn outcome(&self) -> Result<NetworkResult<T>, CallError> {
        let result = self.call.send().await;
        if self.call.is_canceled() {
            return Err(CallError::Canceled);
        }
        match result {
            Ok(response) => Ok(NetworkResult::from_response(response)),
            Err(CallError::Transport(cause)) => Ok(NetworkResult::from_failure(cause)),
            Err(err) => Err(err),
        }
    }

    /// Run the call on the current tokio runtime and hand the outcome to
    /// `callback`. The callback never runs for a cancelled call.
    ///
    /// Outside a runtime nothing is started and `CallError::NoRuntime` is
    /// returned.
    pub fn enqueue<F>(&self, callback: F) -> Result<JoinHandle<()>, CallError>
    where
        F: FnOnce(NetworkResult<T>) + Send + 'static,
        T: Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| CallError::NoRuntime)?;
        let call = self.share();
        Ok(runtime.spawn(async move {
            match call.outcome().await {
                Ok(outcome) => callback(outcome),
                Err(err) => debug!(url = %call.request().url, error = %err, "call finished without an outcome"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::error::BoxError;
    use crate::inspect::PlatformContext;
    use crate::interceptor::Transport;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
    }

    struct Fixed(HttpResponse, AtomicUsize);

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0.clone())
        }
    }

    fn client(transport: Arc<dyn Transport>) -> HttpClient {
        let config = NetworkConfig::builder("http://api.test/").build();
        HttpClient::with_transport(&config, &PlatformContext::new("call-test"), transport).unwrap()
    }

    fn fixed(status: u16, body: &'static str) -> Arc<Fixed> {
        Arc::new(Fixed(
            HttpResponse::new(StatusCode::from_u16(status).unwrap(), body),
            AtomicUsize::new(0),
        ))
    }

    fn result_call<T>(transport: Arc<dyn Transport>) -> ResultCall<T> {
        let request = HttpRequest::get(Url::parse("http://api.test/users/1").unwrap());
        ResultCall::adapt(Call::new(client(transport), request))
    }

    fn box_address(source: &BoxError) -> usize {
        &**source as *const (dyn std::error::Error + Send + Sync) as *const () as usize
    }

    #[test]
    fn decode_treats_blank_and_null_bodies_as_absent() {
        for (status, body) in [(200, ""), (200, "  \n"), (200, "null"), (204, "")] {
            let raw = HttpResponse::new(StatusCode::from_u16(status).unwrap(), body);
            let decoded = Response::<User>::decode(raw).unwrap();
            assert!(decoded.body().is_none(), "{status} {body:?}");
            assert!(decoded.error_body().is_none());
        }
    }

    #[test]
    fn decode_keeps_error_body_raw() {
        let raw = HttpResponse::new(StatusCode::BAD_REQUEST, "oops");
        let decoded = Response::<User>::decode(raw).unwrap();
        assert!(decoded.body().is_none());
        assert_eq!(decoded.error_body().unwrap().as_ref(), b"oops");
    }

    #[test]
    fn decode_rejects_malformed_success_body() {
        let raw = HttpResponse::new(StatusCode::OK, "not json");
        let err = Response::<User>::decode(raw).unwrap_err();
        assert!(matches!(err, TransportError::Serialization(_)));
    }

    #[tokio::test]
    async fn success_outcome() {
        let call = result_call::<User>(fixed(200, r#"{"name":"Ada"}"#));
        let outcome = call.outcome().await.unwrap();
        assert_eq!(
            outcome.success(),
            Some(User {
                name: "Ada".to_string()
            })
        );
        assert!(call.is_executed());
    }

    #[tokio::test]
    async fn malformed_success_body_is_an_exception() {
        let call = result_call::<User>(fixed(200, "not json"));
        let outcome = call.outcome().await.unwrap();
        assert!(matches!(
            outcome,
            NetworkResult::Exception {
                code: None,
                cause: TransportError::Serialization(_)
            }
        ));
    }

    #[tokio::test]
    async fn call_runs_only_once() {
        let transport = fixed(200, r#"{"name":"Ada"}"#);
        let call = result_call::<User>(transport.clone());
        call.outcome().await.unwrap();
        assert!(matches!(call.outcome().await, Err(CallError::AlreadyExecuted)));

        let again = call.duplicate();
        assert!(!again.is_executed());
        assert!(again.outcome().await.unwrap().is_success());
        assert_eq!(transport.1.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn synchronous_execution_is_rejected() {
        let call = result_call::<User>(fixed(200, "{}"));
        assert!(matches!(call.execute(), Err(CallError::NotImplemented(_))));
        assert!(!call.is_executed());
    }

    struct Refused {
        address: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl Transport for Refused {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let source: BoxError = Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
            *self.address.lock().unwrap() = Some(box_address(&source));
            Err(TransportError::Connect(source))
        }
    }

    #[tokio::test]
    async fn transport_failure_is_carried_verbatim() {
        let transport = Arc::new(Refused {
            address: Mutex::new(None),
        });
        let call = result_call::<User>(transport.clone());

        let outcome = call.outcome().await.unwrap();
        let NetworkResult::Exception {
            code: None,
            cause: TransportError::Connect(source),
        } = outcome
        else {
            panic!("expected a connect exception");
        };
        assert_eq!(Some(box_address(&source)), *transport.address.lock().unwrap());
        assert_eq!(source.to_string(), "connection refused");
    }

    /// Never answers; records when it starts and when its exchange is dropped.
    struct Hanging {
        started: AtomicBool,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for Hanging {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let _flag = DropFlag(self.dropped.clone());
            self.started.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(HttpResponse::new(StatusCode::OK, "{}"))
        }
    }

    fn hanging() -> Arc<Hanging> {
        Arc::new(Hanging {
            started: AtomicBool::new(false),
            dropped: Arc::new(AtomicBool::new(false)),
        })
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_exchange() {
        let transport = hanging();
        let call = result_call::<User>(transport.clone());

        let (result, ()) = tokio::join!(call.outcome(), async {
            while !transport.started.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            call.cancel();
        });

        assert!(matches!(result, Err(CallError::Canceled)));
        assert!(call.is_canceled());
        assert!(transport.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_before_execution_yields_no_outcome() {
        let transport = fixed(200, r#"{"name":"Ada"}"#);
        let call = result_call::<User>(transport.clone());
        call.cancel();
        assert!(matches!(call.outcome().await, Err(CallError::Canceled)));
        assert_eq!(transport.1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enqueue_delivers_outcome() {
        let call = result_call::<User>(fixed(404, ""));
        let (tx, rx) = tokio::sync::oneshot::channel();
        call.enqueue(move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap()
        .await
        .unwrap();

        match rx.await.unwrap() {
            NetworkResult::Error { code, message } => {
                assert_eq!(code, "404");
                assert_eq!(message.as_deref(), Some("Unknown error"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enqueue_skips_callback_after_cancel() {
        let transport = hanging();
        let call = result_call::<User>(transport.clone());
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        let task = call.enqueue(move |_| flag.store(true, Ordering::SeqCst)).unwrap();
        while !transport.started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        call.cancel();
        task.await.unwrap();

        assert!(!fired.load(Ordering::SeqCst));
        assert!(transport.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn enqueue_outside_a_runtime_is_rejected() {
        let call = result_call::<User>(fixed(200, r#"{"name":"Ada"}"#));
        let result = call.enqueue(|_| panic!("callback must not run"));
        assert!(matches!(result, Err(CallError::NoRuntime)));
        assert!(!call.is_executed());
    }
}
