//! Asynchronous HTTP networking layer with normalised call outcomes.
//!
//! # Overview
//! A `NetworkConfig` describes the base URL, timeouts, static headers and
//! query parameters, logging and hooks. `NetworkInitializer` turns it into a
//! single `ApiGateway`, which binds declarative `ServiceDescription`s into
//! typed services. Every outcome endpoint returns a `ResultCall<T>` whose
//! completion is a `NetworkResult<T>`: `Success`, `Error` (the server
//! answered with a failure) or `Exception` (no usable response).
//!
//! # Design
//! - Transport is behind the `Transport` trait; `ReqwestTransport` is the
//!   production implementation and tests plug in scripted ones.
//! - Hooks implement `Interceptor`. Application hooks run once per logical
//!   call, transport hooks once per physical attempt (each redirect hop).
//! - Outcome normalisation lives in `outcome` and never fails: transport
//!   errors are carried verbatim inside `Exception`.
//! - Configuration mistakes are `ConfigError`s, returned where the mistake is
//!   made, never folded into an outcome.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod adapter;
pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod initializer;
pub mod inspect;
pub mod interceptor;
pub mod logging;
pub mod outcome;
pub mod service;

pub use adapter::{
    Adaptation, CallAdapterFactory, DefaultCallAdapterFactory, NetworkResultCallAdapterFactory,
    ReturnShape,
};
pub use call::{Call, Response, ResultCall};
pub use client::{HttpClient, ReqwestTransport, MAX_FOLLOW_UPS};
pub use config::{LogLevel, NetworkConfig, NetworkConfigBuilder};
pub use error::{CallError, ConfigError, TransportError};
pub use gateway::ApiGateway;
pub use http::{HttpRequest, HttpResponse};
pub use initializer::NetworkInitializer;
pub use inspect::{PlatformContext, Transaction, TransactionStore};
pub use interceptor::{hook_fn, Interceptor, Next, Transport};
pub use logging::HttpLoggingInterceptor;
pub use outcome::{ErrorResponse, NetworkResult, UNKNOWN_ERROR};
pub use service::{ApiService, CallArgs, Endpoint, ServiceDescription, ServiceInstance};

pub use ::http::{Method, StatusCode};
pub use url::Url;
