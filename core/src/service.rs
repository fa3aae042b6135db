//! Declarative service descriptions and their bound instances.
//!
//! A `ServiceDescription` lists endpoints: verb, path template with `{name}`
//! placeholders, declared return shape and optional fixed headers. Binding it
//! through the gateway resolves every endpoint's adaptation up front, so a
//! bad declaration fails at bind time rather than on first use.
//!
//! Typed services implement `ApiService` and wrap the `ServiceInstance`:
//!
//! ```no_run
//! use netgate_core::{ApiService, CallArgs, ConfigError, Endpoint, ResultCall, ReturnShape,
//!     ServiceDescription, ServiceInstance};
//! # #[derive(serde::Deserialize)] struct User;
//!
//! struct UserApi(ServiceInstance);
//!
//! impl ApiService for UserApi {
//!     fn description() -> ServiceDescription {
//!         ServiceDescription::new("users")
//!             .endpoint(Endpoint::get("get_user", "users/{id}", ReturnShape::outcome::<User>()))
//!     }
//!
//!     fn from_instance(instance: ServiceInstance) -> Self {
//!         UserApi(instance)
//!     }
//! }
//!
//! impl UserApi {
//!     fn get_user(&self, id: &str) -> Result<ResultCall<User>, ConfigError> {
//!         self.0.call("get_user", CallArgs::new().path("id", id))
//!     }
//! }
//! ```

use std::any::type_name;
use std::collections::HashMap;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderName, HeaderValue, Method};
use serde::Serialize;
use url::Url;

use crate::adapter::{self, Adaptation, CallAdapterFactory, ReturnShape};
use crate::call::{Call, ResultCall};
use crate::client::HttpClient;
use crate::error::ConfigError;
use crate::http::HttpRequest;

/// One declared HTTP operation.
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    method: Method,
    path: String,
    returns: ReturnShape,
    headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(
        method: Method,
        name: impl Into<String>,
        path: impl Into<String>,
        returns: ReturnShape,
    ) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            returns,
            headers: Vec::new(),
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>, returns: ReturnShape) -> Self {
        Self::new(Method::GET, name, path, returns)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>, returns: ReturnShape) -> Self {
        Self::new(Method::POST, name, path, returns)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>, returns: ReturnShape) -> Self {
        Self::new(Method::PUT, name, path, returns)
    }

    pub fn patch(name: impl Into<String>, path: impl Into<String>, returns: ReturnShape) -> Self {
        Self::new(Method::PATCH, name, path, returns)
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>, returns: ReturnShape) -> Self {
        Self::new(Method::DELETE, name, path, returns)
    }

    /// A header sent with every call of this endpoint.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn returns(&self) -> ReturnShape {
        self.returns
    }
}

/// A named set of endpoints.
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    name: String,
    endpoints: Vec<Endpoint>,
}

impl ServiceDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
        }
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Per-call parameter bindings.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    path: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for the `{name}` placeholder; percent-encoded on expansion.
    pub fn path(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path.push((name.into(), value.to_string()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ConfigError> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }
}

/// A typed service generated from its description.
pub trait ApiService: Sized {
    fn description() -> ServiceDescription;

    fn from_instance(instance: ServiceInstance) -> Self;
}

struct BoundEndpoint {
    endpoint: Endpoint,
    adaptation: Adaptation,
}

/// A service description bound to a client and base URL.
pub struct ServiceInstance {
    name: String,
    base_url: String,
    client: HttpClient,
    endpoints: HashMap<String, BoundEndpoint>,
}

impl ServiceInstance {
    pub(crate) fn bind(
        description: ServiceDescription,
        base_url: &str,
        client: HttpClient,
        factories: &[Box<dyn CallAdapterFactory>],
    ) -> Result<Self, ConfigError> {
        let ServiceDescription { name, endpoints } = description;
        let mut bound = HashMap::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let adaptation = adapter::resolve(factories, &endpoint.name, &endpoint.returns)?;
            if bound.contains_key(&endpoint.name) {
                return Err(ConfigError::DuplicateEndpoint {
                    service: name,
                    endpoint: endpoint.name,
                });
            }
            bound.insert(
                endpoint.name.clone(),
                BoundEndpoint {
                    endpoint,
                    adaptation,
                },
            );
        }
        Ok(Self {
            name,
            base_url: base_url.to_string(),
            client,
            endpoints: bound,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pending outcome for an endpoint declared as `ReturnShape::Outcome`.
    pub fn call<T>(&self, endpoint: &str, args: CallArgs) -> Result<ResultCall<T>, ConfigError> {
        let bound = self.lookup::<T>(endpoint, Adaptation::Outcome)?;
        let request = self.build_request(&bound.endpoint, args)?;
        Ok(ResultCall::adapt(Call::new(self.client.clone(), request)))
    }

    /// Plain pending call for an endpoint declared as `ReturnShape::Call`.
    pub fn raw_call<T>(&self, endpoint: &str, args: CallArgs) -> Result<Call<T>, ConfigError> {
        let bound = self.lookup::<T>(endpoint, Adaptation::PassThrough)?;
        let request = self.build_request(&bound.endpoint, args)?;
        Ok(Call::new(self.client.clone(), request))
    }

    fn lookup<T>(&self, endpoint: &str, requested: Adaptation) -> Result<&BoundEndpoint, ConfigError> {
        let bound = self
            .endpoints
            .get(endpoint)
            .ok_or_else(|| ConfigError::UnknownEndpoint {
                service: self.name.clone(),
                endpoint: endpoint.to_string(),
            })?;
        if bound.adaptation != requested {
            return Err(ConfigError::AdaptationMismatch {
                endpoint: endpoint.to_string(),
                actual: bound.adaptation.describe(),
                requested: requested.describe(),
            });
        }
        let declared = bound.endpoint.returns.payload();
        if declared != type_name::<T>() {
            return Err(ConfigError::PayloadMismatch {
                endpoint: endpoint.to_string(),
                declared,
                requested: type_name::<T>(),
            });
        }
        Ok(bound)
    }

    fn build_request(&self, endpoint: &Endpoint, args: CallArgs) -> Result<HttpRequest, ConfigError> {
        let path = expand_path(endpoint, &args.path)?;
        let raw = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
            url: raw.clone(),
            source,
        })?;
        if !args.query.is_empty() {
            url.query_pairs_mut().extend_pairs(args.query.iter());
        }

        let mut request = HttpRequest::new(endpoint.method.clone(), url);
        for (name, value) in endpoint.headers.iter().chain(args.headers.iter()) {
            let invalid = |source: http::Error| ConfigError::InvalidHeader {
                name: name.clone(),
                source,
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.into()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.into()))?;
            request.headers.append(header_name, header_value);
        }
        if let Some(body) = args.body {
            if !request.headers.contains_key(CONTENT_TYPE) {
                request
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            request.body = Some(body);
        }
        Ok(request)
    }
}

/// Substitute `{name}` placeholders with percent-encoded argument values.
fn expand_path(endpoint: &Endpoint, values: &[(String, String)]) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(endpoint.path.len());
    let mut rest = endpoint.path.as_str();
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + len];
        let value = values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .ok_or_else(|| ConfigError::MissingPathParameter {
                endpoint: endpoint.name.clone(),
                name: name.to_string(),
            })?;
        expanded.push_str(&rest[..open]);
        expanded.push_str(&urlencoding::encode(value));
        rest = &rest[open + len + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}
