//! Service gateway: binds service descriptions to a configured client.

use tracing::debug;
use url::Url;

use crate::adapter::{CallAdapterFactory, DefaultCallAdapterFactory, NetworkResultCallAdapterFactory};
use crate::client::HttpClient;
use crate::config::NetworkConfig;
use crate::error::ConfigError;
use crate::inspect::PlatformContext;
use crate::service::{ApiService, ServiceDescription, ServiceInstance};

/// Produces typed services that share one client, base URL and adapter
/// registry.
pub struct ApiGateway {
    base_url: String,
    client: HttpClient,
    adapters: Vec<Box<dyn CallAdapterFactory>>,
}

impl ApiGateway {
    /// Validate the base URL and build the client from `config`.
    pub fn initialize(config: &NetworkConfig, context: &PlatformContext) -> Result<Self, ConfigError> {
        validate_base_url(config.base_url())?;
        let client = HttpClient::build(config, context)?;
        debug!(base_url = config.base_url(), app = context.app_name(), "gateway initialized");
        Ok(Self::with_client(config.base_url(), client))
    }

    /// Assemble a gateway around an already built client.
    pub fn with_client(base_url: impl Into<String>, client: HttpClient) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            adapters: vec![
                Box::new(NetworkResultCallAdapterFactory),
                Box::new(DefaultCallAdapterFactory),
            ],
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn create_service<S: ApiService>(&self) -> Result<S, ConfigError> {
        self.bind(S::description()).map(S::from_instance)
    }

    pub fn bind(&self, description: ServiceDescription) -> Result<ServiceInstance, ConfigError> {
        let service = description.name().to_string();
        let endpoints = description.endpoints().len();
        let instance = ServiceInstance::bind(description, &self.base_url, self.client.clone(), &self.adapters)?;
        debug!(service, endpoints, "service bound");
        Ok(instance)
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    if base_url.trim().is_empty() {
        return Err(ConfigError::MissingBaseUrl);
    }
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };
    let url = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ReturnShape;
    use crate::service::{CallArgs, Endpoint};

    struct Ping(ServiceInstance);

    impl ApiService for Ping {
        fn description() -> ServiceDescription {
            ServiceDescription::new("ping")
                .endpoint(Endpoint::get("ping", "ping", ReturnShape::outcome::<String>()))
        }

        fn from_instance(instance: ServiceInstance) -> Self {
            Ping(instance)
        }
    }

    fn context() -> PlatformContext {
        PlatformContext::new("gateway-test")
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let config = NetworkConfig::builder("  ").build();
        assert!(matches!(
            ApiGateway::initialize(&config, &context()),
            Err(ConfigError::MissingBaseUrl)
        ));
    }

    #[test]
    fn unusable_base_url_is_rejected() {
        for url in [
            "api/v1",
            "ftp://files.test/",
            "https://api.test/?k=v",
            "https://api.test/v1#top",
        ] {
            let config = NetworkConfig::builder(url).build();
            assert!(
                matches!(
                    ApiGateway::initialize(&config, &context()),
                    Err(ConfigError::InvalidBaseUrl { .. })
                ),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn services_use_the_gateway_base_url() {
        let config = NetworkConfig::builder("https://api.test/v2/").build();
        let gateway = ApiGateway::initialize(&config, &context()).unwrap();
        assert_eq!(gateway.base_url(), "https://api.test/v2/");

        let Ping(instance) = gateway.create_service::<Ping>().unwrap();
        assert_eq!(instance.name(), "ping");
        let call = instance.call::<String>("ping", CallArgs::new()).unwrap();
        assert_eq!(call.request().url.as_str(), "https://api.test/v2/ping");
    }

    #[test]
    fn bare_shape_fails_service_creation() {
        let config = NetworkConfig::builder("https://api.test/").build();
        let gateway = ApiGateway::initialize(&config, &context()).unwrap();
        let description = ServiceDescription::new("bad")
            .endpoint(Endpoint::get("total", "total", ReturnShape::bare::<u64>()));
        assert!(matches!(
            gateway.bind(description),
            Err(ConfigError::UnsupportedReturnShape { .. })
        ));
    }
}
