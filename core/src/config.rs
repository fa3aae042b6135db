//! Client configuration and its builder.
//!
//! # Design
//! `NetworkConfig` is immutable once built. `NetworkConfigBuilder` is the only
//! mutator, and `build` snapshots its current state, so changing the builder
//! afterwards never reaches a config (or a client) that was already built.
//! Hooks are held behind `Arc`, which keeps the snapshot cheap.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::interceptor::Interceptor;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(70);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(70);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(120);

/// How much of each exchange the logging interceptor writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    None,
    /// Request line, response status, elapsed time and body size.
    #[default]
    Basic,
    /// `Basic` plus request and response headers.
    Headers,
    /// `Headers` plus request and response bodies.
    Body,
}

/// Immutable description of how to build the HTTP client.
#[derive(Clone)]
pub struct NetworkConfig {
    base_url: String,
    connection_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    logging_enabled: bool,
    inspection_enabled: bool,
    log_level: LogLevel,
    follow_redirects: bool,
    headers: Vec<(String, String)>,
    query_parameters: Vec<(String, String)>,
    application_hooks: Vec<Arc<dyn Interceptor>>,
    transport_hooks: Vec<Arc<dyn Interceptor>>,
}

impl NetworkConfig {
    pub fn builder(base_url: impl Into<String>) -> NetworkConfigBuilder {
        NetworkConfigBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    /// Whether exchanges are recorded into the platform context. Logging
    /// implies inspection.
    pub fn inspection_enabled(&self) -> bool {
        self.logging_enabled || self.inspection_enabled
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    /// Static headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Static query parameters in insertion order.
    pub fn query_parameters(&self) -> &[(String, String)] {
        &self.query_parameters
    }

    pub fn application_hooks(&self) -> &[Arc<dyn Interceptor>] {
        &self.application_hooks
    }

    pub fn transport_hooks(&self) -> &[Arc<dyn Interceptor>] {
        &self.transport_hooks
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("base_url", &self.base_url)
            .field("connection_timeout", &self.connection_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("logging_enabled", &self.logging_enabled)
            .field("inspection_enabled", &self.inspection_enabled)
            .field("log_level", &self.log_level)
            .field("follow_redirects", &self.follow_redirects)
            .field("headers", &self.headers)
            .field("query_parameters", &self.query_parameters)
            .field("application_hooks", &self.application_hooks.len())
            .field("transport_hooks", &self.transport_hooks.len())
            .finish()
    }
}

/// Staging area for a `NetworkConfig`. Every setter is chainable.
pub struct NetworkConfigBuilder {
    base_url: String,
    connection_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    logging_enabled: bool,
    inspection_enabled: bool,
    log_level: LogLevel,
    follow_redirects: bool,
    headers: Vec<(String, String)>,
    query_parameters: Vec<(String, String)>,
    application_hooks: Vec<Arc<dyn Interceptor>>,
    transport_hooks: Vec<Arc<dyn Interceptor>>,
}

impl NetworkConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            logging_enabled: false,
            inspection_enabled: false,
            log_level: LogLevel::default(),
            follow_redirects: true,
            headers: Vec::new(),
            query_parameters: Vec::new(),
            application_hooks: Vec::new(),
            transport_hooks: Vec::new(),
        }
    }

    /// A zero duration disables the timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Attach the logging and inspection interceptors to the client.
    pub fn enable_logging(mut self, enable: bool) -> Self {
        self.logging_enabled = enable;
        self
    }

    /// Attach only the inspection interceptor.
    pub fn enable_inspection(mut self, enable: bool) -> Self {
        self.inspection_enabled = enable;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Add a header sent with every request. A repeated key overwrites the
    /// earlier value in place.
    pub fn add_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.headers, key.into(), value.into());
        self
    }

    /// Add a query parameter appended to every request. A repeated key
    /// overwrites the earlier value in place.
    pub fn add_query_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.query_parameters, key.into(), value.into());
        self
    }

    /// Add a hook that runs once per logical call.
    pub fn add_application_hook(mut self, hook: impl Interceptor + 'static) -> Self {
        self.application_hooks.push(Arc::new(hook));
        self
    }

    /// Add a hook that runs once per physical attempt, including each
    /// redirect hop.
    pub fn add_transport_hook(mut self, hook: impl Interceptor + 'static) -> Self {
        self.transport_hooks.push(Arc::new(hook));
        self
    }

    pub fn build(&self) -> NetworkConfig {
        tracing::debug!(base_url = %self.base_url, "network config built");
        NetworkConfig {
            base_url: self.base_url.clone(),
            connection_timeout: self.connection_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            logging_enabled: self.logging_enabled,
            inspection_enabled: self.inspection_enabled,
            log_level: self.log_level,
            follow_redirects: self.follow_redirects,
            headers: self.headers.clone(),
            query_parameters: self.query_parameters.clone(),
            application_hooks: self.application_hooks.clone(),
            transport_hooks: self.transport_hooks.clone(),
        }
    }
}

fn upsert(entries: &mut Vec<(String, String)>, key: String, value: String) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::hook_fn;

    #[test]
    fn defaults_when_unset() {
        let config = NetworkConfig::builder("https://api.example.com/").build();
        assert_eq!(config.base_url(), "https://api.example.com/");
        assert_eq!(config.connection_timeout(), Duration::from_secs(70));
        assert_eq!(config.read_timeout(), Duration::from_secs(70));
        assert_eq!(config.write_timeout(), Duration::from_secs(120));
        assert!(!config.logging_enabled());
        assert!(!config.inspection_enabled());
        assert_eq!(config.log_level(), LogLevel::Basic);
        assert!(config.follow_redirects());
        assert!(config.headers().is_empty());
        assert!(config.query_parameters().is_empty());
        assert!(config.application_hooks().is_empty());
        assert!(config.transport_hooks().is_empty());
    }

    #[test]
    fn inspection_switch_is_independent_of_logging() {
        let builder = NetworkConfig::builder("https://api.example.com/");
        let inspect_only = builder.enable_inspection(true).build();
        assert!(inspect_only.inspection_enabled());
        assert!(!inspect_only.logging_enabled());

        let logged = NetworkConfig::builder("https://api.example.com/")
            .enable_logging(true)
            .enable_inspection(false)
            .build();
        assert!(logged.inspection_enabled());
    }

    #[test]
    fn setters_are_reflected() {
        let config = NetworkConfig::builder("https://api.example.com/")
            .connection_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(6))
            .write_timeout(Duration::from_secs(7))
            .enable_logging(true)
            .log_level(LogLevel::Body)
            .follow_redirects(false)
            .add_header("X-Api-Key", "secret")
            .add_query_parameter("lang", "en")
            .add_application_hook(hook_fn(|req| req))
            .add_transport_hook(hook_fn(|req| req))
            .add_transport_hook(hook_fn(|req| req))
            .build();

        assert_eq!(config.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(6));
        assert_eq!(config.write_timeout(), Duration::from_secs(7));
        assert!(config.logging_enabled());
        assert_eq!(config.log_level(), LogLevel::Body);
        assert!(!config.follow_redirects());
        assert_eq!(
            config.headers(),
            &[("X-Api-Key".to_string(), "secret".to_string())]
        );
        assert_eq!(
            config.query_parameters(),
            &[("lang".to_string(), "en".to_string())]
        );
        assert_eq!(config.application_hooks().len(), 1);
        assert_eq!(config.transport_hooks().len(), 2);
    }

    #[test]
    fn duplicate_keys_keep_position_and_last_value() {
        let config = NetworkConfig::builder("https://api.example.com/")
            .add_header("a", "1")
            .add_header("b", "2")
            .add_header("a", "3")
            .build();
        assert_eq!(
            config.headers(),
            &[
                ("a".to_string(), "3".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn built_config_is_a_snapshot() {
        let builder = NetworkConfig::builder("https://api.example.com/").add_header("a", "1");
        let first = builder.build();
        let builder = builder
            .add_header("b", "2")
            .add_application_hook(hook_fn(|req| req));
        let second = builder.build();

        assert_eq!(first.headers().len(), 1);
        assert!(first.application_hooks().is_empty());
        assert_eq!(second.headers().len(), 2);
        assert_eq!(second.application_hooks().len(), 1);
    }
}
