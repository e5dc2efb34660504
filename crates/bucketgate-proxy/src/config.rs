//! Configuration for the bucketgate proxy.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use bucketgate_authz::ResourceAuthorizationConfig;
use bucketgate_telemetry::TelemetryConfig;
use http::Method;
use serde::Deserialize;

use crate::error::{ProxyError, ProxyResult};

/// Gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Logging, tracing and metrics.
    pub telemetry: TelemetryConfig,
    /// Where the caller's identity comes from.
    pub identity: IdentitySettings,
    /// Buckets exposed by the gateway.
    #[serde(rename = "target")]
    pub targets: Vec<TargetConfig>,
}

impl GateConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::default()
    }

    /// Load configuration from a TOML or JSON file.
    pub fn from_file(path: impl Into<PathBuf>) -> ProxyResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ProxyError::config(format!("failed to read {}: {e}", path.display()))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| ProxyError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| ProxyError::config(format!("invalid JSON: {e}"))),
            _ => Err(ProxyError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply `BUCKETGATE_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    #[must_use]
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = var("BUCKETGATE_LISTEN_PORT").and_then(|v| v.parse().ok()) {
            self.server.listen_port = port;
        }
        if let Some(addr) = var("BUCKETGATE_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(timeout) =
            var("BUCKETGATE_REQUEST_TIMEOUT").and_then(|v| humantime_serde::parse_duration(&v).ok())
        {
            self.server.request_timeout = timeout;
        }
        if let Some(level) = var("BUCKETGATE_LOG_LEVEL") {
            self.telemetry.logging.level = level;
        }
        if let Some(endpoint) = var("BUCKETGATE_OTLP_ENDPOINT") {
            self.telemetry.tracing.enabled = true;
            self.telemetry.tracing.otlp_endpoint = endpoint;
        }
        if let Some(addr) = var("BUCKETGATE_METRICS_ADDR") {
            self.telemetry.metrics.enabled = true;
            self.telemetry.metrics.addr = addr;
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.server.request_timeout.is_zero() {
            return Err(ProxyError::config("request_timeout must be positive"));
        }
        if self.server.max_request_body_size == 0 {
            return Err(ProxyError::config("max_request_body_size must be positive"));
        }
        if http::HeaderName::from_bytes(self.identity.principal_header.as_bytes()).is_err() {
            return Err(ProxyError::config(format!(
                "invalid principal_header: {}",
                self.identity.principal_header
            )));
        }
        if self.targets.is_empty() {
            return Err(ProxyError::config("at least one [[target]] is required"));
        }

        let mut names = HashSet::new();
        let mut mounts = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !names.insert(target.name.as_str()) {
                return Err(ProxyError::config(format!(
                    "duplicate target name: {}",
                    target.name
                )));
            }
            if !mounts.insert(target.mount_path.trim_end_matches('/')) {
                return Err(ProxyError::config(format!(
                    "duplicate mount_path: {}",
                    target.mount_path
                )));
            }
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// Deadline applied to every request, policy call and storage I/O included.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long in-flight requests may run after a shutdown signal.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Largest accepted upload in bytes.
    pub max_request_body_size: u64,
    /// Trust `X-Forwarded-Proto` from a TLS-terminating front proxy.
    pub trust_forwarded_proto: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            max_request_body_size: 100 * 1024 * 1024, // 100MB
            trust_forwarded_proto: false,
        }
    }
}

/// Identity extraction settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Header carrying the authenticated caller's claims as JSON.
    pub principal_header: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            principal_header: "x-bucketgate-principal".to_string(),
        }
    }
}

/// Storage behind a target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Files under a local directory.
    Filesystem {
        /// Root directory.
        root: PathBuf,
    },
    /// Process memory; contents are lost on restart.
    Memory,
}

/// One bucket exposed under a mount path.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Name used in logs and metrics.
    pub name: String,
    /// URL path prefix, e.g. `/assets`.
    pub mount_path: String,
    /// Storage backend.
    pub backend: BackendConfig,
    /// Key prefix inside the backend.
    #[serde(default)]
    pub prefix: String,
    /// Document served for folder requests, e.g. `index.html`.
    #[serde(default)]
    pub index_document: Option<String>,
    /// Whether uploads may replace existing objects.
    #[serde(default = "default_true")]
    pub allow_override: bool,
    /// Access rules; a target without any is public.
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceConfig>,
}

const fn default_true() -> bool {
    true
}

impl TargetConfig {
    /// Create a target with no prefix, no index document and no access rules.
    pub fn new(
        name: impl Into<String>,
        mount_path: impl Into<String>,
        backend: BackendConfig,
    ) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            backend,
            prefix: String::new(),
            index_document: None,
            allow_override: true,
            resources: Vec::new(),
        }
    }

    /// Set the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the index document.
    #[must_use]
    pub fn with_index_document(mut self, name: impl Into<String>) -> Self {
        self.index_document = Some(name.into());
        self
    }

    /// Set whether uploads may replace existing objects.
    #[must_use]
    pub fn with_allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    /// Add an access rule.
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceConfig) -> Self {
        self.resources.push(resource);
        self
    }

    fn validate(&self) -> ProxyResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProxyError::config("target name must not be empty"));
        }
        if !self.mount_path.starts_with('/') {
            return Err(ProxyError::config(format!(
                "target {}: mount_path must start with '/'",
                self.name
            )));
        }
        if let BackendConfig::Filesystem { root } = &self.backend {
            if root.as_os_str().is_empty() {
                return Err(ProxyError::config(format!(
                    "target {}: filesystem root must not be empty",
                    self.name
                )));
            }
        }
        if let Some(index) = &self.index_document {
            if index.is_empty() || index.contains('/') {
                return Err(ProxyError::config(format!(
                    "target {}: index_document must be a plain file name",
                    self.name
                )));
            }
        }
        for resource in &self.resources {
            resource
                .validate()
                .map_err(|e| ProxyError::config(format!("target {}: {e}", self.name)))?;
        }
        Ok(())
    }
}

/// Access rule for a path pattern inside a target.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Path relative to the mount, exact or ending in `*` for a prefix.
    pub path: String,
    /// Methods the rule covers; empty means all. `GET` also covers `HEAD`.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Skip authorization.
    #[serde(default)]
    pub public: bool,
    /// Policy endpoint consulted for non-public rules.
    #[serde(default)]
    pub authorization: Option<ResourceAuthorizationConfig>,
}

impl ResourceConfig {
    /// A rule that needs no authorization.
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: Vec::new(),
            public: true,
            authorization: None,
        }
    }

    /// A rule checked against a policy endpoint.
    pub fn protected(path: impl Into<String>, authorization: ResourceAuthorizationConfig) -> Self {
        Self {
            path: path.into(),
            methods: Vec::new(),
            public: false,
            authorization: Some(authorization),
        }
    }

    /// Restrict the rule to the given methods.
    #[must_use]
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err(format!("resource path {} must start with '/'", self.path));
        }
        if self.path.trim_end_matches('*').contains('*') {
            return Err(format!(
                "resource path {}: '*' is only allowed at the end",
                self.path
            ));
        }
        for method in &self.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                return Err(format!("invalid method: {method}"));
            }
        }
        match (&self.authorization, self.public) {
            (Some(authorization), _) => authorization.validate().map_err(|e| e.to_string()),
            (None, true) => Ok(()),
            (None, false) => Err(format!(
                "resource {} needs an authorization block or public = true",
                self.path
            )),
        }
    }
}

/// Builder for [`GateConfig`].
#[derive(Debug, Default)]
pub struct GateConfigBuilder {
    config: GateConfig,
}

impl GateConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    /// Set the request deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout = timeout;
        self
    }

    /// Set the upload size limit.
    #[must_use]
    pub fn max_request_body_size(mut self, limit: u64) -> Self {
        self.config.server.max_request_body_size = limit;
        self
    }

    /// Trust `X-Forwarded-Proto`.
    #[must_use]
    pub fn trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.config.server.trust_forwarded_proto = trust;
        self
    }

    /// Set the principal header.
    #[must_use]
    pub fn principal_header(mut self, header: impl Into<String>) -> Self {
        self.config.identity.principal_header = header.into();
        self
    }

    /// Set telemetry settings.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Add a target.
    #[must_use]
    pub fn target(mut self, target: TargetConfig) -> Self {
        self.config.targets.push(target);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyResult<GateConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Human-readable durations: `500ms`, `30s`, `5m`, `1h`, or bare seconds.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (number, unit_ms) = [("ms", 1), ("s", 1_000), ("m", 60_000), ("h", 3_600_000)]
            .iter()
            .find_map(|(suffix, ms)| s.strip_suffix(suffix).map(|n| (n, *ms)))
            .unwrap_or((s, 1_000));
        let n: u64 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid duration: {s}"))?;
        n.checked_mul(unit_ms)
            .map(Duration::from_millis)
            .ok_or_else(|| format!("duration out of range: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn memory_target(name: &str, mount: &str) -> TargetConfig {
        TargetConfig::new(name, mount, BackendConfig::Memory)
    }

    #[test]
    fn test_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.server.listen_port, 8080);
        assert_eq!(config.server.request_timeout, Duration::from_secs(30));
        assert_eq!(config.identity.principal_header, "x-bucketgate-principal");
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = GateConfig::builder()
            .listen_port(9000)
            .request_timeout(Duration::from_secs(5))
            .target(memory_target("scratch", "/scratch"))
            .build()
            .unwrap();
        assert_eq!(config.server.listen_port, 9000);
        assert_eq!(config.targets.len(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(GateConfig::builder().build().is_err());
        assert!(GateConfig::builder()
            .target(memory_target("a", "no-slash"))
            .build()
            .is_err());
        assert!(GateConfig::builder()
            .target(memory_target("a", "/x"))
            .target(memory_target("a", "/y"))
            .build()
            .is_err());
        assert!(GateConfig::builder()
            .target(memory_target("a", "/x"))
            .target(memory_target("b", "/x/"))
            .build()
            .is_err());
        assert!(GateConfig::builder()
            .principal_header("bad header")
            .target(memory_target("a", "/x"))
            .build()
            .is_err());
    }

    #[test]
    fn test_resource_validation() {
        let protected = |url: &str| {
            memory_target("a", "/a")
                .with_resource(ResourceConfig::protected("/*", ResourceAuthorizationConfig::new(url)))
        };
        assert!(GateConfig::builder()
            .target(protected("http://opa:8181/v1/data/allow"))
            .build()
            .is_ok());
        assert!(GateConfig::builder()
            .target(protected("opa:8181"))
            .build()
            .is_err());

        let bare = ResourceConfig {
            path: "/x".to_string(),
            methods: Vec::new(),
            public: false,
            authorization: None,
        };
        assert!(GateConfig::builder()
            .target(memory_target("a", "/a").with_resource(bare))
            .build()
            .is_err());
        assert!(GateConfig::builder()
            .target(memory_target("a", "/a").with_resource(ResourceConfig::public("/a*b")))
            .build()
            .is_err());
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
[server]
listen_port = 8443
request_timeout = "1500ms"

[telemetry.logging]
level = "debug"

[[target]]
name = "assets"
mount_path = "/assets"
index_document = "index.html"
backend = { type = "filesystem", root = "/srv/assets" }

[[target.resource]]
path = "/public/*"
methods = ["GET"]
public = true

[[target.resource]]
path = "/*"

[target.resource.authorization]
url = "http://opa:8181/v1/data/bucketgate/allow"
on_error = "error"
tags = { bucket = "assets" }
"#;
        let config: GateConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_port, 8443);
        assert_eq!(config.server.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.telemetry.logging.level, "debug");

        let target = &config.targets[0];
        assert!(target.allow_override);
        assert_eq!(
            target.backend,
            BackendConfig::Filesystem {
                root: PathBuf::from("/srv/assets")
            }
        );
        assert_eq!(target.resources.len(), 2);
        assert!(target.resources[0].public);
        let authz = target.resources[1].authorization.as_ref().unwrap();
        assert_eq!(authz.tags.get("bucket").map(String::as_str), Some("assets"));
        config.validate().unwrap();
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.json");
        std::fs::write(
            &path,
            r#"{"target":[{"name":"m","mount_path":"/m","backend":{"type":"memory"}}]}"#,
        )
        .unwrap();

        let config = GateConfig::from_file(&path).unwrap();
        assert_eq!(config.targets[0].backend, BackendConfig::Memory);

        let yaml = dir.path().join("gate.yaml");
        std::fs::write(&yaml, "").unwrap();
        assert!(GateConfig::from_file(&yaml).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BUCKETGATE_LISTEN_PORT", "9999"),
            ("BUCKETGATE_REQUEST_TIMEOUT", "2m"),
            ("BUCKETGATE_METRICS_ADDR", "127.0.0.1:9100"),
            ("BUCKETGATE_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let config =
            GateConfig::default().with_overrides(|name| vars.get(name).map(ToString::to_string));
        assert_eq!(config.server.listen_port, 9999);
        assert_eq!(config.server.request_timeout, Duration::from_secs(120));
        assert!(config.telemetry.metrics.enabled);
        assert_eq!(config.telemetry.logging.level, "warn");
        assert!(!config.telemetry.tracing.enabled);
    }

    #[test]
    fn test_parse_duration() {
        use super::humantime_serde::parse_duration;
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 30s ").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("soon").is_err());
    }
}
