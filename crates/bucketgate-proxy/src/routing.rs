//! Target and access-rule selection.

use std::sync::Arc;

use bucketgate_authz::ResourceAuthorizationConfig;
use bucketgate_bucket::{
    check_request_path, BucketClient, BucketOptions, BucketRequestContext, FilesystemBackend,
    MemoryBackend, StorageBackend,
};
use http::Method;

use crate::config::{BackendConfig, GateConfig, ResourceConfig, TargetConfig};
use crate::error::{ProxyError, ProxyResult};

/// Path pattern of an access rule.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Compiled access rule.
#[derive(Debug, Clone)]
struct Resource {
    pattern: PathPattern,
    methods: Vec<Method>,
    public: bool,
    authorization: Option<ResourceAuthorizationConfig>,
}

impl Resource {
    fn compile(config: &ResourceConfig) -> ProxyResult<Self> {
        let methods = config
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| ProxyError::config(format!("invalid method: {m}")))
            })
            .collect::<ProxyResult<Vec<_>>>()?;
        Ok(Self {
            pattern: PathPattern::parse(&config.path),
            methods,
            public: config.public,
            authorization: config.authorization.clone(),
        })
    }

    fn covers(&self, method: &Method, path: &str) -> bool {
        let method_ok = self.methods.is_empty()
            || self
                .methods
                .iter()
                .any(|m| m == method || (*method == Method::HEAD && *m == Method::GET));
        method_ok && self.pattern.matches(path)
    }
}

/// How a request must be authorized.
#[derive(Debug, Clone, Copy)]
pub enum Access<'a> {
    /// No check needed.
    Public,
    /// Ask the policy endpoint.
    Protected(&'a ResourceAuthorizationConfig),
    /// The target has rules and none covers the request.
    Unmatched,
}

/// A bucket mounted under a URL path.
pub struct Target {
    name: String,
    mount_path: String,
    client: Arc<dyn BucketClient>,
    resources: Vec<Resource>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("mount_path", &self.mount_path)
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

impl Target {
    /// Builds a target over `backend`.
    pub fn new(config: &TargetConfig, backend: Arc<dyn StorageBackend>) -> ProxyResult<Self> {
        let mut options = BucketOptions::new(config.name.clone())
            .with_prefix(config.prefix.clone())
            .with_allow_override(config.allow_override);
        if let Some(index) = &config.index_document {
            options = options.with_index_document(index.clone());
        }
        let client = BucketRequestContext::new(Arc::new(options), backend);
        Self::with_client(config, Arc::new(client))
    }

    /// Builds a target over any [`BucketClient`].
    pub fn with_client(config: &TargetConfig, client: Arc<dyn BucketClient>) -> ProxyResult<Self> {
        let resources = config
            .resources
            .iter()
            .map(Resource::compile)
            .collect::<ProxyResult<Vec<_>>>()?;
        Ok(Self {
            name: config.name.clone(),
            mount_path: normalize_mount(&config.mount_path),
            client,
            resources,
        })
    }

    /// Builds a target and its configured backend.
    pub fn from_config(config: &TargetConfig) -> ProxyResult<Self> {
        let backend: Arc<dyn StorageBackend> = match &config.backend {
            BackendConfig::Filesystem { root } => Arc::new(FilesystemBackend::new(root.clone())),
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        };
        Self::new(config, backend)
    }

    /// Target name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bucket operations of this target.
    pub fn client(&self) -> &dyn BucketClient {
        self.client.as_ref()
    }

    /// Access rule for `method` on `path`, relative to the mount.
    pub fn access(&self, method: &Method, path: &str) -> Access<'_> {
        if self.resources.is_empty() {
            return Access::Public;
        }
        let rule_path = format!("/{}", path.trim_start_matches('/'));
        match self.resources.iter().find(|r| r.covers(method, &rule_path)) {
            None => Access::Unmatched,
            Some(resource) if resource.public => Access::Public,
            Some(resource) => resource
                .authorization
                .as_ref()
                .map_or(Access::Unmatched, Access::Protected),
        }
    }

    /// Path below the mount, or `None` when `path` is outside it.
    fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.mount_path.as_str())?;
        if self.mount_path == "/" || rest.is_empty() || rest.starts_with('/') {
            Some(rest.trim_start_matches('/'))
        } else {
            None
        }
    }
}

fn normalize_mount(mount: &str) -> String {
    let trimmed = mount.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Mounted targets, longest mount path first.
#[derive(Debug)]
pub struct RouteTable {
    targets: Vec<Target>,
}

/// A request matched to a target.
#[derive(Debug)]
pub struct Route<'a> {
    /// Matched target.
    pub target: &'a Target,
    /// Decoded path below the mount, without a leading `/`.
    pub path: String,
}

impl RouteTable {
    /// Builds the table from already constructed targets.
    pub fn new(mut targets: Vec<Target>) -> Self {
        targets.sort_by(|a, b| b.mount_path.len().cmp(&a.mount_path.len()));
        Self { targets }
    }

    /// Builds every configured target.
    pub fn from_config(config: &GateConfig) -> ProxyResult<Self> {
        config
            .targets
            .iter()
            .map(Target::from_config)
            .collect::<ProxyResult<Vec<_>>>()
            .map(Self::new)
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether no target is mounted.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Finds the target with the longest mount path containing `uri_path`.
    ///
    /// The remainder is percent-decoded. A trailing `/` survives decoding,
    /// so folder requests stay folder requests. The decoded path is the one
    /// both access rules and storage see, so anything storage would read as a
    /// different key (`a//b`, `a%2F%2Fb`, `..`) is refused here.
    pub fn route(&self, uri_path: &str) -> ProxyResult<Route<'_>> {
        let (target, rest) = self
            .targets
            .iter()
            .find_map(|t| t.strip(uri_path).map(|rest| (t, rest)))
            .ok_or_else(|| ProxyError::NoTarget {
                path: uri_path.to_string(),
            })?;

        let path = urlencoding::decode(rest)
            .map_err(|_| ProxyError::bad_request("path is not valid UTF-8"))?
            .into_owned();
        check_request_path(&path)?;
        Ok(Route { target, path })
    }
}
