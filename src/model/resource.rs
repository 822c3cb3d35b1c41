//! Normalized resource record
//!
//! Every provider fetch converts its items into [`Resource`]. Relationships
//! between records live only in the string attributes (see [`attr`]).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute keys shared between fetchers, the store and the flow tracer
pub mod attr {
    pub const PROJECT_ID: &str = "project_id";
    pub const STATE: &str = "state";
    pub const PROJECT_NUMBER: &str = "project_number";
    pub const VPC: &str = "vpc";
    pub const SUBNET: &str = "subnet";
    pub const TARGET: &str = "target";
    pub const URL_MAP: &str = "url_map";
    pub const DEFAULT_SERVICE: &str = "default_service";
    pub const CLOUD_ARMOR_POLICY: &str = "cloud_armor_policy";
    pub const SSL_CERTIFICATES: &str = "ssl_certificates";
    pub const SSL_POLICY: &str = "ssl_policy";
    pub const IP_ADDRESS: &str = "ip_address";
    pub const PORT_RANGE: &str = "port_range";
    pub const PROTOCOL: &str = "protocol";
    pub const LOAD_BALANCING_SCHEME: &str = "load_balancing_scheme";
    pub const RULES: &str = "rules";
}

/// Cloud provider a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
        }
    }

    /// Parse a provider name as typed on the command line
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Some(Provider::Aws),
            "gcp" => Some(Provider::Gcp),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource kind tag. Unknown tags are preserved in [`ServiceKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceKind {
    Project,
    Folder,
    Vpc,
    Subnet,
    Firewall,
    CloudRun,
    ServiceAccount,
    BackendService,
    UrlMap,
    TargetHttpsProxy,
    ForwardingRule,
    SecurityPolicy,
    Ec2,
    Iam,
    Other(String),
}

impl ServiceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceKind::Project => "project",
            ServiceKind::Folder => "folder",
            ServiceKind::Vpc => "vpc",
            ServiceKind::Subnet => "subnet",
            ServiceKind::Firewall => "firewall",
            ServiceKind::CloudRun => "cloudrun",
            ServiceKind::ServiceAccount => "serviceaccount",
            ServiceKind::BackendService => "backendservice",
            ServiceKind::UrlMap => "urlmap",
            ServiceKind::TargetHttpsProxy => "targethttpsproxy",
            ServiceKind::ForwardingRule => "forwardingrule",
            ServiceKind::SecurityPolicy => "securitypolicy",
            ServiceKind::Ec2 => "ec2",
            ServiceKind::Iam => "iam",
            ServiceKind::Other(tag) => tag,
        }
    }
}

impl From<&str> for ServiceKind {
    fn from(s: &str) -> Self {
        match s {
            "project" => ServiceKind::Project,
            "folder" => ServiceKind::Folder,
            "vpc" => ServiceKind::Vpc,
            "subnet" => ServiceKind::Subnet,
            "firewall" => ServiceKind::Firewall,
            "cloudrun" => ServiceKind::CloudRun,
            "serviceaccount" => ServiceKind::ServiceAccount,
            "backendservice" => ServiceKind::BackendService,
            "urlmap" => ServiceKind::UrlMap,
            "targethttpsproxy" => ServiceKind::TargetHttpsProxy,
            "forwardingrule" => ServiceKind::ForwardingRule,
            "securitypolicy" => ServiceKind::SecurityPolicy,
            "ec2" => ServiceKind::Ec2,
            "iam" => ServiceKind::Iam,
            other => ServiceKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ServiceKind {
    fn from(s: String) -> Self {
        ServiceKind::from(s.as_str())
    }
}

impl From<ServiceKind> for String {
    fn from(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cloud resource in the common record shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub provider: Provider,
    pub service: ServiceKind,
    #[serde(default)]
    pub region: String,
    pub id: String,
    pub name: String,
    /// Provider metadata and cross-resource links. Never absent.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attributes: BTreeMap<String, String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Resource {
    pub fn new(
        provider: Provider,
        service: impl Into<ServiceKind>,
        region: &str,
        id: &str,
        name: &str,
    ) -> Self {
        Self {
            provider,
            service: service.into(),
            region: region.to_string(),
            id: id.to_string(),
            name: name.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute insert
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Attribute value, if present
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    /// Attribute value, or "" when absent
    pub fn attr_or_empty(&self, key: &str) -> &str {
        self.attr(key).unwrap_or("")
    }

    /// The owning project recorded at fetch time
    pub fn parent_project(&self) -> Option<&str> {
        self.attr(attr::PROJECT_ID)
    }

    /// True for the project record `scope` itself and for every record
    /// whose `project_id` attribute equals `scope`.
    pub fn belongs_to_scope(&self, scope: &str) -> bool {
        if self.service == ServiceKind::Project && self.id == scope {
            return true;
        }
        self.parent_project() == Some(scope)
    }
}
