//! Target cloud backends and their provider settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Supported deployment backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Aws,
    OpenStack,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Aws => "aws",
            Backend::OpenStack => "openstack",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aws" => Some(Backend::Aws),
            "openstack" | "os" => Some(Backend::OpenStack),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Backend::Aws, Backend::OpenStack]
    }

    /// Terraform provider name.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Backend::Aws => "aws",
            Backend::OpenStack => "openstack",
        }
    }

    /// Terraform registry source of the provider.
    pub fn provider_source(&self) -> &'static str {
        match self {
            Backend::Aws => "hashicorp/aws",
            Backend::OpenStack => "terraform-provider-openstack/openstack",
        }
    }

    pub fn provider_version(&self) -> &'static str {
        match self {
            Backend::Aws => "~> 5.0",
            Backend::OpenStack => "~> 1.53.0",
        }
    }

    /// Get default region for the backend.
    pub fn default_region(&self) -> &'static str {
        match self {
            Backend::Aws => "us-east-1",
            Backend::OpenStack => "RegionOne",
        }
    }

    /// Whether all copies of a batch must live in one address space.
    ///
    /// AWS places every copy in a single VPC, so copies need disjoint
    /// address blocks. OpenStack copies get their own networks.
    pub fn requires_shared_address_space(&self) -> bool {
        matches!(self, Backend::Aws)
    }

    /// Environment variables read into [`ProviderSettings`], with the
    /// setting key each one fills.
    pub fn settings_env(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Backend::Aws => &[("AWS_REGION", "region")],
            Backend::OpenStack => &[
                ("OS_AUTH_URL", "auth_url"),
                ("OS_REGION_NAME", "region"),
                ("OS_PROJECT_NAME", "tenant_name"),
                ("OS_USERNAME", "user_name"),
                ("OS_PASSWORD", "password"),
                ("OS_EXTERNAL_NETWORK_ID", "external_network_id"),
            ],
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Setting keys whose values are secrets.
pub const SENSITIVE_SETTINGS: &[&str] = &["password"];

/// Caller-supplied provider configuration.
///
/// Values end up as Terraform variable defaults. Sensitive keys are
/// declared `sensitive = true` and only get a default when the caller
/// supplied one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub region: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl ProviderSettings {
    pub fn new(backend: Backend) -> Self {
        Self {
            region: backend.default_region().to_string(),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Build settings from a variable lookup such as the process environment.
    pub fn from_lookup<F>(backend: Backend, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::new(backend);
        for (var, key) in backend.settings_env() {
            let Some(value) = lookup(var).filter(|v| !v.is_empty()) else {
                continue;
            };
            if *key == "region" {
                settings.region = value;
            } else {
                settings.variables.insert((*key).to_string(), value);
            }
        }
        settings
    }

    pub fn from_env(backend: Backend) -> Self {
        Self::from_lookup(backend, |var| std::env::var(var).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!(Backend::from_str("AWS"), Some(Backend::Aws));
        assert_eq!(Backend::from_str("openstack"), Some(Backend::OpenStack));
        assert_eq!(Backend::from_str("azure"), None);
    }

    #[test]
    fn test_settings_from_lookup() {
        let env: BTreeMap<&str, &str> = [
            ("OS_AUTH_URL", "http://keystone:5000/v3"),
            ("OS_REGION_NAME", "RegionTwo"),
            ("OS_PASSWORD", "s3cret"),
            ("OS_USERNAME", ""),
        ]
        .into_iter()
        .collect();

        let settings =
            ProviderSettings::from_lookup(Backend::OpenStack, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(settings.region, "RegionTwo");
        assert_eq!(settings.get("auth_url"), Some("http://keystone:5000/v3"));
        assert_eq!(settings.get("password"), Some("s3cret"));
        assert_eq!(settings.get("user_name"), None);
    }

    #[test]
    fn test_default_region() {
        let settings = ProviderSettings::from_lookup(Backend::Aws, |_| None);
        assert_eq!(settings.region, "us-east-1");
        assert!(settings.variables.is_empty());
    }
}
