use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::error::{SharedResult, SharedTypeError};

/// Prefix of the environment variables read by [`DdiConfig::load`].
pub const ENV_PREFIX: &str = "INFOBLOX";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BackendType {
    #[default]
    #[serde(rename = "infoblox")]
    Infoblox,
    #[serde(rename = "memory")]
    Memory,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Infoblox => write!(f, "infoblox"),
            BackendType::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "infoblox" | "wapi" => Ok(BackendType::Infoblox),
            "memory" | "mem" => Ok(BackendType::Memory),
            _ => Err(SharedTypeError::Unsupported(s.to_string())),
        }
    }
}

fn default_name() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_wapi_version() -> String {
    "2.7".to_string()
}

fn default_network_view() -> String {
    "default".to_string()
}

fn default_connect_timeout() -> u64 {
    60
}

/// Connection settings for the DDI appliance backing range allocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DdiConfig {
    #[serde(rename = "type", default)]
    pub backend_type: BackendType,
    #[serde(default = "default_name")]
    pub name: String,
    pub server: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_wapi_version")]
    pub wapi_version: String,
    #[serde(default = "default_network_view")]
    pub network_view: String,
    /// Verify the appliance TLS certificate
    #[serde(default)]
    pub sslmode: bool,
    /// Seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Snapshot file of the memory backend
    pub storage_path: Option<String>,
}

impl Default for DdiConfig {
    fn default() -> Self {
        Self::new(default_name(), BackendType::default())
    }
}

impl DdiConfig {
    pub fn new(name: String, backend_type: BackendType) -> Self {
        Self {
            backend_type,
            name,
            server: None,
            port: default_port(),
            username: None,
            password: None,
            wapi_version: default_wapi_version(),
            network_view: default_network_view(),
            sslmode: false,
            connect_timeout: default_connect_timeout(),
            storage_path: None,
        }
    }

    /// Load configuration from an optional file, overridden by `INFOBLOX_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: DdiConfig = settings.try_deserialize()?;
        log::debug!(
            "Loaded DDI configuration '{}' (backend: {})",
            config.name,
            config.backend_type
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("DDI backend name cannot be empty");
        }

        match self.backend_type {
            BackendType::Memory => {}
            BackendType::Infoblox => {
                if self.server.as_deref().map_or(true, str::is_empty) {
                    bail!("Infoblox requires server configuration");
                }
                if self.username.is_none() || self.password.is_none() {
                    bail!("Infoblox requires username and password");
                }
                if self.port == 0 {
                    bail!("Invalid Infoblox port: 0");
                }
                if self.wapi_version.is_empty() {
                    bail!("Infoblox requires a WAPI version");
                }
            }
        }

        Ok(())
    }

    /// WAPI base URL, e.g. `https://gm.example.com:443/wapi/v2.7`
    pub fn base_url(&self) -> SharedResult<String> {
        let server = self
            .server
            .as_deref()
            .map(|s| s.trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .ok_or(SharedTypeError::InvalidValue {
                field: "server",
                value: String::new(),
            })?;

        let host = server
            .strip_prefix("https://")
            .or_else(|| server.strip_prefix("http://"))
            .unwrap_or(server);

        Ok(format!(
            "https://{}:{}/wapi/v{}",
            host, self.port, self.wapi_version
        ))
    }
}
