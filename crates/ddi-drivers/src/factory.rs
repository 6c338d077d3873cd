//! DDI backend factory

use anyhow::Result;
use std::sync::Arc;

use super::{InfobloxClient, MemoryDdi};
use ddi_range_core::DdiBackend;
use ddi_shared_types::{BackendType, DdiConfig};

/// DDI backend factory
pub struct DdiBackendFactory;

impl DdiBackendFactory {
    /// Create a backend from configuration
    pub fn create_backend(config: &DdiConfig) -> Result<Arc<dyn DdiBackend>> {
        match config.backend_type {
            BackendType::Memory => Ok(Arc::new(MemoryDdi::from_config(config))),
            BackendType::Infoblox => {
                let client = InfobloxClient::new(config)?;
                Ok(Arc::new(client))
            }
        }
    }

    /// Validate the configuration, create the backend and load any
    /// persisted state
    pub async fn create_and_validate_backend(config: &DdiConfig) -> Result<Arc<dyn DdiBackend>> {
        config.validate()?;

        let backend: Arc<dyn DdiBackend> = match config.backend_type {
            BackendType::Memory => {
                let memory = MemoryDdi::from_config(config);
                memory.load_from_storage().await?;
                Arc::new(memory)
            }
            BackendType::Infoblox => Self::create_backend(config)?,
        };

        log::info!(
            "Using DDI backend '{}' (type: {})",
            backend.name(),
            backend.backend_type()
        );
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_backend() {
        let config = DdiConfig::new("lab".to_string(), BackendType::Memory);
        let backend = DdiBackendFactory::create_and_validate_backend(&config)
            .await
            .unwrap();

        assert_eq!(backend.name(), "lab");
        assert_eq!(backend.backend_type(), BackendType::Memory);
    }

    #[tokio::test]
    async fn test_infoblox_requires_credentials() {
        let mut config = DdiConfig::new("gm".to_string(), BackendType::Infoblox);
        config.server = Some("gm.example.com".to_string());
        assert!(DdiBackendFactory::create_and_validate_backend(&config)
            .await
            .is_err());

        config.username = Some("admin".to_string());
        config.password = Some("infoblox".to_string());
        let backend = DdiBackendFactory::create_backend(&config).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Infoblox);
    }
}
