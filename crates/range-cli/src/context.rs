//! Shared state handed to every command

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use ddi_drivers::{DdiBackendFactory, MemoryDdi};
use ddi_range_core::{AllocationLock, CidrBlock, DdiBackend, RangeAllocator, RangeResizer};
use ddi_shared_types::{BackendType, DdiConfig};

use crate::output::OutputFormat;

pub struct CliContext {
    pub backend: Arc<dyn DdiBackend>,
    pub lock: AllocationLock,
    pub format: OutputFormat,
    memory: Option<Arc<MemoryDdi>>,
}

impl CliContext {
    /// Load configuration (file plus `INFOBLOX_*` environment) and connect
    pub async fn bootstrap(
        config_path: Option<&Path>,
        backend: Option<BackendType>,
        format: OutputFormat,
    ) -> Result<Arc<Self>> {
        let mut config =
            DdiConfig::load(config_path).context("Failed to load DDI configuration")?;
        if let Some(backend) = backend {
            config.backend_type = backend;
        }

        Self::from_config(&config, format).await
    }

    pub async fn from_config(config: &DdiConfig, format: OutputFormat) -> Result<Arc<Self>> {
        let (backend, memory): (Arc<dyn DdiBackend>, _) = match config.backend_type {
            BackendType::Memory => {
                config.validate()?;
                let memory = Arc::new(MemoryDdi::from_config(config));
                memory
                    .load_from_storage()
                    .await
                    .context("Failed to load memory backend snapshot")?;
                (memory.clone(), Some(memory))
            }
            BackendType::Infoblox => (
                DdiBackendFactory::create_and_validate_backend(config).await?,
                None,
            ),
        };

        Ok(Arc::new(Self {
            backend,
            lock: AllocationLock::new(),
            format,
            memory,
        }))
    }

    /// Make sure the backend knows `cidr`; only the memory backend can add it
    pub async fn prepare_network(&self, cidr: CidrBlock) -> Result<()> {
        if let Some(memory) = &self.memory {
            memory.add_network(cidr).await?;
        }
        Ok(())
    }

    pub fn allocator(&self) -> RangeAllocator {
        RangeAllocator::new(self.backend.clone(), self.lock.clone())
    }

    pub fn resizer(&self) -> RangeResizer {
        RangeResizer::new(self.backend.clone())
    }
}
