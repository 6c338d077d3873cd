//! In-memory DDI backend
//!
//! Keeps networks, range records and used addresses in process memory,
//! optionally mirrored to a JSON snapshot file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use ddi_range_core::{
    first_free_block, AddressRange, BackendType, BlockQuery, CidrBlock, CollaboratorError,
    Conflict, ConflictKind, DdiBackend, Ipv4Address, OverlapReport, RangeRecord, RangeSpec,
    UsedAddressQuery,
};
use ddi_shared_types::DdiConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRange {
    reference: String,
    range: AddressRange,
    spec: RangeSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UsedAddress {
    address: Ipv4Address,
    kind: ConflictKind,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryState {
    networks: Vec<CidrBlock>,
    ranges: Vec<StoredRange>,
    used: Vec<UsedAddress>,
    next_id: u64,
}

impl MemoryState {
    fn network(&self, cidr: &CidrBlock) -> Option<&CidrBlock> {
        self.networks.iter().find(|network| *network == cidr)
    }

    fn require_network(&self, cidr: &CidrBlock) -> Result<(), CollaboratorError> {
        match self.network(cidr) {
            Some(_) => Ok(()),
            None => Err(CollaboratorError::NetworkNotFound {
                cidr: cidr.to_string(),
            }),
        }
    }

    fn is_occupied(&self, address: Ipv4Address) -> bool {
        self.used.iter().any(|used| used.address == address)
            || self.ranges.iter().any(|stored| stored.range.contains(address))
    }

    /// Reject a range intersecting any stored range other than `skip`
    fn check_free(&self, range: &AddressRange, skip: Option<&str>) -> Result<(), CollaboratorError> {
        let clash = self
            .ranges
            .iter()
            .filter(|stored| Some(stored.reference.as_str()) != skip)
            .find(|stored| stored.range.overlaps(range));

        match clash {
            Some(stored) => Err(CollaboratorError::Api {
                message: format!(
                    "range {}-{} overlaps existing range {}",
                    range.start, range.end, stored.reference
                ),
            }),
            None => Ok(()),
        }
    }
}

/// In-memory DDI backend
pub struct MemoryDdi {
    name: String,
    network_view: String,
    storage_path: Option<PathBuf>,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryDdi {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network_view: "default".to_string(),
            storage_path: None,
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    pub fn from_config(config: &DdiConfig) -> Self {
        let mut backend = Self::new(config.name.clone());
        backend.network_view = config.network_view.clone();
        backend.storage_path = config.storage_path.as_ref().map(PathBuf::from);
        backend
    }

    /// Replace the in-memory state with the snapshot file, if there is one.
    pub async fn load_from_storage(&self) -> Result<(), CollaboratorError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let loaded: MemoryState = serde_json::from_str(&content)?;
                log::info!(
                    "Loaded {} range(s) for {} from {}",
                    loaded.ranges.len(),
                    self.name,
                    path.display()
                );
                *self.state.write().await = loaded;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No snapshot at {}, starting empty", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_to_storage(&self, state: &MemoryState) -> Result<(), CollaboratorError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        log::debug!("Saved {} snapshot to {}", self.name, path.display());
        Ok(())
    }

    /// Register a network so ranges can be placed in it
    pub async fn add_network(&self, cidr: CidrBlock) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().await;
        if state.network(&cidr).is_none() {
            state.networks.push(cidr);
            self.save_to_storage(&state).await?;
            log::debug!("Added network {} to {}", cidr, self.name);
        }
        Ok(())
    }

    /// Mark a single address as used, e.g. by a lease or fixed address
    pub async fn add_used(
        &self,
        address: Ipv4Address,
        kind: ConflictKind,
    ) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().await;
        if !state.networks.iter().any(|network| network.contains(address)) {
            return Err(CollaboratorError::Api {
                message: format!(
                    "address {} is not inside any network managed by {}",
                    address, self.name
                ),
            });
        }

        state.used.retain(|used| used.address != address);
        state.used.push(UsedAddress { address, kind });
        self.save_to_storage(&state).await
    }

    pub async fn ranges(&self) -> Vec<RangeRecord> {
        let state = self.state.read().await;
        state
            .ranges
            .iter()
            .map(|stored| self.to_record(stored))
            .collect()
    }

    pub async fn get_range(&self, reference: &str) -> Option<RangeRecord> {
        let state = self.state.read().await;
        state
            .ranges
            .iter()
            .find(|stored| stored.reference == reference)
            .map(|stored| self.to_record(stored))
    }

    fn to_record(&self, stored: &StoredRange) -> RangeRecord {
        RangeRecord {
            reference: stored.reference.clone(),
            network: stored.range.cidr.to_string(),
            start_addr: stored.range.start.into(),
            end_addr: stored.range.end.into(),
            network_view: Some(
                stored
                    .spec
                    .network_view
                    .clone()
                    .unwrap_or_else(|| self.network_view.clone()),
            ),
            name: stored.spec.name.clone(),
            comment: stored.spec.comment.clone(),
            disabled: stored.spec.disabled,
        }
    }
}

#[async_trait]
impl DdiBackend for MemoryDdi {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn next_available_block(
        &self,
        query: &BlockQuery,
    ) -> Result<Vec<Ipv4Address>, CollaboratorError> {
        let state = self.state.read().await;
        state.require_network(&query.cidr)?;

        let excluded = |address: Ipv4Address| {
            query
                .exclude
                .as_ref()
                .map_or(false, |window| window.contains(address))
        };
        let block = first_free_block(&query.cidr, u64::from(query.count), |address| {
            !state.is_occupied(address) && !excluded(address)
        });

        let Some(block) = block else {
            log::debug!(
                "No {} contiguous free address(es) in {}",
                query.count,
                query.cidr
            );
            return Ok(Vec::new());
        };

        Ok((0..block.count())
            .filter_map(|offset| block.start.add(offset).ok())
            .collect())
    }

    async fn find_conflicts(
        &self,
        query: &UsedAddressQuery,
    ) -> Result<OverlapReport, CollaboratorError> {
        let state = self.state.read().await;
        if state.network(&query.cidr).is_none() {
            return Ok(OverlapReport::Unavailable(format!(
                "network {} is not managed by {}",
                query.cidr, self.name
            )));
        }

        let in_window = |address: Ipv4Address| query.start <= address && address <= query.end;

        let mut conflicts: Vec<Conflict> = state
            .ranges
            .iter()
            .filter(|stored| stored.range.start <= query.end && query.start <= stored.range.end)
            .map(|stored| Conflict {
                start: stored.range.start.into(),
                end: stored.range.end.into(),
                kind: ConflictKind::Range,
                reference: Some(stored.reference.clone()),
            })
            .collect();

        conflicts.extend(
            state
                .used
                .iter()
                .filter(|used| in_window(used.address))
                .map(|used| Conflict::address(used.address.into(), used.kind.clone())),
        );

        if conflicts.is_empty() {
            Ok(OverlapReport::Clear)
        } else {
            Ok(OverlapReport::Conflicts(conflicts))
        }
    }

    async fn create_range(
        &self,
        range: &AddressRange,
        spec: &RangeSpec,
    ) -> Result<RangeRecord, CollaboratorError> {
        let mut state = self.state.write().await;
        state.require_network(&range.cidr)?;
        state.check_free(range, None)?;

        state.next_id += 1;
        let view = spec
            .network_view
            .clone()
            .unwrap_or_else(|| self.network_view.clone());
        let stored = StoredRange {
            reference: format!("range/{:016x}:{}", state.next_id, view),
            range: range.clone(),
            spec: spec.clone(),
        };
        let record = self.to_record(&stored);
        state.ranges.push(stored);
        self.save_to_storage(&state).await?;

        log::debug!("Stored range {} as {}", range, record.reference);
        Ok(record)
    }

    async fn update_range(
        &self,
        reference: &str,
        range: &AddressRange,
    ) -> Result<RangeRecord, CollaboratorError> {
        let mut state = self.state.write().await;
        state.require_network(&range.cidr)?;
        state.check_free(range, Some(reference))?;

        let stored = state
            .ranges
            .iter_mut()
            .find(|stored| stored.reference == reference)
            .ok_or_else(|| CollaboratorError::RecordNotFound {
                reference: reference.to_string(),
            })?;
        stored.range = range.clone();
        let record = self.to_record(stored);
        self.save_to_storage(&state).await?;

        Ok(record)
    }

    async fn delete_range(&self, reference: &str) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().await;
        let before = state.ranges.len();
        state.ranges.retain(|stored| stored.reference != reference);
        if state.ranges.len() == before {
            return Err(CollaboratorError::RecordNotFound {
                reference: reference.to_string(),
            });
        }

        self.save_to_storage(&state).await
    }
}
