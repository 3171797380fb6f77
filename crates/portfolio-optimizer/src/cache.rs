use std::path::Path;

use serde::Deserialize;

use allocation_core::{AllocationError, AllocationMap, Result};

/// A previously approved allocation set, returned verbatim by the hybrid
/// allocator when cached mode is active.
///
/// File format: `{"allocations": {"strategy_id": percent, ...}}`.
/// Non-positive entries are discarded on load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedAllocations {
    allocations: AllocationMap,
}

#[derive(Deserialize)]
struct CacheFile {
    allocations: AllocationMap,
}

impl CachedAllocations {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AllocationError::CacheLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&raw).map_err(|e| match e {
            AllocationError::CacheLoad { reason, .. } => AllocationError::CacheLoad {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: CacheFile = serde_json::from_str(raw).map_err(|e| AllocationError::CacheLoad {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_map(file.allocations))
    }

    pub fn from_map(allocations: AllocationMap) -> Self {
        Self {
            allocations: allocations
                .into_iter()
                .filter(|(_, pct)| pct.is_finite() && *pct > 0.0)
                .collect(),
        }
    }

    pub fn allocations(&self) -> &AllocationMap {
        &self.allocations
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}
