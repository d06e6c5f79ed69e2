use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use time::UtcOffset;
use water_client::{FlowSeries, QualitySeries};

use crate::{
    error::AnalyticsError,
    sources::{read_flow_blocks, read_quality_blocks},
    transform,
};

struct Entry<T> {
    fingerprint: blake3::Hash,
    value: Arc<T>,
}

pub struct FingerprintCache<T> {
    entries: Mutex<HashMap<PathBuf, Entry<T>>>,
}

impl<T> Default for FingerprintCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

pub fn fingerprint(bytes: &[u8]) -> blake3::Hash {
    blake3::hash(bytes)
}

impl<T> FingerprintCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry<T>>> {
        // A panic while holding the lock leaves the map itself intact.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached value for `path`, parsing the file with `parse` when
    /// it is new or its contents changed.
    pub fn get_or_load<F>(&self, path: &Path, parse: F) -> Result<Arc<T>, AnalyticsError>
    where
        F: FnOnce(&[u8]) -> Result<T, AnalyticsError>,
    {
        let bytes = std::fs::read(path).map_err(|e| {
            AnalyticsError::Source(format!("failed to read {}: {e}", path.display()))
        })?;
        let digest = fingerprint(&bytes);

        if let Some(entry) = self.lock().get(path) {
            if entry.fingerprint == digest {
                metrics::counter!("table_cache_hits_total").increment(1);
                return Ok(Arc::clone(&entry.value));
            }
        }

        metrics::counter!("table_cache_misses_total").increment(1);
        let value = Arc::new(parse(&bytes)?);
        tracing::info!(
            path = %path.display(),
            fingerprint = %digest.to_hex(),
            "table parsed and cached"
        );

        self.lock().insert(
            path.to_path_buf(),
            Entry {
                fingerprint: digest,
                value: Arc::clone(&value),
            },
        );
        Ok(value)
    }

    pub fn invalidate(&self, path: &Path) -> bool {
        self.lock().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// The flow and quality exports of one site, parsed and validated on demand.
pub struct SiteTables {
    flow_path: PathBuf,
    quality_path: PathBuf,
    offset: UtcOffset,
    flow: FingerprintCache<FlowSeries>,
    quality: FingerprintCache<QualitySeries>,
}

impl SiteTables {
    pub fn new(
        flow_path: impl Into<PathBuf>,
        quality_path: impl Into<PathBuf>,
        offset: UtcOffset,
    ) -> Self {
        Self {
            flow_path: flow_path.into(),
            quality_path: quality_path.into(),
            offset,
            flow: FingerprintCache::new(),
            quality: FingerprintCache::new(),
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn load(&self) -> Result<(Arc<FlowSeries>, Arc<QualitySeries>), AnalyticsError> {
        let offset = self.offset;
        let flow = self.flow.get_or_load(&self.flow_path, |bytes| {
            let flow = read_flow_blocks(bytes, offset)?;
            transform::validate_flow(&flow, offset)?;
            Ok(flow)
        })?;
        let quality = self.quality.get_or_load(&self.quality_path, |bytes| {
            let quality = read_quality_blocks(bytes, offset)?;
            transform::validate_quality(&quality, offset)?;
            Ok(quality)
        })?;
        Ok((flow, quality))
    }
}
