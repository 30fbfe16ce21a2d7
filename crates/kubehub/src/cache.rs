use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use arc_swap::ArcSwap;
use metrics::{counter, gauge, histogram};
use resref_core::{DiscoveryRecord, Error, Result};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::DiscoverySource;

/// Fetch budget used when the caller does not pick one.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

type Records = Arc<[DiscoveryRecord]>;

/// Memoizes one discovery fetch for the lifetime of the process.
///
/// The first [`records`](Self::records) call fetches; concurrent callers wait
/// for that same fetch instead of starting their own. A failed or timed-out
/// fetch leaves the cache empty so the next call starts over.
/// [`invalidate`](Self::invalidate) swaps in a fresh empty cell.
pub struct DiscoveryCache {
    source: Arc<dyn DiscoverySource>,
    timeout: Duration,
    cell: ArcSwap<OnceCell<Records>>,
}

impl DiscoveryCache {
    pub fn new(source: Arc<dyn DiscoverySource>) -> Self {
        Self::with_timeout(source, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(source: Arc<dyn DiscoverySource>, timeout: Duration) -> Self {
        Self { source, timeout, cell: ArcSwap::from_pointee(OnceCell::new()) }
    }

    /// Whether a successful fetch is currently memoized.
    pub fn is_filled(&self) -> bool {
        self.cell.load().initialized()
    }

    /// The served records, fetching them on first use.
    pub async fn records(&self) -> Result<Records> {
        let cell = self.cell.load_full();
        if let Some(records) = cell.get() {
            debug!(records = records.len(), "discovery cache hit");
            return Ok(Arc::clone(records));
        }
        let records = cell.get_or_try_init(|| self.fetch()).await?;
        Ok(Arc::clone(records))
    }

    /// Drop the memoized records; the next [`records`](Self::records) call re-fetches.
    pub fn invalidate(&self) {
        self.cell.store(Arc::new(OnceCell::new()));
        debug!("discovery cache invalidated");
    }

    async fn fetch(&self) -> Result<Records> {
        let started = Instant::now();
        counter!("discovery_fetch_total", 1u64);
        info!(timeout = ?self.timeout, "fetching discovery");
        let outcome = match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(Ok(records)) => Ok(records),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow!("discovery fetch timed out after {:?}", self.timeout)),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("discovery_fetch_ms", elapsed_ms);
        match outcome {
            Ok(records) => {
                gauge!("discovery_records", records.len() as f64);
                info!(records = records.len(), ms = elapsed_ms, "discovery fetched");
                Ok(records.into())
            }
            Err(e) => {
                counter!("discovery_fetch_failed_total", 1u64);
                warn!(error = %e, ms = elapsed_ms, "discovery fetch failed");
                Err(Error::DiscoveryUnavailable(e))
            }
        }
    }
}
